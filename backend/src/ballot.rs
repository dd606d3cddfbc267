//! Per-session ballot selection: at most one candidate per category,
//! toggleable until submission. Held inside the session, never persisted.

use rocket::serde::Serialize;
use uuid::Uuid;

use crate::models::Category;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(crate = "rocket::serde")]
pub struct SelectionEntry {
    pub candidate_id: Uuid,
    pub candidate_name: String,
    pub category: Category,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionOutcome {
    Selected,
    /// Same candidate picked again: toggled off.
    Deselected,
    /// A different candidate already held this category: last write wins.
    Replaced,
}

#[derive(Debug, Clone, Default)]
pub struct BallotSelection {
    entries: Vec<SelectionEntry>,
}

impl BallotSelection {
    pub fn select(
        &mut self,
        candidate_id: Uuid,
        candidate_name: &str,
        category: Category,
    ) -> SelectionOutcome {
        if let Some(pos) = self
            .entries
            .iter()
            .position(|e| e.candidate_id == candidate_id && e.category == category)
        {
            self.entries.remove(pos);
            return SelectionOutcome::Deselected;
        }

        let entry = SelectionEntry {
            candidate_id,
            candidate_name: candidate_name.to_string(),
            category,
        };

        if let Some(existing) = self.entries.iter_mut().find(|e| e.category == category) {
            *existing = entry;
            SelectionOutcome::Replaced
        } else {
            self.entries.push(entry);
            SelectionOutcome::Selected
        }
    }

    pub fn entries(&self) -> &[SelectionEntry] {
        &self.entries
    }

    pub fn categories(&self) -> Vec<Category> {
        self.entries.iter().map(|e| e.category).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Called after a successful submission.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry_ids(ballot: &BallotSelection) -> Vec<Uuid> {
        ballot.entries().iter().map(|e| e.candidate_id).collect()
    }

    #[test]
    fn toggling_same_candidate_twice_returns_to_empty() {
        let mut ballot = BallotSelection::default();
        let id = Uuid::new_v4();

        assert_eq!(
            ballot.select(id, "C1", Category::Presidencial),
            SelectionOutcome::Selected
        );
        assert_eq!(
            ballot.select(id, "C1", Category::Presidencial),
            SelectionOutcome::Deselected
        );
        assert!(ballot.is_empty());
    }

    #[test]
    fn second_candidate_in_same_category_replaces_first() {
        let mut ballot = BallotSelection::default();
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();

        ballot.select(first, "C1", Category::Presidencial);
        assert_eq!(
            ballot.select(second, "C2", Category::Presidencial),
            SelectionOutcome::Replaced
        );
        assert_eq!(entry_ids(&ballot), vec![second]);
    }

    #[test]
    fn selections_in_distinct_categories_coexist() {
        let mut ballot = BallotSelection::default();
        ballot.select(Uuid::new_v4(), "C1", Category::Presidencial);
        ballot.select(Uuid::new_v4(), "C2", Category::Regional);

        assert_eq!(ballot.entries().len(), 2);
        assert_eq!(
            ballot.categories(),
            vec![Category::Presidencial, Category::Regional]
        );
    }

    #[test]
    fn clear_empties_all_selections() {
        let mut ballot = BallotSelection::default();
        ballot.select(Uuid::new_v4(), "C1", Category::Presidencial);
        ballot.select(Uuid::new_v4(), "C2", Category::Distrital);
        ballot.clear();
        assert!(ballot.is_empty());
    }
}
