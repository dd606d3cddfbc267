//! Read-only tally math over a page-load snapshot of the candidate table.
//! Not transactional with vote submission; the denormalized `vote_count`
//! column is display-only (see `/api/admin/results` for the aggregated
//! numbers derived from the vote rows themselves).

use rocket::serde::Serialize;

use crate::models::{Candidate, Category};

#[derive(Debug, Serialize)]
#[serde(crate = "rocket::serde")]
pub struct CandidateStanding {
    #[serde(flatten)]
    pub candidate: Candidate,
    /// Share of this candidate's category, 0.0 when the category has no
    /// votes yet.
    pub percentage: f64,
}

/// Per-category percentages over the snapshot, preserving input order
/// (callers pass candidates ordered by descending vote count).
pub fn standings(candidates: Vec<Candidate>) -> Vec<CandidateStanding> {
    let totals: Vec<(Category, i64)> = Category::ALL
        .into_iter()
        .map(|category| {
            let total = candidates
                .iter()
                .filter(|c| c.category == category)
                .map(|c| i64::from(c.vote_count))
                .sum();
            (category, total)
        })
        .collect();

    candidates
        .into_iter()
        .map(|candidate| {
            let total = totals
                .iter()
                .find(|(category, _)| *category == candidate.category)
                .map(|(_, total)| *total)
                .unwrap_or(0);
            let percentage = if total > 0 {
                f64::from(candidate.vote_count) / total as f64 * 100.0
            } else {
                0.0
            };
            CandidateStanding {
                candidate,
                percentage,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn candidate(name: &str, category: Category, vote_count: i32) -> Candidate {
        Candidate {
            id: Uuid::new_v4(),
            name: name.to_string(),
            photo_url: None,
            description: None,
            party_name: "Partido".to_string(),
            party_logo_url: None,
            party_description: None,
            academic_formation: None,
            professional_experience: None,
            campaign_proposal: None,
            category,
            vote_count,
        }
    }

    #[test]
    fn percentages_are_computed_within_each_category() {
        let standings = standings(vec![
            candidate("A", Category::Presidencial, 75),
            candidate("B", Category::Presidencial, 25),
            candidate("C", Category::Regional, 10),
        ]);

        assert_eq!(standings[0].percentage, 75.0);
        assert_eq!(standings[1].percentage, 25.0);
        // Sole regional candidate holds the whole category.
        assert_eq!(standings[2].percentage, 100.0);
    }

    #[test]
    fn empty_category_yields_zero_percent() {
        let standings = standings(vec![
            candidate("A", Category::Distrital, 0),
            candidate("B", Category::Distrital, 0),
        ]);
        assert!(standings.iter().all(|s| s.percentage == 0.0));
    }

    #[test]
    fn input_order_is_preserved() {
        let standings = standings(vec![
            candidate("First", Category::Presidencial, 30),
            candidate("Second", Category::Presidencial, 20),
        ]);
        assert_eq!(standings[0].candidate.name, "First");
        assert_eq!(standings[1].candidate.name, "Second");
    }
}
