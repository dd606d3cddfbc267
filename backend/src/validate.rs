//! Pre-submission validation. These checks exist to give fast, friendly
//! errors; the partial unique index on `votes` remains the final arbiter
//! for duplicates, and the caller must still handle an insert rejection.

use uuid::Uuid;

use crate::ballot::SelectionEntry;
use crate::errors::SubmissionError;
use crate::models::Category;
use crate::reniec::is_valid_dni;

/// Candidate fields relevant to validation, pre-fetched by the caller.
#[derive(Debug, Clone)]
pub struct CandidateRef {
    pub id: Uuid,
    pub name: String,
    pub category: Category,
}

/// Short-circuits on the first failed check, in order: identifier format,
/// voter existence, prior durable votes, candidate/category consistency.
pub fn validate_submission(
    dni: &str,
    voter_found: bool,
    already_voted: &[Category],
    selections: &[SelectionEntry],
    candidates: &[CandidateRef],
) -> Result<(), SubmissionError> {
    if !is_valid_dni(dni) {
        return Err(SubmissionError::InvalidVoter);
    }

    if !voter_found {
        return Err(SubmissionError::VoterNotFound);
    }

    let closed: Vec<Category> = selections
        .iter()
        .map(|s| s.category)
        .filter(|c| already_voted.contains(c))
        .collect();
    if !closed.is_empty() {
        return Err(SubmissionError::DuplicateCategory(closed));
    }

    let mut mismatches = Vec::new();
    for selection in selections {
        match candidates.iter().find(|c| c.id == selection.candidate_id) {
            None => mismatches.push(format!(
                "Candidato {} no encontrado",
                selection.candidate_name
            )),
            Some(candidate) if candidate.category != selection.category => {
                mismatches.push(format!(
                    "El candidato {} no pertenece a la categoría {}",
                    candidate.name,
                    selection.category.label()
                ));
            }
            Some(_) => {}
        }
    }
    if !mismatches.is_empty() {
        return Err(SubmissionError::CandidateMismatch(mismatches));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn selection(id: Uuid, name: &str, category: Category) -> SelectionEntry {
        SelectionEntry {
            candidate_id: id,
            candidate_name: name.to_string(),
            category,
        }
    }

    fn candidate(id: Uuid, name: &str, category: Category) -> CandidateRef {
        CandidateRef {
            id,
            name: name.to_string(),
            category,
        }
    }

    #[test]
    fn presidential_and_regional_pair_passes_leaving_district_open() {
        let c1 = Uuid::new_v4();
        let c2 = Uuid::new_v4();
        let selections = vec![
            selection(c1, "C1", Category::Presidencial),
            selection(c2, "C2", Category::Regional),
        ];
        let candidates = vec![
            candidate(c1, "C1", Category::Presidencial),
            candidate(c2, "C2", Category::Regional),
        ];

        assert_eq!(
            validate_submission("12345678", true, &[], &selections, &candidates),
            Ok(())
        );
    }

    #[test]
    fn malformed_dni_fails_before_anything_else() {
        assert_eq!(
            validate_submission("1234", false, &[], &[], &[]),
            Err(SubmissionError::InvalidVoter)
        );
    }

    #[test]
    fn unknown_voter_is_rejected() {
        assert_eq!(
            validate_submission("12345678", false, &[], &[], &[]),
            Err(SubmissionError::VoterNotFound)
        );
    }

    #[test]
    fn already_voted_categories_are_enumerated() {
        let c1 = Uuid::new_v4();
        let c2 = Uuid::new_v4();
        let selections = vec![
            selection(c1, "C1", Category::Presidencial),
            selection(c2, "C2", Category::Regional),
        ];
        let candidates = vec![
            candidate(c1, "C1", Category::Presidencial),
            candidate(c2, "C2", Category::Regional),
        ];

        let result = validate_submission(
            "12345678",
            true,
            &[Category::Presidencial],
            &selections,
            &candidates,
        );
        assert_eq!(
            result,
            Err(SubmissionError::DuplicateCategory(vec![
                Category::Presidencial
            ]))
        );
    }

    #[test]
    fn candidate_in_wrong_category_is_a_mismatch() {
        let c1 = Uuid::new_v4();
        let selections = vec![selection(c1, "C1", Category::Presidencial)];
        let candidates = vec![candidate(c1, "C1", Category::Distrital)];

        match validate_submission("12345678", true, &[], &selections, &candidates) {
            Err(SubmissionError::CandidateMismatch(messages)) => {
                assert_eq!(messages.len(), 1);
                assert!(messages[0].contains("no pertenece a la categoría Presidencial"));
            }
            other => panic!("expected CandidateMismatch, got {other:?}"),
        }
    }

    #[test]
    fn missing_candidate_row_is_a_mismatch() {
        let selections = vec![selection(Uuid::new_v4(), "Fantasma", Category::Regional)];

        match validate_submission("12345678", true, &[], &selections, &[]) {
            Err(SubmissionError::CandidateMismatch(messages)) => {
                assert!(messages[0].contains("Fantasma no encontrado"));
            }
            other => panic!("expected CandidateMismatch, got {other:?}"),
        }
    }
}
