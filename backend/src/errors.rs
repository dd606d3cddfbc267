use log::error;
use rocket::http::Status;
use rocket::response::status::Custom;
use rocket::response::{self, Responder};
use rocket::serde::json::Json;
use rocket::serde::Serialize;
use rocket::Request;
use thiserror::Error;

use crate::models::Category;

/// Failures of the identity lookup, in the order they can occur: format
/// check before any I/O, then transport, then the upstream response itself.
#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("El DNI debe tener 8 dígitos")]
    InvalidFormat,

    #[error("Error al conectar con el servicio de RENIEC")]
    Unreachable(#[from] reqwest::Error),

    #[error("Error {status}: {message}")]
    Upstream { status: u16, message: String },

    /// The provider answered but the minimum viable identity (given names and
    /// paternal surname) is still missing after normalization.
    #[error("Datos incompletos del DNI")]
    IncompleteRecord,
}

impl IdentityError {
    pub fn status(&self) -> Status {
        match self {
            IdentityError::InvalidFormat | IdentityError::IncompleteRecord => Status::BadRequest,
            IdentityError::Unreachable(_) => Status::BadGateway,
            IdentityError::Upstream { status, .. } => {
                Status::from_code(*status).unwrap_or(Status::BadGateway)
            }
        }
    }
}

/// Pre-submission validation outcomes plus the datastore's authoritative
/// duplicate signal. The pre-checks exist for friendly messages only; the
/// unique index on votes is what actually enforces one vote per category.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SubmissionError {
    #[error("DNI inválido")]
    InvalidVoter,

    #[error("DNI no encontrado en el padrón electoral")]
    VoterNotFound,

    #[error("Ya has votado en: {}", join_labels(.0))]
    DuplicateCategory(Vec<Category>),

    #[error("Uno o más candidatos no son válidos")]
    CandidateMismatch(Vec<String>),

    /// The insert was rejected by the uniqueness constraint even though the
    /// pre-check passed (check-then-act race lost to a concurrent session).
    #[error("Ya has votado en una o más de estas categorías")]
    ConstraintViolation,
}

fn join_labels(categories: &[Category]) -> String {
    categories
        .iter()
        .map(Category::label)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Route-level error. Everything here is recovered at the boundary and
/// surfaced as a JSON notice; nothing crashes a session.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error(transparent)]
    Submission(#[from] SubmissionError),

    #[error("Sesión no encontrada o expirada")]
    SessionRequired,

    #[error("Candidato no encontrado")]
    CandidateNotFound,

    #[error("No hay votos para confirmar")]
    EmptyBallot,

    #[error("Error interno del servidor")]
    Database(#[from] diesel::result::Error),
}

impl ApiError {
    fn status(&self) -> Status {
        match self {
            ApiError::Identity(e) => e.status(),
            ApiError::Submission(e) => match e {
                SubmissionError::InvalidVoter => Status::BadRequest,
                SubmissionError::VoterNotFound => Status::NotFound,
                SubmissionError::DuplicateCategory(_) | SubmissionError::ConstraintViolation => {
                    Status::Conflict
                }
                SubmissionError::CandidateMismatch(_) => Status::UnprocessableEntity,
            },
            ApiError::SessionRequired => Status::Unauthorized,
            ApiError::CandidateNotFound => Status::NotFound,
            ApiError::EmptyBallot => Status::BadRequest,
            ApiError::Database(_) => Status::InternalServerError,
        }
    }

    fn details(&self) -> Vec<String> {
        match self {
            ApiError::Submission(SubmissionError::CandidateMismatch(messages)) => messages.clone(),
            ApiError::Submission(SubmissionError::DuplicateCategory(categories)) => categories
                .iter()
                .map(|c| format!("Ya has votado en la categoría {}", c.label()))
                .collect(),
            _ => Vec::new(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(crate = "rocket::serde")]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<String>,
}

impl<'r> Responder<'r, 'static> for ApiError {
    fn respond_to(self, req: &'r Request<'_>) -> response::Result<'static> {
        if let ApiError::Database(ref e) = self {
            error!("database error: {e}");
        }
        let body = ErrorBody {
            error: self.to_string(),
            details: self.details(),
        };
        Custom(self.status(), Json(body)).respond_to(req)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_category_message_enumerates_closed_categories() {
        let err = SubmissionError::DuplicateCategory(vec![
            Category::Presidencial,
            Category::Regional,
        ]);
        assert_eq!(err.to_string(), "Ya has votado en: Presidencial, Regional");
    }

    #[test]
    fn constraint_violation_maps_to_conflict() {
        let err = ApiError::Submission(SubmissionError::ConstraintViolation);
        assert_eq!(err.status(), Status::Conflict);
    }
}
