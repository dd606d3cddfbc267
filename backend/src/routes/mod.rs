// Routes module - organizes all HTTP route handlers

pub mod identity;
pub mod voting;

use rocket::http::{CookieJar, Status};
use rocket::serde::json::Json;

use crate::errors::{ApiError, ErrorBody};
use crate::session::{Session, SessionStore};

pub const SESSION_COOKIE: &str = "session_token";

/// Resolve the caller's live session from the cookie, or fail with 401.
/// An expired session still present in the store (the sweeper has not run
/// yet) counts as absent; the sweeper owns its teardown.
pub fn require_session(
    store: &SessionStore,
    cookies: &CookieJar<'_>,
    now: chrono::DateTime<chrono::Utc>,
) -> Result<Session, ApiError> {
    let token = cookies
        .get(SESSION_COOKIE)
        .map(|c| c.value())
        .ok_or(ApiError::SessionRequired)?;

    let session = store.get(token).ok_or(ApiError::SessionRequired)?;
    if session.is_expired(now) {
        return Err(ApiError::SessionRequired);
    }
    Ok(session)
}

#[catch(404)]
pub fn not_found() -> Json<ErrorBody> {
    Json(ErrorBody {
        error: "Recurso no encontrado".to_string(),
        details: Vec::new(),
    })
}

#[catch(401)]
pub fn unauthorized() -> Status {
    Status::Unauthorized
}
