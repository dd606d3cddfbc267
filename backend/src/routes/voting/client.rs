use chrono::Utc;
use diesel::result::{DatabaseErrorKind, Error};
use log::{info, warn};
use rocket::http::{Cookie, CookieJar, Status};
use rocket::serde::json::Json;
use rocket::State;
use rocket_db_pools::diesel::prelude::*;
use rocket_db_pools::Connection;
use uuid::Uuid;

use crate::ballot::SelectionOutcome;
use crate::db::VotingDB;
use crate::errors::{ApiError, SubmissionError};
use crate::models::{
    BallotResponse, Candidate, Category, NewVote, SelectRequest, SessionInfoResponse,
    SubmitResponse,
};
use crate::routes::{require_session, SESSION_COOKIE};
use crate::schema::{candidates, voters, votes};
use crate::session::{SessionPhase, SessionStore, EXPIRED_REDIRECT_DELAY_SECS};
use crate::tally::{self, CandidateStanding};
use crate::validate::{validate_submission, CandidateRef};

// Route to get current session info (remaining time, phase, closed
// categories). An expired session still awaiting the sweeper is reported as
// the terminal notice; a session already torn down is simply gone (401).
#[get("/session")]
pub async fn get_session_info(
    mut db: Connection<VotingDB>,
    store: &State<SessionStore>,
    cookies: &CookieJar<'_>,
) -> Result<Json<SessionInfoResponse>, ApiError> {
    let now = Utc::now();
    let token = cookies
        .get(SESSION_COOKIE)
        .map(|c| c.value())
        .ok_or(ApiError::SessionRequired)?;
    let session = store.get(token).ok_or(ApiError::SessionRequired)?;

    let voted_categories: Vec<Category> = votes::table
        .filter(votes::voter_dni.eq(&session.voter.dni))
        .select(votes::category)
        .load(&mut db)
        .await?;

    let phase = session.phase(now);
    Ok(Json(SessionInfoResponse {
        dni: session.voter.dni.clone(),
        full_name: session.voter.full_name.clone(),
        remaining_seconds: session.remaining(now),
        phase,
        voted_categories,
        redirect_after_seconds: (phase == SessionPhase::Expired)
            .then_some(EXPIRED_REDIRECT_DELAY_SECS),
    }))
}

// Voluntary exit before expiry; no abstentions are recorded.
#[post("/logout")]
pub async fn logout(store: &State<SessionStore>, cookies: &CookieJar<'_>) -> Status {
    if let Some(cookie) = cookies.get(SESSION_COOKIE) {
        store.remove(cookie.value());
        cookies.remove(Cookie::from(SESSION_COOKIE));
    }
    Status::Ok
}

// Route to get candidates, ordered for display (page-load snapshot)
#[get("/candidates")]
pub async fn get_candidates(
    mut db: Connection<VotingDB>,
) -> Result<Json<Vec<Candidate>>, ApiError> {
    let results = candidates::table
        .order(candidates::vote_count.desc())
        .select(Candidate::as_select())
        .load(&mut db)
        .await?;
    Ok(Json(results))
}

// Route to get standings with per-category percentages
#[get("/results")]
pub async fn get_results(
    mut db: Connection<VotingDB>,
) -> Result<Json<Vec<CandidateStanding>>, ApiError> {
    let results = candidates::table
        .order(candidates::vote_count.desc())
        .select(Candidate::as_select())
        .load(&mut db)
        .await?;
    Ok(Json(tally::standings(results)))
}

// Toggle a candidate in the session ballot. A category the voter already
// holds a durable vote in is rejected with an explicit notice.
#[post("/ballot/select", format = "json", data = "<request>")]
pub async fn select_candidate(
    mut db: Connection<VotingDB>,
    store: &State<SessionStore>,
    cookies: &CookieJar<'_>,
    request: Json<SelectRequest>,
) -> Result<Json<BallotResponse>, ApiError> {
    let now = Utc::now();
    let session = require_session(store, cookies, now)?;

    let candidate = candidates::table
        .find(request.candidate_id)
        .select(Candidate::as_select())
        .first(&mut db)
        .await
        .optional()?
        .ok_or(ApiError::CandidateNotFound)?;

    let already_voted: i64 = votes::table
        .filter(votes::voter_dni.eq(&session.voter.dni))
        .filter(votes::category.eq(candidate.category))
        .count()
        .get_result(&mut db)
        .await?;
    if already_voted > 0 {
        return Err(SubmissionError::DuplicateCategory(vec![candidate.category]).into());
    }

    let outcome = store
        .with_ballot(&session.token, |ballot| {
            let outcome = ballot.select(candidate.id, &candidate.name, candidate.category);
            (outcome, ballot.entries().to_vec())
        })
        .ok_or(ApiError::SessionRequired)?;
    let (outcome, selections) = outcome;

    let message = match outcome {
        SelectionOutcome::Deselected => format!("Candidato {} deseleccionado", candidate.name),
        SelectionOutcome::Replaced | SelectionOutcome::Selected => format!(
            "Candidato {} seleccionado para {}",
            candidate.name,
            candidate.category.label()
        ),
    };

    Ok(Json(BallotResponse {
        message,
        selections,
    }))
}

// Route to read the current ballot
#[get("/ballot")]
pub async fn get_ballot(
    store: &State<SessionStore>,
    cookies: &CookieJar<'_>,
) -> Result<Json<BallotResponse>, ApiError> {
    let session = require_session(store, cookies, Utc::now())?;
    Ok(Json(BallotResponse {
        message: String::new(),
        selections: session.ballot.entries().to_vec(),
    }))
}

// Submit every selected vote in one batch. One successful submission of any
// subset of categories ends the session entirely.
#[post("/votes")]
pub async fn submit_votes(
    mut db: Connection<VotingDB>,
    store: &State<SessionStore>,
    cookies: &CookieJar<'_>,
) -> Result<Json<SubmitResponse>, ApiError> {
    let now = Utc::now();
    let session = require_session(store, cookies, now)?;
    let dni = session.voter.dni.clone();

    let selections = session.ballot.entries().to_vec();
    if selections.is_empty() {
        return Err(ApiError::EmptyBallot);
    }

    // Pre-checks over freshly fetched rows. These give friendly errors only;
    // the unique index remains the final arbiter below.
    let voter_found = voters::table
        .find(&dni)
        .count()
        .get_result::<i64>(&mut db)
        .await?
        > 0;

    let already_voted: Vec<Category> = votes::table
        .filter(votes::voter_dni.eq(&dni))
        .select(votes::category)
        .load(&mut db)
        .await?;

    let candidate_ids: Vec<Uuid> = selections.iter().map(|s| s.candidate_id).collect();
    let candidate_refs: Vec<CandidateRef> = candidates::table
        .filter(candidates::id.eq_any(&candidate_ids))
        .select((candidates::id, candidates::name, candidates::category))
        .load::<(Uuid, String, Category)>(&mut db)
        .await?
        .into_iter()
        .map(|(id, name, category)| CandidateRef { id, name, category })
        .collect();

    validate_submission(&dni, voter_found, &already_voted, &selections, &candidate_refs)
        .map_err(ApiError::from)?;

    let new_votes: Vec<NewVote> = selections
        .iter()
        .map(|s| NewVote {
            voter_dni: dni.clone(),
            candidate_id: Some(s.candidate_id),
            category: s.category,
        })
        .collect();

    match diesel::insert_into(votes::table)
        .values(&new_votes)
        .execute(&mut db)
        .await
    {
        Ok(_) => {}
        Err(Error::DatabaseError(DatabaseErrorKind::UniqueViolation, _)) => {
            // The pre-check passed but a concurrent submission won the race.
            // The constraint is authoritative: this voter already voted.
            return Err(SubmissionError::ConstraintViolation.into());
        }
        Err(e) => return Err(e.into()),
    }

    let recorded: Vec<Category> = selections.iter().map(|s| s.category).collect();

    // Post-insert read-back. A mismatch is a warning, never fatal: the
    // insert above is the commit point.
    let verified = match votes::table
        .filter(votes::voter_dni.eq(&dni))
        .filter(votes::category.eq_any(&recorded))
        .count()
        .get_result::<i64>(&mut db)
        .await
    {
        Ok(count) => count == selections.len() as i64,
        Err(e) => {
            warn!("vote read-back failed for {dni}: {e}");
            false
        }
    };
    if !verified {
        warn!("read-back mismatch for voter {dni} after vote insert");
    }

    // Display-only counter; the authoritative numbers come from the vote
    // rows (see /admin/results).
    if let Err(e) = diesel::update(candidates::table.filter(candidates::id.eq_any(&candidate_ids)))
        .set(candidates::vote_count.eq(candidates::vote_count + 1))
        .execute(&mut db)
        .await
    {
        warn!("failed to bump vote counters: {e}");
    }

    store.remove(&session.token);
    cookies.remove(Cookie::from(SESSION_COOKIE));
    info!("voter {dni} submitted {} vote(s), session closed", recorded.len());

    let labels = recorded
        .iter()
        .map(|c| c.label())
        .collect::<Vec<_>>()
        .join(", ");
    Ok(Json(SubmitResponse {
        recorded,
        verified,
        message: format!("¡Votos registrados exitosamente en las categorías: {labels}!"),
        redirect_after_ms: 1500,
    }))
}
