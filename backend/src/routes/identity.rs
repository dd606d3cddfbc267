use chrono::Utc;
use diesel::result::{DatabaseErrorKind, Error};
use log::{info, warn};
use rocket::http::{Cookie, CookieJar, SameSite, Status};
use rocket::serde::json::Json;
use rocket::serde::Serialize;
use rocket::State;
use rocket_db_pools::diesel::prelude::*;
use rocket_db_pools::Connection;

use crate::db::VotingDB;
use crate::errors::ApiError;
use crate::models::{
    Category, SessionInfoResponse, VerifyRequest, VerifyResponse, Voter, VoterUpdate,
};
use crate::reniec::{self, ReniecRecord};
use crate::routes::SESSION_COOKIE;
use crate::schema::{voters, votes};
use crate::session::SessionStore;
use crate::AppState;

/// Response contract of the lookup proxy, kept compatible with the
/// original front-end consumer.
#[derive(Debug, Serialize)]
#[serde(crate = "rocket::serde")]
pub struct ReniecProxyResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<ReniecRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

// Same-origin lookup proxy: injects the server-held provider credential the
// client never sees. Pure lookup, no persistence.
#[get("/reniec?<numero>")]
pub async fn reniec_proxy(
    state: &State<AppState>,
    numero: &str,
) -> (Status, Json<ReniecProxyResponse>) {
    match reniec::lookup(&state.http, &state.config, numero).await {
        Ok(data) => (
            Status::Ok,
            Json(ReniecProxyResponse {
                success: true,
                data: Some(data),
                error: None,
                message: None,
            }),
        ),
        Err(e) => (
            e.status(),
            Json(ReniecProxyResponse {
                success: false,
                data: None,
                error: Some(e.to_string()),
                message: Some("Error al consultar el DNI en RENIEC".to_string()),
            }),
        ),
    }
}

// Identity verification entry point: lookup, registry sync, session start.
#[post("/verify", format = "json", data = "<request>")]
pub async fn verify(
    mut db: Connection<VotingDB>,
    state: &State<AppState>,
    store: &State<SessionStore>,
    cookies: &CookieJar<'_>,
    request: Json<VerifyRequest>,
) -> Result<Json<VerifyResponse>, ApiError> {
    let dni = request.dni.trim().to_string();
    let record = reniec::lookup(&state.http, &state.config, &dni).await?;
    let voter = sync_voter(&mut db, &dni, record).await?;

    let voted_categories: Vec<Category> = votes::table
        .filter(votes::voter_dni.eq(&dni))
        .select(votes::category)
        .load(&mut db)
        .await?;

    let now = Utc::now();
    let session = store.start(voter.clone(), now);

    let mut cookie = Cookie::new(SESSION_COOKIE, session.token.clone());
    cookie.set_http_only(true);
    cookie.set_same_site(SameSite::Lax);
    cookie.set_path("/");
    cookies.add(cookie);

    info!("voter {dni} verified, session {} started", session.token);

    Ok(Json(VerifyResponse {
        session: SessionInfoResponse {
            dni: voter.dni.clone(),
            full_name: voter.full_name.clone(),
            remaining_seconds: session.remaining(now),
            phase: session.phase(now),
            voted_categories,
            redirect_after_seconds: None,
        },
        voter,
    }))
}

/// Create-or-update of the canonical voter record, keyed by DNI. Two
/// near-simultaneous verifications can race between the existence check and
/// the insert; the primary key is the backstop, and losing that race just
/// means the voter already exists.
async fn sync_voter(
    db: &mut Connection<VotingDB>,
    dni: &str,
    record: ReniecRecord,
) -> Result<Voter, ApiError> {
    let new_voter = record.into_new_voter(dni);

    let existing = voters::table
        .find(dni)
        .first::<Voter>(&mut **db)
        .await
        .optional()?;

    if existing.is_some() {
        // Refresh stale fields in place; fall back to the stored row if the
        // update fails rather than aborting the verification.
        let update = VoterUpdate::from(&new_voter);
        if let Err(e) = diesel::update(voters::table.find(dni))
            .set(&update)
            .execute(&mut **db)
            .await
        {
            warn!("failed to refresh voter {dni}, keeping stored record: {e}");
        }
    } else {
        match diesel::insert_into(voters::table)
            .values(&new_voter)
            .execute(&mut **db)
            .await
        {
            Ok(_) => {}
            Err(Error::DatabaseError(DatabaseErrorKind::UniqueViolation, _)) => {
                // Lost the race to a concurrent verification of the same DNI.
                info!("voter {dni} already registered concurrently");
            }
            Err(e) => return Err(e.into()),
        }
    }

    let voter = voters::table.find(dni).first::<Voter>(&mut **db).await?;
    Ok(voter)
}
