//! Time-boxed voting sessions. A session is a value object anchored to a
//! wall-clock start timestamp; remaining time is always derived from the
//! clock, never counted down in place. Sessions live only in the in-memory
//! store and are deliberately not persisted: dropping the entry clears the
//! voter id, voter snapshot, ballot and start timestamp together.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{error, info, warn};
use rocket::serde::Serialize;
use rocket::Shutdown;
use rocket_db_pools::diesel::prelude::*;
use rocket_db_pools::diesel::PgPool;
use uuid::Uuid;

use crate::ballot::BallotSelection;
use crate::models::{Category, NewVote, Voter};
use crate::schema::votes;

/// Fixed voting window per authenticated voter.
pub const SESSION_DURATION_SECS: i64 = 300;
/// Below this the session is in its warning phase.
pub const EXPIRY_WARNING_SECS: i64 = 60;
/// How long the terminal timeout notice stays up before the client
/// returns to the entry point.
pub const EXPIRED_REDIRECT_DELAY_SECS: u64 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(crate = "rocket::serde", rename_all = "lowercase")]
pub enum SessionPhase {
    Active,
    Expiring,
    Expired,
}

#[derive(Debug, Clone)]
pub struct Session {
    pub token: String,
    pub voter: Voter,
    pub started_at: DateTime<Utc>,
    pub ballot: BallotSelection,
    /// Set once the sweeper has written this session's abstentions.
    abstentions_recorded: bool,
}

impl Session {
    fn new(voter: Voter, now: DateTime<Utc>) -> Self {
        Session {
            token: Uuid::new_v4().to_string(),
            voter,
            started_at: now,
            ballot: BallotSelection::default(),
            abstentions_recorded: false,
        }
    }

    /// Seconds left in the window, clamped at zero.
    pub fn remaining(&self, now: DateTime<Utc>) -> i64 {
        (SESSION_DURATION_SECS - (now - self.started_at).num_seconds()).max(0)
    }

    pub fn phase(&self, now: DateTime<Utc>) -> SessionPhase {
        match self.remaining(now) {
            0 => SessionPhase::Expired,
            r if r <= EXPIRY_WARNING_SECS => SessionPhase::Expiring,
            _ => SessionPhase::Active,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.phase(now) == SessionPhase::Expired
    }
}

/// Single owner of all live sessions; every read and write goes through
/// here rather than scattered storage access.
#[derive(Clone, Default)]
pub struct SessionStore {
    inner: Arc<RwLock<HashMap<String, Session>>>,
}

impl SessionStore {
    /// Open a session for the voter, enforcing one live session per DNI.
    /// A re-verification replaces the previous entry but keeps its start
    /// timestamp and selections, so the voting window is never restarted.
    /// An expired entry still awaiting the sweeper is dropped without
    /// abstentions: the voter has returned.
    pub fn start(&self, voter: Voter, now: DateTime<Utc>) -> Session {
        let mut sessions = self.inner.write().expect("session store lock poisoned");
        let mut session = Session::new(voter, now);

        let previous: Vec<String> = sessions
            .values()
            .filter(|s| s.voter.dni == session.voter.dni)
            .map(|s| s.token.clone())
            .collect();
        for token in previous {
            if let Some(old) = sessions.remove(&token) {
                if !old.is_expired(now) {
                    session.started_at = old.started_at;
                    session.ballot = old.ballot;
                }
            }
        }

        sessions.insert(session.token.clone(), session.clone());
        session
    }

    pub fn get(&self, token: &str) -> Option<Session> {
        self.inner
            .read()
            .expect("session store lock poisoned")
            .get(token)
            .cloned()
    }

    pub fn remove(&self, token: &str) -> Option<Session> {
        self.inner
            .write()
            .expect("session store lock poisoned")
            .remove(token)
    }

    /// Mutate the ballot of a live session; `None` if the session is gone.
    pub fn with_ballot<F, R>(&self, token: &str, f: F) -> Option<R>
    where
        F: FnOnce(&mut BallotSelection) -> R,
    {
        self.inner
            .write()
            .expect("session store lock poisoned")
            .get_mut(token)
            .map(|session| f(&mut session.ballot))
    }

    /// Expired sessions that still need abstention recording. Each is
    /// marked as handled before being returned, so a session is handed
    /// over exactly once.
    pub fn take_newly_expired(&self, now: DateTime<Utc>) -> Vec<Session> {
        self.inner
            .write()
            .expect("session store lock poisoned")
            .values_mut()
            .filter(|s| s.is_expired(now) && !s.abstentions_recorded)
            .map(|s| {
                s.abstentions_recorded = true;
                s.clone()
            })
            .collect()
    }

    /// Drop sessions whose terminal notice window has passed. The entry
    /// lingers for `EXPIRED_REDIRECT_DELAY_SECS` after expiry so the
    /// session endpoint can still report the timeout notice.
    pub fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let mut sessions = self.inner.write().expect("session store lock poisoned");
        let before = sessions.len();
        sessions.retain(|_, s| {
            (now - s.started_at).num_seconds()
                < SESSION_DURATION_SECS + EXPIRED_REDIRECT_DELAY_SECS as i64
        });
        before - sessions.len()
    }
}

/// Categories still lacking any vote row (real or abstention).
pub fn missing_categories(voted: &[Category]) -> Vec<Category> {
    Category::ALL
        .into_iter()
        .filter(|c| !voted.contains(c))
        .collect()
}

/// The only autonomous background operation: a 1-second tick that records
/// abstentions for newly expired sessions, then drops entries whose notice
/// window has passed. Stops on server shutdown so no work leaks past
/// teardown.
pub async fn expiry_sweeper(pool: PgPool, store: SessionStore, mut shutdown: Shutdown) {
    let mut interval = rocket::tokio::time::interval(Duration::from_secs(1));
    loop {
        rocket::tokio::select! {
            _ = &mut shutdown => break,
            _ = interval.tick() => {
                let now = Utc::now();
                for session in store.take_newly_expired(now) {
                    let dni = session.voter.dni.clone();
                    match pool.get().await {
                        Ok(mut conn) => match record_abstentions(&mut conn, &dni).await {
                            Ok(count) => info!(
                                "session for voter {dni} expired, {count} abstention(s) recorded"
                            ),
                            // Best effort: teardown proceeds regardless.
                            Err(e) => error!("failed to record abstentions for {dni}: {e}"),
                        },
                        Err(e) => warn!("no database connection for expiry of {dni}: {e}"),
                    }
                }
                store.purge_expired(now);
            }
        }
    }
}

/// Insert an abstention row (`candidate_id = NULL`) for every category the
/// voter has not voted in. Returns how many rows were written.
pub async fn record_abstentions(
    conn: &mut rocket_db_pools::diesel::AsyncPgConnection,
    dni: &str,
) -> Result<usize, diesel::result::Error> {
    let voted: Vec<Category> = votes::table
        .filter(votes::voter_dni.eq(dni))
        .select(votes::category)
        .load(conn)
        .await?;

    let abstentions: Vec<NewVote> = missing_categories(&voted)
        .into_iter()
        .map(|category| NewVote {
            voter_dni: dni.to_string(),
            candidate_id: None,
            category,
        })
        .collect();

    if abstentions.is_empty() {
        return Ok(0);
    }

    diesel::insert_into(votes::table)
        .values(&abstentions)
        .execute(conn)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn voter() -> Voter {
        Voter {
            dni: "12345678".to_string(),
            full_name: "MARIA ELENA QUISPE MAMANI".to_string(),
            address: "Av. Arequipa 123".to_string(),
            district: "Miraflores".to_string(),
            province: "Lima".to_string(),
            department: "Lima".to_string(),
            birth_date: NaiveDate::from_ymd_opt(1985, 3, 15).unwrap(),
            photo_url: None,
            created_at: NaiveDate::from_ymd_opt(2025, 11, 14)
                .unwrap()
                .and_hms_opt(10, 0, 0)
                .unwrap(),
        }
    }

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-11-14T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn remaining_time_is_non_increasing_and_clamped() {
        let session = Session::new(voter(), now());
        let mut previous = i64::MAX;
        for elapsed in [0, 1, 60, 240, 299, 300, 301, 500] {
            let remaining = session.remaining(now() + chrono::Duration::seconds(elapsed));
            assert!(remaining <= previous);
            assert!(remaining >= 0);
            previous = remaining;
        }
        assert_eq!(session.remaining(now()), SESSION_DURATION_SECS);
        assert_eq!(
            session.remaining(now() + chrono::Duration::seconds(300)),
            0
        );
    }

    #[test]
    fn phase_transitions_at_warning_and_expiry() {
        let session = Session::new(voter(), now());
        let at = |s: i64| now() + chrono::Duration::seconds(s);

        assert_eq!(session.phase(at(0)), SessionPhase::Active);
        assert_eq!(session.phase(at(239)), SessionPhase::Active);
        assert_eq!(session.phase(at(240)), SessionPhase::Expiring);
        assert_eq!(session.phase(at(299)), SessionPhase::Expiring);
        assert_eq!(session.phase(at(300)), SessionPhase::Expired);
        assert_eq!(session.phase(at(1000)), SessionPhase::Expired);
    }

    #[test]
    fn newly_expired_sessions_are_handed_over_exactly_once() {
        let store = SessionStore::default();
        let session = store.start(voter(), now());

        assert!(store.take_newly_expired(now()).is_empty());

        let later = now() + chrono::Duration::seconds(301);
        let drained = store.take_newly_expired(later);
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].token, session.token);

        // Re-entering the check finds nothing new.
        assert!(store.take_newly_expired(later).is_empty());
    }

    #[test]
    fn expired_session_lingers_for_the_notice_window() {
        let store = SessionStore::default();
        let session = store.start(voter(), now());

        let expired_at = now() + chrono::Duration::seconds(300);
        assert_eq!(store.take_newly_expired(expired_at).len(), 1);

        // Still readable so the timeout notice can be shown.
        let snapshot = store.get(&session.token).unwrap();
        assert_eq!(snapshot.phase(expired_at), SessionPhase::Expired);

        let within_notice = now() + chrono::Duration::seconds(306);
        assert_eq!(store.purge_expired(within_notice), 0);
        assert!(store.get(&session.token).is_some());

        let past_notice = now() + chrono::Duration::seconds(307);
        assert_eq!(store.purge_expired(past_notice), 1);
        assert!(store.get(&session.token).is_none());
    }

    #[test]
    fn reverification_replaces_the_session_and_keeps_the_window() {
        let store = SessionStore::default();
        let first = store.start(voter(), now());
        store.with_ballot(&first.token, |ballot| {
            ballot.select(Uuid::new_v4(), "C1", Category::Presidencial)
        });

        let later = now() + chrono::Duration::seconds(100);
        let second = store.start(voter(), later);

        assert_ne!(second.token, first.token);
        assert!(store.get(&first.token).is_none());
        // The window and selections carry over instead of restarting.
        assert_eq!(second.started_at, first.started_at);
        assert_eq!(second.remaining(later), 200);
        assert_eq!(second.ballot.entries().len(), 1);

        // Only the replacement ever reaches the sweeper, so the orphaned
        // entry can never trigger abstentions against the live session.
        let end = now() + chrono::Duration::seconds(301);
        let drained = store.take_newly_expired(end);
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].token, second.token);
    }

    #[test]
    fn expired_unswept_session_is_dropped_on_reverification() {
        let store = SessionStore::default();
        let first = store.start(voter(), now());

        let later = now() + chrono::Duration::seconds(400);
        let second = store.start(voter(), later);

        // The returning voter gets a fresh window; the stale entry is gone
        // and no longer eligible for abstention recording.
        assert_eq!(second.remaining(later), SESSION_DURATION_SECS);
        assert!(store.get(&first.token).is_none());
        let drained = store.take_newly_expired(later);
        assert!(drained.iter().all(|s| s.token != first.token));
    }

    #[test]
    fn abstentions_cover_every_unvoted_category() {
        assert_eq!(missing_categories(&[]), Category::ALL.to_vec());
        assert_eq!(
            missing_categories(&[Category::Presidencial]),
            vec![Category::Distrital, Category::Regional]
        );
        assert!(missing_categories(&Category::ALL).is_empty());
    }

    #[test]
    fn ballot_is_reachable_only_while_session_lives() {
        let store = SessionStore::default();
        let session = store.start(voter(), now());

        let outcome = store.with_ballot(&session.token, |ballot| {
            ballot.select(Uuid::new_v4(), "C1", Category::Presidencial)
        });
        assert!(outcome.is_some());

        store.remove(&session.token);
        assert!(store
            .with_ballot(&session.token, |ballot| ballot.is_empty())
            .is_none());
    }
}
