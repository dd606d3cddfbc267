use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime};
use diesel::deserialize::{self, FromSql};
use diesel::pg::{Pg, PgValue};
use diesel::serialize::{self, Output, ToSql};
use diesel::sql_types::Text;
use diesel::{AsExpression, FromSqlRow};
use rocket::serde::{Deserialize, Serialize};
use rocket_db_pools::diesel::prelude::*;
use uuid::Uuid;

use crate::schema::{candidates, voters, votes};

/// One of the three independent ballot categories. Stored as a checked
/// varchar column; the wire and storage value is the lowercase Spanish name.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, AsExpression, FromSqlRow,
)]
#[diesel(sql_type = Text)]
#[serde(crate = "rocket::serde", rename_all = "lowercase")]
pub enum Category {
    Presidencial,
    Distrital,
    Regional,
}

impl Category {
    pub const ALL: [Category; 3] =
        [Category::Presidencial, Category::Distrital, Category::Regional];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Presidencial => "presidencial",
            Category::Distrital => "distrital",
            Category::Regional => "regional",
        }
    }

    /// Human-facing label used in notices.
    pub fn label(&self) -> &'static str {
        match self {
            Category::Presidencial => "Presidencial",
            Category::Distrital => "Distrital",
            Category::Regional => "Regional",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "presidencial" => Ok(Category::Presidencial),
            "distrital" => Ok(Category::Distrital),
            "regional" => Ok(Category::Regional),
            other => Err(format!("unrecognized category: {other}")),
        }
    }
}

impl FromSql<Text, Pg> for Category {
    fn from_sql(value: PgValue<'_>) -> deserialize::Result<Self> {
        let s = std::str::from_utf8(value.as_bytes())?;
        s.parse().map_err(Into::into)
    }
}

impl ToSql<Text, Pg> for Category {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
        <str as ToSql<Text, Pg>>::to_sql(self.as_str(), out)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Selectable)]
#[diesel(table_name = voters)]
pub struct Voter {
    pub dni: String,
    pub full_name: String,
    pub address: String,
    pub district: String,
    pub province: String,
    pub department: String,
    pub birth_date: NaiveDate,
    pub photo_url: Option<String>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = voters)]
pub struct NewVoter {
    pub dni: String,
    pub full_name: String,
    pub address: String,
    pub district: String,
    pub province: String,
    pub department: String,
    pub birth_date: NaiveDate,
    pub photo_url: Option<String>,
}

/// Mutable voter fields refreshed on re-verification. The key and any vote
/// linkage are untouched; a missing photo keeps the stored one.
#[derive(Debug, Clone, AsChangeset)]
#[diesel(table_name = voters)]
pub struct VoterUpdate {
    pub full_name: String,
    pub address: String,
    pub district: String,
    pub province: String,
    pub department: String,
    pub birth_date: NaiveDate,
    pub photo_url: Option<String>,
}

impl From<&NewVoter> for VoterUpdate {
    fn from(v: &NewVoter) -> Self {
        VoterUpdate {
            full_name: v.full_name.clone(),
            address: v.address.clone(),
            district: v.district.clone(),
            province: v.province.clone(),
            department: v.department.clone(),
            birth_date: v.birth_date,
            photo_url: v.photo_url.clone(),
        }
    }
}

/// Maintained by administrators out of band; read-only to the voting flow.
#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Selectable)]
#[diesel(table_name = candidates)]
pub struct Candidate {
    pub id: Uuid,
    pub name: String,
    pub photo_url: Option<String>,
    pub description: Option<String>,
    pub party_name: String,
    pub party_logo_url: Option<String>,
    pub party_description: Option<String>,
    pub academic_formation: Option<String>,
    pub professional_experience: Option<String>,
    pub campaign_proposal: Option<String>,
    pub category: Category,
    pub vote_count: i32,
}

/// A vote row to insert. `candidate_id = None` records an abstention after a
/// session timeout; such rows are exempt from the uniqueness backstop.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = votes)]
pub struct NewVote {
    pub voter_dni: String,
    pub candidate_id: Option<Uuid>,
    pub category: Category,
}

#[derive(Debug, Deserialize)]
#[serde(crate = "rocket::serde")]
pub struct VerifyRequest {
    pub dni: String,
}

#[derive(Debug, Deserialize)]
#[serde(crate = "rocket::serde")]
pub struct SelectRequest {
    pub candidate_id: Uuid,
}

#[derive(Debug, Serialize)]
#[serde(crate = "rocket::serde")]
pub struct VerifyResponse {
    pub voter: Voter,
    pub session: SessionInfoResponse,
}

#[derive(Debug, Serialize)]
#[serde(crate = "rocket::serde")]
pub struct SessionInfoResponse {
    pub dni: String,
    pub full_name: String,
    pub remaining_seconds: i64,
    pub phase: crate::session::SessionPhase,
    pub voted_categories: Vec<Category>,
    /// Present only once the session has expired: how long the terminal
    /// notice stays on screen before the client returns to the entry point.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_after_seconds: Option<u64>,
}

#[derive(Debug, Serialize)]
#[serde(crate = "rocket::serde")]
pub struct BallotResponse {
    pub message: String,
    pub selections: Vec<crate::ballot::SelectionEntry>,
}

#[derive(Debug, Serialize)]
#[serde(crate = "rocket::serde")]
pub struct SubmitResponse {
    pub recorded: Vec<Category>,
    /// Result of the post-insert read-back. `false` is a warning, not a
    /// failure: the insert itself is the commit point.
    pub verified: bool,
    pub message: String,
    pub redirect_after_ms: u64,
}

#[derive(Debug, Serialize)]
#[serde(crate = "rocket::serde")]
pub struct CandidateTally {
    pub id: Uuid,
    pub name: String,
    pub category: Category,
    pub votes: i64,
}

#[derive(Debug, Serialize)]
#[serde(crate = "rocket::serde")]
pub struct AbstentionTally {
    pub category: Category,
    pub votes: i64,
}

#[derive(Debug, Serialize)]
#[serde(crate = "rocket::serde")]
pub struct AdminResultsResponse {
    pub candidates: Vec<CandidateTally>,
    pub abstentions: Vec<AbstentionTally>,
}
