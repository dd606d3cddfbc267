// Administrator tally views. Authentication is delegated to the deployment
// (reverse proxy / datastore roles), not handled here.

use rocket::serde::json::Json;
use rocket_db_pools::diesel::prelude::*;
use rocket_db_pools::Connection;
use uuid::Uuid;

use crate::db::VotingDB;
use crate::errors::ApiError;
use crate::models::{AbstentionTally, AdminResultsResponse, CandidateTally, Category};
use crate::schema::{candidates, votes};

// Authoritative results, aggregated from the vote rows rather than the
// denormalized display counter. Abstentions (NULL candidate) never join and
// are reported separately per category.
#[get("/admin/results")]
pub async fn get_admin_results(
    mut db: Connection<VotingDB>,
) -> Result<Json<AdminResultsResponse>, ApiError> {
    use diesel::dsl::count;

    let candidate_rows = candidates::table
        .left_join(votes::table)
        .group_by(candidates::id)
        .select((
            candidates::id,
            candidates::name,
            candidates::category,
            count(votes::id.nullable()),
        ))
        .load::<(Uuid, String, Category, i64)>(&mut db)
        .await?
        .into_iter()
        .map(|(id, name, category, votes)| CandidateTally {
            id,
            name,
            category,
            votes,
        })
        .collect();

    let abstention_rows = votes::table
        .filter(votes::candidate_id.is_null())
        .group_by(votes::category)
        .select((votes::category, count(votes::id)))
        .load::<(Category, i64)>(&mut db)
        .await?
        .into_iter()
        .map(|(category, votes)| AbstentionTally { category, votes })
        .collect();

    Ok(Json(AdminResultsResponse {
        candidates: candidate_rows,
        abstentions: abstention_rows,
    }))
}

// Route to get total vote row count
#[get("/admin/stats")]
pub async fn get_stats(mut db: Connection<VotingDB>) -> Result<Json<i64>, ApiError> {
    let total: i64 = votes::table.count().get_result(&mut db).await?;
    Ok(Json(total))
}
