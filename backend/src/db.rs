// Database connection and initialization

use diesel::prelude::*;
use diesel::Connection;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use log::{error, info};
use rocket::Rocket;
use rocket_db_pools::diesel::PgPool;
use rocket_db_pools::Database;

/// Database connection pool for the voting workflow
#[derive(Database)]
#[database("sufragio_db")]
pub struct VotingDB(pub PgPool);

// Embed migrations from the migrations directory
const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

/// Run pending database migrations against the configured database.
pub async fn run_migrations(
    rocket: Rocket<rocket::Build>,
    database_url: String,
) -> Rocket<rocket::Build> {
    // Run migrations in a blocking task since MigrationHarness requires sync connection
    let result: Result<Vec<String>, String> = rocket::tokio::task::spawn_blocking(move || {
        let mut sync_conn = diesel::PgConnection::establish(&database_url)
            .map_err(|e| format!("Failed to establish connection: {}", e))?;

        let versions = sync_conn
            .run_pending_migrations(MIGRATIONS)
            .map_err(|e| format!("Failed to run migrations: {}", e))?
            .into_iter()
            .map(|v| v.to_string())
            .collect::<Vec<String>>();

        Ok(versions)
    })
    .await
    .expect("Migration task panicked");

    match result {
        Ok(versions) => {
            if versions.is_empty() {
                info!("database is up to date");
            } else {
                info!("applied {} migration(s)", versions.len());
                for version in versions {
                    info!("  - {}", version);
                }
            }
        }
        Err(e) => {
            error!("{}", e);
            panic!("Database migration failed");
        }
    }

    rocket
}
