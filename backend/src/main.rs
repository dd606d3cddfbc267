// Main application entry point

#[macro_use]
extern crate rocket;

mod ballot;
mod config;
mod db;
mod errors;
mod models;
mod reniec;
mod routes;
mod schema;
mod session;
mod tally;
mod validate;

use rocket::fairing::AdHoc;
use rocket_db_pools::Database;

use config::AppConfig;
use db::VotingDB;
use session::SessionStore;

/// Shared application state: configuration and the upstream HTTP client.
pub struct AppState {
    pub config: AppConfig,
    pub http: reqwest::Client,
}

#[rocket::launch]
fn rocket() -> _ {
    env_logger::init();

    let config = AppConfig::load();

    let figment = rocket::config::Config::figment()
        .merge(("port", config.rocket_port))
        .merge((
            "databases.sufragio_db",
            rocket_db_pools::Config {
                url: config.database_url.clone(),
                min_connections: None,
                max_connections: 64,
                connect_timeout: 3,
                idle_timeout: None,
                extensions: None,
            },
        ));

    rocket::custom(figment)
        .attach(VotingDB::init())
        .attach(AdHoc::on_ignite("Database Migrations", {
            let database_url = config.database_url.clone();
            move |rocket| db::run_migrations(rocket, database_url)
        }))
        .manage(SessionStore::default())
        .manage(AppState {
            http: reqwest::Client::new(),
            config,
        })
        .attach(AdHoc::on_liftoff("Session Expiry Sweeper", |rocket| {
            Box::pin(async move {
                let pool = VotingDB::fetch(rocket)
                    .expect("database pool initialized")
                    .0
                    .clone();
                let store = rocket
                    .state::<SessionStore>()
                    .expect("session store managed")
                    .clone();
                let shutdown = rocket.shutdown();
                rocket::tokio::spawn(session::expiry_sweeper(pool, store, shutdown));
            })
        }))
        .mount(
            "/api",
            routes![
                routes::identity::reniec_proxy,
                routes::identity::verify,
                routes::voting::client::get_session_info,
                routes::voting::client::logout,
                routes::voting::client::get_candidates,
                routes::voting::client::get_results,
                routes::voting::client::select_candidate,
                routes::voting::client::get_ballot,
                routes::voting::client::submit_votes,
                routes::voting::admin::get_admin_results,
                routes::voting::admin::get_stats,
            ],
        )
        .register("/", catchers![routes::not_found, routes::unauthorized])
}
