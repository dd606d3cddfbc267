use rocket::figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::Deserialize;

#[derive(Deserialize, Clone)]
pub struct AppConfig {
    #[serde(alias = "DATABASE_URL")]
    pub database_url: String,
    /// Upstream identity provider, queried as `{reniec_api_url}/{dni}`.
    #[serde(default = "default_reniec_api_url", alias = "RENIEC_API_URL")]
    pub reniec_api_url: String,
    /// Server-held credential injected into upstream requests. The client
    /// never sees it; that is the point of proxying the lookup.
    #[serde(default, alias = "RENIEC_API_KEY")]
    pub reniec_api_key: Option<String>,
    #[serde(default = "default_rocket_port", alias = "ROCKET_PORT")]
    pub rocket_port: u16,
}

fn default_reniec_api_url() -> String {
    "https://api.factiliza.com/v1/dni/info".to_string()
}

fn default_rocket_port() -> u16 {
    8000
}

impl AppConfig {
    pub fn load() -> Self {
        Figment::new()
            .merge(Toml::file("Config.toml"))
            .merge(Toml::file("../Config.toml"))
            .merge(Env::raw().only(&[
                "DATABASE_URL",
                "RENIEC_API_URL",
                "RENIEC_API_KEY",
                "ROCKET_PORT",
            ]))
            .extract()
            .expect("Failed to load configuration. Ensure Config.toml exists or environment variables are set (DATABASE_URL).")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_style_settings_need_no_environment() {
        let config: AppConfig = Figment::new()
            .merge(("database_url", "postgres://localhost/sufragio"))
            .extract()
            .unwrap();
        assert_eq!(config.database_url, "postgres://localhost/sufragio");
        assert_eq!(config.reniec_api_url, default_reniec_api_url());
        assert_eq!(config.reniec_api_key, None);
        assert_eq!(config.rocket_port, 8000);
    }
}
