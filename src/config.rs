use serde::{Deserialize, Serialize};

use crate::auth::{DEFAULT_ACCESS_TTL_SECS, DEFAULT_REFRESH_TTL_SECS};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub port: u16,
    pub database_url: Option<String>,
    pub access_token_ttl_secs: i64,
    pub refresh_token_ttl_secs: i64,
    pub bootstrap_username: Option<String>,
    pub bootstrap_email: Option<String>,
    pub bootstrap_password: Option<String>,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            port: env_parsed("WARDEN_PORT").unwrap_or(8080),
            database_url: std::env::var("DATABASE_URL").ok(),
            access_token_ttl_secs: env_parsed("WARDEN_ACCESS_TTL_SECS")
                .unwrap_or(DEFAULT_ACCESS_TTL_SECS),
            refresh_token_ttl_secs: env_parsed("WARDEN_REFRESH_TTL_SECS")
                .unwrap_or(DEFAULT_REFRESH_TTL_SECS),
            bootstrap_username: std::env::var("WARDEN_BOOTSTRAP_USERNAME").ok(),
            bootstrap_email: std::env::var("WARDEN_BOOTSTRAP_EMAIL").ok(),
            bootstrap_password: std::env::var("WARDEN_BOOTSTRAP_PASSWORD").ok(),
        }
    }
}

fn env_parsed<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|value| value.parse().ok())
}
