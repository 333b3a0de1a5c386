pub mod config;

use std::env;

pub use config::{AppConfig, ConfigError, DatabaseConfig, Environment};

pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8080";
pub const DEFAULT_DATABASE_URL: &str = "sqlite://venue_desk.db";
pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;

/// Loads environment variables from `.env` when available.
///
/// A missing file is not an error; deployed environments set variables directly.
pub fn load_env_file() {
    let _ = dotenvy::dotenv();
}

/// Reads `name`, treating an unset or blank variable as `default`.
pub(crate) fn var_or(name: &str, default: &str) -> String {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| default.to_string())
}
