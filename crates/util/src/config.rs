use std::{fmt, net::SocketAddr, str::FromStr};

use crate::{var_or, DEFAULT_BIND_ADDR, DEFAULT_DATABASE_URL, DEFAULT_MAX_CONNECTIONS};

/// Deployment environment, selected with `APP_ENV`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Environment {
    #[default]
    Development,
    Production,
    Test,
}

impl Environment {
    /// Name used in log fields.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
            Self::Test => "test",
        }
    }
}

impl FromStr for Environment {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Self::Development),
            "production" | "prod" => Ok(Self::Production),
            "test" => Ok(Self::Test),
            _ => Err(ConfigError::InvalidEnvironment(value.to_string())),
        }
    }
}

/// Where venue data lives and how many pooled connections may be open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl DatabaseConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let url = var_or("DATABASE_URL", DEFAULT_DATABASE_URL);
        if !url.starts_with("sqlite:") {
            return Err(ConfigError::UnsupportedDatabase(url));
        }

        let raw = var_or("DATABASE_MAX_CONNECTIONS", &DEFAULT_MAX_CONNECTIONS.to_string());
        let max_connections = match raw.parse::<u32>() {
            Ok(value) if value > 0 => value,
            _ => return Err(ConfigError::MaxConnections(raw)),
        };

        Ok(Self {
            url,
            max_connections,
        })
    }
}

/// Settings for the venue service, read from the process environment.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub environment: Environment,
    pub database: DatabaseConfig,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let environment = var_or("APP_ENV", Environment::default().as_str()).parse()?;
        let bind_addr = var_or("APP_BIND_ADDR", DEFAULT_BIND_ADDR)
            .parse()
            .map_err(ConfigError::BindAddress)?;

        Ok(Self {
            bind_addr,
            environment,
            database: DatabaseConfig::from_env()?,
        })
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidEnvironment(String),
    BindAddress(std::net::AddrParseError),
    UnsupportedDatabase(String),
    MaxConnections(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidEnvironment(value) => write!(
                f,
                "APP_ENV must be one of 'development', 'production', or 'test' (got {value})"
            ),
            Self::BindAddress(err) => write!(f, "invalid APP_BIND_ADDR value: {err}"),
            Self::UnsupportedDatabase(value) => {
                write!(f, "DATABASE_URL must use the sqlite: scheme (got {value})")
            }
            Self::MaxConnections(value) => write!(
                f,
                "DATABASE_MAX_CONNECTIONS must be a positive integer (got {value})"
            ),
        }
    }
}

impl std::error::Error for ConfigError {}
