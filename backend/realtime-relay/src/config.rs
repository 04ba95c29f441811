use dotenvy::dotenv;
use std::env;
use std::time::Duration;

use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub jwt_secret: String,
    /// In-memory store when unset
    pub database_url: Option<String>,
    pub db_max_connections: usize,
    /// Any origin is allowed when unset
    pub cors_origin: Option<String>,
    pub heartbeat_interval: Duration,
    pub client_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary variable source. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let jwt_secret =
            var("JWT_SECRET").ok_or_else(|| AppError::Config("JWT_SECRET missing".into()))?;

        let port = parse_or(var("PORT"), "PORT", 4002)?;
        let db_max_connections = parse_or(var("DB_MAX_CONNECTIONS"), "DB_MAX_CONNECTIONS", 10)?;
        let heartbeat_secs = parse_or(
            var("WS_HEARTBEAT_INTERVAL_SECS"),
            "WS_HEARTBEAT_INTERVAL_SECS",
            5,
        )?;
        let timeout_secs =
            parse_or(var("WS_CLIENT_TIMEOUT_SECS"), "WS_CLIENT_TIMEOUT_SECS", 30)?;

        if heartbeat_secs == 0 || timeout_secs <= heartbeat_secs {
            return Err(AppError::Config(format!(
                "WS_CLIENT_TIMEOUT_SECS ({timeout_secs}) must exceed a non-zero WS_HEARTBEAT_INTERVAL_SECS ({heartbeat_secs})"
            )));
        }

        Ok(Self {
            port,
            jwt_secret,
            database_url: var("DATABASE_URL"),
            db_max_connections,
            cors_origin: var("CORS_ORIGIN"),
            heartbeat_interval: Duration::from_secs(heartbeat_secs),
            client_timeout: Duration::from_secs(timeout_secs),
        })
    }
}

fn parse_or<T: std::str::FromStr>(raw: Option<String>, key: &str, default: T) -> Result<T, AppError> {
    match raw {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| AppError::Config(format!("{key} is not a valid number: {value:?}"))),
    }
}
