//! Environment-driven server configuration

use std::time::Duration;

use crate::error::ApiError;

/// Server settings, read from the environment (`.env` supported).
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address, `ROOKERY_SERVER_ADDR` (default 127.0.0.1:50080).
    pub addr: String,

    /// `DATABASE_URL`; the in-memory repository is used when unset.
    pub database_url: Option<String>,

    /// Identity allowed to manage colonies, `ROOKERY_SERVER_OWNER_ID`.
    pub server_owner_id: String,

    /// `ROOKERY_ALLOW_EXECUTOR_REREGISTER` (default false).
    pub allow_executor_reregister: bool,

    /// `ROOKERY_SWEEPER_PERIOD_MS` (default 500).
    pub sweeper_period: Duration,

    /// `ROOKERY_GENERATOR_PERIOD_MS` (default 1000).
    pub generator_period: Duration,

    /// `ROOKERY_CRON_PERIOD_MS` (default 1000).
    pub cron_period: Duration,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ApiError> {
        let server_owner_id = std::env::var("ROOKERY_SERVER_OWNER_ID").map_err(|_| {
            ApiError::Internal("ROOKERY_SERVER_OWNER_ID must be set".to_string())
        })?;
        Ok(Self {
            addr: std::env::var("ROOKERY_SERVER_ADDR")
                .unwrap_or_else(|_| "127.0.0.1:50080".to_string()),
            database_url: std::env::var("DATABASE_URL").ok(),
            server_owner_id,
            allow_executor_reregister: env_bool("ROOKERY_ALLOW_EXECUTOR_REREGISTER"),
            sweeper_period: env_millis("ROOKERY_SWEEPER_PERIOD_MS", 500),
            generator_period: env_millis("ROOKERY_GENERATOR_PERIOD_MS", 1000),
            cron_period: env_millis("ROOKERY_CRON_PERIOD_MS", 1000),
        })
    }
}

fn env_bool(key: &str) -> bool {
    std::env::var(key)
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

fn env_millis(key: &str, default: u64) -> Duration {
    let millis = std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default);
    Duration::from_millis(millis)
}
