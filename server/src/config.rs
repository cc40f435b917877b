//! Configuration management for the server.

use std::env;

use changeline_engine::{DEFAULT_HISTORY_LIMIT, DEFAULT_SAVING_TOAST_MS};

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server host address
    pub host: String,
    /// Server port
    pub port: u16,
    /// Base URL of the upstream change API
    pub upstream_url: String,
    /// Bearer token sent to the upstream API
    pub upstream_token: Option<String>,
    /// Bearer token required on UI routes; open access when unset
    pub auth_secret: Option<String>,
    /// Auto-dismiss delay of the "saving" toast
    pub saving_toast_ms: u64,
    /// Default history page size
    pub history_limit: u32,
    /// Whether history rows offer rollback
    pub rollback_enabled: bool,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let host = lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string());

        let port = lookup("PORT")
            .unwrap_or_else(|| "3000".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidPort)?;

        let upstream_url = lookup("UPSTREAM_API_URL")
            .filter(|url| !url.trim().is_empty())
            .ok_or(ConfigError::MissingUpstreamUrl)?;

        let saving_toast_ms = match lookup("SAVING_TOAST_MS") {
            Some(value) => value
                .parse()
                .map_err(|_| ConfigError::InvalidNumber("SAVING_TOAST_MS"))?,
            None => DEFAULT_SAVING_TOAST_MS,
        };

        let history_limit = match lookup("HISTORY_LIMIT") {
            Some(value) => value
                .parse()
                .map_err(|_| ConfigError::InvalidNumber("HISTORY_LIMIT"))?,
            None => DEFAULT_HISTORY_LIMIT,
        };

        let rollback_enabled = match lookup("ROLLBACK_ENABLED").as_deref() {
            None | Some("true") | Some("1") => true,
            Some("false") | Some("0") => false,
            Some(_) => return Err(ConfigError::InvalidFlag("ROLLBACK_ENABLED")),
        };

        Ok(Self {
            host,
            port,
            upstream_url,
            upstream_token: lookup("UPSTREAM_TOKEN"),
            auth_secret: lookup("AUTH_SECRET"),
            saving_toast_ms,
            history_limit,
            rollback_enabled,
        })
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("UPSTREAM_API_URL environment variable is required")]
    MissingUpstreamUrl,

    #[error("Invalid PORT value")]
    InvalidPort,

    #[error("Invalid {0} value, expected a non-negative integer")]
    InvalidNumber(&'static str),

    #[error("Invalid {0} value, expected true or false")]
    InvalidFlag(&'static str),
}
