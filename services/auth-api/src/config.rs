//! Configuration for the Auth API service.

use std::time::Duration;

use warden_auth_core::AuthConfig;

/// Auth API configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server port
    pub http_port: u16,

    /// Database URL
    pub database_url: String,

    /// Redis URL for the ephemeral store
    pub redis_url: String,

    /// Auth core configuration
    pub auth: AuthConfig,

    /// How often expired session records are purged
    pub session_sweep_interval: Duration,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let database_url = get("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?;
        let redis_url = get("REDIS_URL").ok_or(ConfigError::Missing("REDIS_URL"))?;
        let http_port = parse_or(&get, "HTTP_PORT", 8080u16)?;

        // Token secret (minimum 32 bytes)
        let token_secret = get("TOKEN_SECRET").ok_or(ConfigError::Missing("TOKEN_SECRET"))?;

        let access_ttl_secs: u64 = parse_or(&get, "ACCESS_TTL_SECS", 15 * 60)?;
        let refresh_ttl_days: u64 = parse_or(&get, "REFRESH_TTL_DAYS", 30)?;
        let refresh_short_ttl_hours: u64 = parse_or(&get, "REFRESH_SHORT_TTL_HOURS", 24)?;
        let sweep_secs: u64 = parse_or(&get, "SESSION_SWEEP_SECS", 15 * 60)?;

        if access_ttl_secs == 0 {
            return Err(ConfigError::Invalid("ACCESS_TTL_SECS"));
        }
        if sweep_secs == 0 {
            return Err(ConfigError::Invalid("SESSION_SWEEP_SECS"));
        }

        let auth = AuthConfig::try_new(token_secret)
            .map_err(|e| ConfigError::AuthConfig(e.to_string()))?
            .with_access_ttl(Duration::from_secs(access_ttl_secs))
            .with_refresh_ttls(
                Duration::from_secs(refresh_ttl_days * 24 * 60 * 60),
                Duration::from_secs(refresh_short_ttl_hours * 60 * 60),
            );

        Ok(Self {
            http_port,
            database_url,
            redis_url,
            auth,
            session_sweep_interval: Duration::from_secs(sweep_secs),
        })
    }
}

fn parse_or<T: std::str::FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match get(key) {
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid(key)),
        None => Ok(default),
    }
}

/// Configuration error
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),

    #[error("Auth config error: {0}")]
    AuthConfig(String),
}
