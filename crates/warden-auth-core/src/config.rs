//! Configuration types for the session engine

use std::time::Duration;

use warden_types::RefreshClass;

use crate::crypto::HmacKey;

/// OTP challenge limits
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OtpPolicy {
    /// How long an issued code stays valid
    pub code_ttl: Duration,
    /// Wrong guesses allowed per code
    pub max_attempts: u32,
    /// Minimum gap between two codes for the same identifier and purpose
    pub resend_cooldown: Duration,
    /// Codes allowed per identifier and purpose per hour
    pub hourly_budget: u64,
    /// How long a successful verification gates the follow-up action
    pub verified_ttl: Duration,
}

impl Default for OtpPolicy {
    fn default() -> Self {
        Self {
            code_ttl: Duration::from_secs(10 * 60),
            max_attempts: 5,
            resend_cooldown: Duration::from_secs(60),
            hourly_budget: 5,
            verified_ttl: Duration::from_secs(15 * 60),
        }
    }
}

/// Session engine configuration
#[derive(Clone)]
pub struct AuthConfig {
    /// Secret for token signing and keyed hashing (at least 32 bytes)
    pub token_secret: String,
    /// `iss` claim written to and required on every token
    pub issuer: String,
    /// Access token lifetime
    pub access_ttl: Duration,
    /// Refresh lifetime for "remember me" sessions
    pub refresh_ttl_long: Duration,
    /// Refresh lifetime for all other sessions
    pub refresh_ttl_short: Duration,
    /// OTP limits
    pub otp: OtpPolicy,
    /// Lifetime of a single-flight lock
    pub single_flight_ttl: Duration,
    /// How long a mass-revocation watermark is kept
    pub revocation_watermark_ttl: Duration,
}

impl AuthConfig {
    /// Create a config with default lifetimes, validating the secret length
    pub fn try_new(token_secret: impl Into<String>) -> Result<Self, ConfigError> {
        let token_secret = token_secret.into();
        if token_secret.len() < HmacKey::MIN_KEY_LENGTH {
            return Err(ConfigError::SecretTooShort {
                actual: token_secret.len(),
                minimum: HmacKey::MIN_KEY_LENGTH,
            });
        }

        let refresh_ttl_long = Duration::from_secs(30 * 24 * 60 * 60); // 30 days
        Ok(Self {
            token_secret,
            issuer: "warden".to_string(),
            access_ttl: Duration::from_secs(15 * 60), // 15 minutes
            refresh_ttl_long,
            refresh_ttl_short: Duration::from_secs(24 * 60 * 60), // 1 day
            otp: OtpPolicy::default(),
            single_flight_ttl: Duration::from_secs(10),
            revocation_watermark_ttl: refresh_ttl_long,
        })
    }

    /// Refresh lifetime for a session class
    pub fn refresh_ttl(&self, class: RefreshClass) -> Duration {
        match class {
            RefreshClass::Long => self.refresh_ttl_long,
            RefreshClass::Short => self.refresh_ttl_short,
        }
    }

    /// Root key for keyed hashing, built from the token secret
    pub fn hmac_key(&self) -> Result<HmacKey, ConfigError> {
        HmacKey::new(self.token_secret.as_bytes()).map_err(|e| ConfigError::Key(e.to_string()))
    }

    /// Set the token issuer
    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = issuer.into();
        self
    }

    /// Set access token lifetime
    pub fn with_access_ttl(mut self, ttl: Duration) -> Self {
        self.access_ttl = ttl;
        self
    }

    /// Set refresh lifetimes. The watermark lifetime follows the long one.
    pub fn with_refresh_ttls(mut self, long: Duration, short: Duration) -> Self {
        self.refresh_ttl_long = long;
        self.refresh_ttl_short = short;
        self.revocation_watermark_ttl = long;
        self
    }

    /// Set OTP limits
    pub fn with_otp_policy(mut self, policy: OtpPolicy) -> Self {
        self.otp = policy;
        self
    }

    /// Set single-flight lock lifetime
    pub fn with_single_flight_ttl(mut self, ttl: Duration) -> Self {
        self.single_flight_ttl = ttl;
        self
    }
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("issuer", &self.issuer)
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl_long", &self.refresh_ttl_long)
            .field("refresh_ttl_short", &self.refresh_ttl_short)
            .field("otp", &self.otp)
            .field("single_flight_ttl", &self.single_flight_ttl)
            .finish_non_exhaustive()
    }
}

/// Configuration errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("token secret too short: got {actual} bytes, need at least {minimum}")]
    SecretTooShort { actual: usize, minimum: usize },

    #[error("invalid hashing key: {0}")]
    Key(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_secret_rejected() {
        let result = AuthConfig::try_new("short");
        assert!(matches!(result, Err(ConfigError::SecretTooShort { actual: 5, .. })));
    }

    #[test]
    fn test_defaults() {
        let config = AuthConfig::try_new("k".repeat(32)).unwrap();
        assert_eq!(config.access_ttl, Duration::from_secs(900));
        assert_eq!(config.refresh_ttl(RefreshClass::Short), Duration::from_secs(86_400));
        assert_eq!(config.refresh_ttl(RefreshClass::Long), Duration::from_secs(2_592_000));
        assert_eq!(config.otp.max_attempts, 5);
    }

    #[test]
    fn test_debug_hides_secret() {
        let config = AuthConfig::try_new("s".repeat(40)).unwrap();
        let debug = format!("{config:?}");
        assert!(!debug.contains(&"s".repeat(40)));
    }

    #[test]
    fn test_refresh_ttls_move_watermark() {
        let config = AuthConfig::try_new("k".repeat(32))
            .unwrap()
            .with_refresh_ttls(Duration::from_secs(100), Duration::from_secs(10));
        assert_eq!(config.revocation_watermark_ttl, Duration::from_secs(100));
    }
}
