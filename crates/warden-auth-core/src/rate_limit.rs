//! Fixed-window rate limiting
//!
//! Counters live in the ephemeral store under `ratelimit:{purpose}:{hash}`.
//! The identity is hashed with a keyed digest so addresses and device
//! identifiers never appear in key names.

use std::sync::Arc;
use std::time::Duration;

use warden_db::EphemeralStore;
use warden_types::UserId;

use crate::crypto::HmacKey;
use crate::AuthError;

/// Which parts of a request identify the caller for one rule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityMode {
    /// Client network address
    Address,
    /// Client device identifier
    Device,
    /// Authenticated principal
    Principal,
    /// Device identifier and address together
    DeviceAndAddress,
    /// Account identifier such as an email, independent of source address
    Identifier,
}

/// A ceiling over a fixed window for one protected operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitRule {
    pub purpose: String,
    pub mode: IdentityMode,
    pub ceiling: u64,
    pub window: Duration,
}

impl RateLimitRule {
    pub fn new(purpose: impl Into<String>, mode: IdentityMode, ceiling: u64, window: Duration) -> Self {
        Self {
            purpose: purpose.into(),
            mode,
            ceiling,
            window,
        }
    }

    /// Login attempts, keyed on the account to stop credential stuffing
    /// from rotating addresses
    pub fn login() -> Self {
        Self::new("login", IdentityMode::Identifier, 10, Duration::from_secs(15 * 60))
    }

    /// Refresh token rotation
    pub fn refresh() -> Self {
        Self::new("refresh", IdentityMode::DeviceAndAddress, 30, Duration::from_secs(60))
    }

    /// OTP send requests per source address
    pub fn otp_send() -> Self {
        Self::new("otp_send", IdentityMode::Address, 20, Duration::from_secs(60 * 60))
    }

    /// Session listing and revocation
    pub fn session_management() -> Self {
        Self::new("sessions", IdentityMode::Principal, 60, Duration::from_secs(60))
    }
}

/// Identity facts available on a request
#[derive(Debug, Clone, Default)]
pub struct RequestIdentity {
    pub address: Option<String>,
    pub device_id: Option<String>,
    pub principal: Option<UserId>,
    pub identifier: Option<String>,
}

impl RequestIdentity {
    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    pub fn with_device_id(mut self, device_id: impl Into<String>) -> Self {
        self.device_id = Some(device_id.into());
        self
    }

    pub fn with_principal(mut self, principal: UserId) -> Self {
        self.principal = Some(principal);
        self
    }

    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = Some(identifier.into());
        self
    }

    /// Material to hash for `mode`
    fn material(&self, mode: IdentityMode) -> Result<String, AuthError> {
        let address = || self.address.as_deref().ok_or(AuthError::MissingField("address"));
        let device = || self.device_id.as_deref().ok_or(AuthError::MissingField("device_id"));
        match mode {
            IdentityMode::Address => Ok(format!("ip:{}", address()?)),
            IdentityMode::Device => Ok(format!("dev:{}", device()?)),
            IdentityMode::Principal => self
                .principal
                .map(|p| format!("user:{p}"))
                .ok_or(AuthError::MissingField("principal")),
            IdentityMode::DeviceAndAddress => Ok(format!("dev:{}|ip:{}", device()?, address()?)),
            IdentityMode::Identifier => self
                .identifier
                .as_deref()
                .map(|i| format!("id:{}", i.trim().to_lowercase()))
                .ok_or(AuthError::MissingField("identifier")),
        }
    }
}

/// Outcome of an allowed request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    /// Requests counted in this window, including this one
    pub count: u64,
    /// Requests left before the ceiling
    pub remaining: u64,
    /// Time until the window resets
    pub resets_in: Duration,
}

/// Fixed-window rate limiter over an ephemeral store
pub struct RateLimiter<E> {
    store: Arc<E>,
    key: HmacKey,
}

impl<E: EphemeralStore> RateLimiter<E> {
    /// `key` should be dedicated to identity hashing
    pub fn new(store: Arc<E>, key: HmacKey) -> Self {
        Self { store, key }
    }

    /// Count one request against `rule` and fail once the ceiling is passed
    pub async fn check(
        &self,
        rule: &RateLimitRule,
        identity: &RequestIdentity,
    ) -> Result<RateDecision, AuthError> {
        let material = identity.material(rule.mode)?;
        let key = rate_key(&self.key, &rule.purpose, &material);
        let window = self.store.incr_window(&key, rule.window).await?;

        if window.count > rule.ceiling {
            tracing::warn!(
                purpose = %rule.purpose,
                count = window.count,
                ceiling = rule.ceiling,
                "Rate limit exceeded"
            );
            return Err(AuthError::RateLimitExceeded {
                retry_after_secs: retry_after_secs(window.resets_in),
            });
        }

        Ok(RateDecision {
            count: window.count,
            remaining: rule.ceiling - window.count,
            resets_in: window.resets_in,
        })
    }
}

impl<E> Clone for RateLimiter<E> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            key: self.key.clone(),
        }
    }
}

/// Counter key for a purpose and identity material
pub(crate) fn rate_key(key: &HmacKey, purpose: &str, material: &str) -> String {
    format!("ratelimit:{purpose}:{}", key.digest_hex(material))
}

/// Whole seconds to wait, rounded up and never zero
pub(crate) fn retry_after_secs(remaining: Duration) -> u64 {
    let secs = remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0);
    secs.max(1)
}
