//! OTP challenge manager
//!
//! One challenge per identifier and purpose, held in the ephemeral store
//! under `otp:{purpose}:{identifier}:{field}`:
//!
//! - `code` stores the hash of the current 6-digit code
//! - `attempts` counts the wrong guesses still allowed
//! - `cooldown` blocks an immediate resend
//! - `verified` is the short-lived, single-use gate for a follow-up action
//!
//! The attempt counter is only ever changed through the store's atomic
//! decrement-if-positive, so two parallel wrong guesses cannot both slip
//! past the last attempt.

use std::sync::Arc;
use std::time::Duration;

use rand::rngs::OsRng;
use rand::Rng;
use warden_db::EphemeralStore;
use warden_types::OtpPurpose;

use crate::config::OtpPolicy;
use crate::crypto::{constant_time_str_eq, hash_token, HmacKey};
use crate::rate_limit::{rate_key, retry_after_secs};
use crate::AuthError;

/// Digits in a code
pub const CODE_LENGTH: usize = 6;

const HOURLY_WINDOW: Duration = Duration::from_secs(60 * 60);

/// A freshly created code, ready for out-of-band delivery
#[derive(Clone)]
pub struct IssuedOtp {
    /// Plaintext code. Never log this.
    pub code: String,
    /// How long the code stays valid
    pub expires_in: Duration,
}

impl std::fmt::Debug for IssuedOtp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IssuedOtp")
            .field("expires_in", &self.expires_in)
            .finish_non_exhaustive()
    }
}

struct ChallengeKeys {
    code: String,
    attempts: String,
    cooldown: String,
    verified: String,
}

impl ChallengeKeys {
    fn new(purpose: OtpPurpose, identifier: &str) -> Self {
        let prefix = format!("otp:{}:{}", purpose.as_str(), identifier);
        Self {
            code: format!("{prefix}:code"),
            attempts: format!("{prefix}:attempts"),
            cooldown: format!("{prefix}:cooldown"),
            verified: format!("{prefix}:verified"),
        }
    }
}

/// Creates and verifies OTP challenges
pub struct OtpManager<E> {
    store: Arc<E>,
    policy: OtpPolicy,
    identity_key: HmacKey,
}

impl<E: EphemeralStore> OtpManager<E> {
    /// `identity_key` hashes identifiers into the hourly counter key
    pub fn new(store: Arc<E>, policy: OtpPolicy, identity_key: HmacKey) -> Self {
        Self {
            store,
            policy,
            identity_key,
        }
    }

    pub fn policy(&self) -> &OtpPolicy {
        &self.policy
    }

    /// Start a new challenge, replacing any earlier code for the same
    /// identifier and purpose.
    pub async fn create(
        &self,
        identifier: &str,
        purpose: OtpPurpose,
    ) -> Result<IssuedOtp, AuthError> {
        let identifier = normalize_identifier(identifier)?;
        let keys = ChallengeKeys::new(purpose, &identifier);

        // Setting the cooldown marker is the atomic gate against parallel sends.
        if !self
            .store
            .set_if_absent(&keys.cooldown, "1", self.policy.resend_cooldown)
            .await?
        {
            let remaining = self
                .store
                .ttl(&keys.cooldown)
                .await?
                .unwrap_or(self.policy.resend_cooldown);
            tracing::debug!(purpose = purpose.as_str(), "OTP resend on cooldown");
            return Err(AuthError::OtpOnCooldown {
                retry_after_secs: retry_after_secs(remaining),
            });
        }

        let counter = rate_key(
            &self.identity_key,
            &format!("otp_{}", purpose.as_str()),
            &identifier,
        );
        let window = self.store.incr_window(&counter, HOURLY_WINDOW).await?;
        if window.count > self.policy.hourly_budget {
            self.store.delete(&[keys.cooldown.as_str()]).await?;
            tracing::warn!(
                purpose = purpose.as_str(),
                count = window.count,
                "OTP hourly budget exceeded"
            );
            return Err(AuthError::OtpRateExceeded {
                retry_after_secs: retry_after_secs(window.resets_in),
            });
        }

        let code = generate_code();
        let code_hash = hash_code(purpose, &identifier, &code);
        let ttl = self.policy.code_ttl;

        self.store.set(&keys.code, &code_hash, ttl).await?;
        self.store
            .set(&keys.attempts, &self.policy.max_attempts.to_string(), ttl)
            .await?;
        self.store.delete(&[keys.verified.as_str()]).await?;

        tracing::info!(purpose = purpose.as_str(), "OTP challenge created");
        Ok(IssuedOtp {
            code,
            expires_in: ttl,
        })
    }

    /// Check a candidate code against the active challenge.
    ///
    /// A wrong guess spends one attempt; the guess that spends the last one
    /// deletes the challenge. A correct guess consumes the challenge and, for
    /// purposes that gate a follow-up step, sets the `verified` marker.
    pub async fn verify(
        &self,
        identifier: &str,
        purpose: OtpPurpose,
        candidate: &str,
    ) -> Result<(), AuthError> {
        let identifier = normalize_identifier(identifier)?;
        let candidate = candidate.trim();
        if candidate.len() != CODE_LENGTH || !candidate.bytes().all(|b| b.is_ascii_digit()) {
            return Err(AuthError::InvalidInput(format!(
                "code must be {CODE_LENGTH} digits"
            )));
        }

        let keys = ChallengeKeys::new(purpose, &identifier);
        let stored = self
            .store
            .get(&keys.code)
            .await?
            .ok_or(AuthError::OtpNotFound)?;

        let attempts = self.store.get(&keys.attempts).await?;
        if !matches!(attempts.as_deref().map(str::parse::<i64>), Some(Ok(n)) if n > 0) {
            self.discard(&keys).await?;
            return Err(AuthError::OtpAttemptsExhausted);
        }

        let candidate_hash = hash_code(purpose, &identifier, candidate);
        if !constant_time_str_eq(&candidate_hash, &stored) {
            return match self.store.decrement_if_positive(&keys.attempts).await? {
                Some(left) if left > 0 => {
                    tracing::debug!(purpose = purpose.as_str(), left, "OTP code mismatch");
                    Err(AuthError::OtpCodeMismatch {
                        attempts_remaining: u32::try_from(left).unwrap_or(u32::MAX),
                    })
                }
                _ => {
                    self.discard(&keys).await?;
                    tracing::warn!(purpose = purpose.as_str(), "OTP attempts exhausted");
                    Err(AuthError::OtpAttemptsExhausted)
                }
            };
        }

        // Whoever deletes the code first owns the success.
        if self.store.delete(&[keys.code.as_str()]).await? == 0 {
            return Err(AuthError::OtpNotFound);
        }
        self.store
            .delete(&[keys.attempts.as_str(), keys.cooldown.as_str()])
            .await?;

        if purpose.gates_follow_up() {
            self.store
                .set(&keys.verified, "1", self.policy.verified_ttl)
                .await?;
        }

        tracing::info!(purpose = purpose.as_str(), "OTP challenge verified");
        Ok(())
    }

    /// Whether a fresh verification gates a follow-up action
    pub async fn is_verified(
        &self,
        identifier: &str,
        purpose: OtpPurpose,
    ) -> Result<bool, AuthError> {
        let identifier = normalize_identifier(identifier)?;
        let keys = ChallengeKeys::new(purpose, &identifier);
        Ok(self.store.get(&keys.verified).await?.is_some())
    }

    /// Spend the verification gate
    pub async fn clear_verified(
        &self,
        identifier: &str,
        purpose: OtpPurpose,
    ) -> Result<(), AuthError> {
        let identifier = normalize_identifier(identifier)?;
        let keys = ChallengeKeys::new(purpose, &identifier);
        self.store.delete(&[keys.verified.as_str()]).await?;
        Ok(())
    }

    async fn discard(&self, keys: &ChallengeKeys) -> Result<(), AuthError> {
        self.store
            .delete(&[keys.code.as_str(), keys.attempts.as_str()])
            .await?;
        Ok(())
    }
}

impl<E> Clone for OtpManager<E> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            policy: self.policy.clone(),
            identity_key: self.identity_key.clone(),
        }
    }
}

/// Trim and lowercase an identifier, rejecting empty ones
pub fn normalize_identifier(identifier: &str) -> Result<String, AuthError> {
    let normalized = identifier.trim().to_lowercase();
    if normalized.is_empty() {
        return Err(AuthError::MissingField("identifier"));
    }
    Ok(normalized)
}

/// Uniform, zero-padded 6-digit code
pub fn generate_code() -> String {
    format!("{:06}", OsRng.gen_range(0..1_000_000u32))
}

fn hash_code(purpose: OtpPurpose, identifier: &str, code: &str) -> String {
    hash_token(&format!("{}:{}:{}", purpose.as_str(), identifier, code))
}
