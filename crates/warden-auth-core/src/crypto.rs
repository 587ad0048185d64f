//! Cryptographic utilities for secure operations
//!
//! This module provides security-critical primitives that must be implemented
//! correctly to prevent timing attacks and other side-channel vulnerabilities.
//! Every comparison of a secret-derived value goes through
//! [`constant_time_eq`].

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use hmac::{Hmac, Mac};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Random bytes in a refresh-credential salt
const SALT_LENGTH: usize = 16;

/// Random bytes in a generated device identifier
const DEVICE_ID_LENGTH: usize = 32;

/// Pre-keyed HMAC-SHA256 instance for repeated signing operations.
///
/// Keying an HMAC instance has overhead, so the keyed state is built once
/// and cloned per signature.
#[derive(Clone)]
pub struct HmacKey {
    mac: Hmac<Sha256>,
    key_length: usize,
}

impl HmacKey {
    /// Minimum allowed key length in bytes (256 bits)
    pub const MIN_KEY_LENGTH: usize = 32;

    /// Create a new HMAC key from bytes.
    ///
    /// # Errors
    /// Returns error if key is too short (less than 32 bytes).
    pub fn new(key: impl AsRef<[u8]>) -> Result<Self, HmacKeyError> {
        let key_bytes = key.as_ref();
        if key_bytes.len() < Self::MIN_KEY_LENGTH {
            return Err(HmacKeyError::KeyTooShort {
                actual: key_bytes.len(),
                minimum: Self::MIN_KEY_LENGTH,
            });
        }
        let mac = Hmac::<Sha256>::new_from_slice(key_bytes)
            .map_err(|_| HmacKeyError::InvalidKey)?;
        Ok(Self {
            mac,
            key_length: key_bytes.len(),
        })
    }

    /// Derive an independent subkey for one purpose
    pub fn derive(&self, label: &str) -> Self {
        let subkey = self.sign(label.as_bytes());
        Self {
            // 32-byte HMAC output is always a valid key
            mac: <Hmac<Sha256> as Mac>::new_from_slice(&subkey)
                .unwrap_or_else(|_| self.mac.clone()),
            key_length: subkey.len(),
        }
    }

    /// Sign data and return the MAC bytes
    pub fn sign(&self, data: &[u8]) -> [u8; 32] {
        let mut mac = self.mac.clone();
        mac.update(data);
        mac.finalize().into_bytes().into()
    }

    /// Keyed one-way digest of `data`, hex encoded
    pub fn digest_hex(&self, data: &str) -> String {
        hex::encode(self.sign(data.as_bytes()))
    }
}

impl std::fmt::Debug for HmacKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HmacKey")
            .field("key_length", &self.key_length)
            .finish_non_exhaustive()
    }
}

/// Errors that can occur when creating an HMAC key
#[derive(Debug, Clone, thiserror::Error)]
pub enum HmacKeyError {
    #[error("HMAC key too short: got {actual} bytes, need at least {minimum}")]
    KeyTooShort { actual: usize, minimum: usize },

    #[error("HMAC key rejected")]
    InvalidKey,
}

/// Constant-time byte slice comparison.
///
/// Returns `false` immediately if lengths differ (length is not secret);
/// otherwise the comparison time does not depend on where the slices differ.
#[inline]
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.ct_eq(b).into()
}

/// Constant-time string comparison.
#[inline]
pub fn constant_time_str_eq(a: &str, b: &str) -> bool {
    constant_time_eq(a.as_bytes(), b.as_bytes())
}

/// Unsalted SHA-256 of a value, hex encoded.
///
/// Only for short-lived values compared by exact equality (OTP codes).
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

fn salted_digest(salt: &[u8], token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Salted hash of a refresh credential for storage, as `salt$digest`.
pub fn hash_refresh_credential(token: &str) -> String {
    let mut salt = [0u8; SALT_LENGTH];
    OsRng.fill_bytes(&mut salt);
    format!("{}${}", hex::encode(salt), salted_digest(&salt, token))
}

/// Check a presented refresh credential against its stored salted hash.
///
/// Malformed stored values never match.
pub fn verify_refresh_credential(token: &str, stored: &str) -> bool {
    let Some((salt_hex, digest)) = stored.split_once('$') else {
        return false;
    };
    let Ok(salt) = hex::decode(salt_hex) else {
        return false;
    };
    constant_time_str_eq(&salted_digest(&salt, token), digest)
}

/// Generate a random device identifier for clients that did not send one
pub fn generate_device_id() -> String {
    let mut bytes = [0u8; DEVICE_ID_LENGTH];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
