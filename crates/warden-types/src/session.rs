//! Session and token types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique session identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub Uuid);

impl SessionId {
    /// Create a new random session ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a session ID from a string
    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for SessionId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// Refresh lifetime class of a session. Chosen at login and kept for the
/// life of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefreshClass {
    /// "Remember me" sessions
    Long,
    /// Everything else
    Short,
}

impl RefreshClass {
    /// Class for the `remember` flag stored on a session record
    pub const fn from_remember(remember: bool) -> Self {
        if remember {
            Self::Long
        } else {
            Self::Short
        }
    }

    /// Whether this is the long-lived class
    pub const fn is_long(&self) -> bool {
        matches!(self, Self::Long)
    }
}

/// Token pair returned after login or rotation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPair {
    /// Access token (short-lived)
    pub access_token: String,
    /// Refresh token (rotating)
    pub refresh_token: String,
    /// Access token lifetime in seconds
    pub expires_in: u64,
    /// Refresh token lifetime in seconds
    pub refresh_expires_in: u64,
    /// Token type (always "Bearer")
    pub token_type: String,
}

impl TokenPair {
    /// Build a bearer token pair
    pub fn bearer(
        access_token: String,
        refresh_token: String,
        expires_in: u64,
        refresh_expires_in: u64,
    ) -> Self {
        Self {
            access_token,
            refresh_token,
            expires_in,
            refresh_expires_in,
            token_type: "Bearer".to_string(),
        }
    }
}

/// A device session as shown to its owner. Never carries credential hashes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionView {
    /// Session ID
    pub id: SessionId,
    /// Human label for the device (user agent or client-supplied name)
    pub device_label: Option<String>,
    /// Address the session was created from
    pub origin_address: Option<String>,
    /// Session creation time
    pub created_at: DateTime<Utc>,
    /// Current access token expiry
    pub access_expires_at: DateTime<Utc>,
    /// Current refresh token expiry
    pub refresh_expires_at: DateTime<Utc>,
    /// Whether this is a long-lived session
    pub remember: bool,
    /// Whether this is the session the caller is using right now
    pub is_current: bool,
}
