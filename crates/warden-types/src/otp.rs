//! OTP challenge purposes

use serde::{Deserialize, Serialize};

use crate::error::TypeParseError;

/// What an OTP challenge is protecting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OtpPurpose {
    /// Email ownership check before an account is created
    Registration,
    /// Email ownership check before a password is replaced
    PasswordReset,
    /// Step-up check for an already signed-in principal
    Login,
}

impl OtpPurpose {
    /// Stable key segment for this purpose
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Registration => "registration",
            Self::PasswordReset => "password_reset",
            Self::Login => "login",
        }
    }

    /// Whether a successful verification leaves a `verified` marker behind
    /// for a follow-up action to consume.
    pub const fn gates_follow_up(&self) -> bool {
        matches!(self, Self::Registration | Self::PasswordReset)
    }
}

impl std::fmt::Display for OtpPurpose {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OtpPurpose {
    type Err = TypeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "registration" => Ok(Self::Registration),
            "password_reset" => Ok(Self::PasswordReset),
            "login" => Ok(Self::Login),
            other => Err(TypeParseError::OtpPurpose(other.to_string())),
        }
    }
}
