//! Common error types

use thiserror::Error;

/// Errors parsing shared types from strings
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TypeParseError {
    /// Unknown OTP purpose
    #[error("invalid OTP purpose: {0}")]
    OtpPurpose(String),
}
