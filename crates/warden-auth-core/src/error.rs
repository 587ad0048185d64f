//! Auth errors

use thiserror::Error;
use warden_types::Role;

use crate::token::TokenError;

/// Broad error category, deciding how a caller should react
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing or malformed input. Reported as-is, never retried.
    Input,
    /// Caller must re-authenticate
    Authentication,
    /// Caller lacks the rights for this request
    Authorization,
    /// Replay or duplicate in-flight request
    Conflict,
    /// A rate ceiling was hit; wait for `retry_after_secs`
    RateLimited,
    /// A backing store or collaborator failed; safe to retry
    Dependency,
}

/// Authentication errors
#[derive(Error, Debug)]
pub enum AuthError {
    /// Required field absent
    #[error("missing field: {0}")]
    MissingField(&'static str),

    /// Field present but malformed
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// No bearer token on the request
    #[error("no token provided")]
    NoToken,

    /// Token has expired
    #[error("token expired")]
    TokenExpired,

    /// Token signature, issuer or type did not check out
    #[error("invalid token signature")]
    InvalidSignature,

    /// No device identifier on the request
    #[error("device identifier missing")]
    DeviceIdMissing,

    /// No live session backs the presented credential
    #[error("session not found")]
    SessionNotFound,

    /// Token was issued to a different device
    #[error("device mismatch")]
    DeviceMismatch,

    /// Primary credentials did not resolve to a principal
    #[error("invalid credentials")]
    InvalidCredentials,

    /// Role rank below what the operation needs
    #[error("insufficient role: requires {required}, has {actual}")]
    InsufficientRole { required: Role, actual: Role },

    /// Revoking the caller's own session through the revoke-by-id path
    #[error("cannot revoke the current session")]
    CannotRevokeCurrentSession,

    /// Gated action attempted without a fresh OTP verification
    #[error("verification required")]
    VerificationRequired,

    /// A refresh credential was replayed; all sessions were revoked
    #[error("reused credential detected")]
    ReusedCredentialDetected,

    /// Another request from the same actor is still running
    #[error("concurrent request in flight")]
    ConcurrentRequestInFlight,

    /// Email already belongs to a principal
    #[error("email already registered")]
    EmailTaken,

    /// Request-rate ceiling reached
    #[error("rate limit exceeded, retry after {retry_after_secs}s")]
    RateLimitExceeded { retry_after_secs: u64 },

    /// OTP resend attempted during cooldown
    #[error("code recently sent, retry after {retry_after_secs}s")]
    OtpOnCooldown { retry_after_secs: u64 },

    /// Hourly OTP budget used up
    #[error("too many codes requested, retry after {retry_after_secs}s")]
    OtpRateExceeded { retry_after_secs: u64 },

    /// No active challenge
    #[error("no active verification code")]
    OtpNotFound,

    /// Wrong code
    #[error("incorrect code, {attempts_remaining} attempts remaining")]
    OtpCodeMismatch { attempts_remaining: u32 },

    /// Challenge burned through its attempt budget
    #[error("too many incorrect attempts")]
    OtpAttemptsExhausted,

    /// Backing store failed
    #[error("store unavailable: {0}")]
    Store(String),

    /// Delivery collaborator failed; the challenge is kept
    #[error("code delivery failed: {0}")]
    DeliveryFailed(String),

    /// Signing key misconfigured
    #[error("token signing failed: {0}")]
    Signing(String),

    /// Internal error
    #[error("internal error: {0}")]
    Internal(String),
}

impl AuthError {
    /// Get HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            Self::MissingField(_) | Self::InvalidInput(_) => 400,
            Self::NoToken
            | Self::TokenExpired
            | Self::InvalidSignature
            | Self::DeviceIdMissing
            | Self::SessionNotFound
            | Self::DeviceMismatch
            | Self::InvalidCredentials
            | Self::ReusedCredentialDetected
            | Self::OtpCodeMismatch { .. } => 401,
            Self::InsufficientRole { .. }
            | Self::CannotRevokeCurrentSession
            | Self::VerificationRequired
            | Self::OtpAttemptsExhausted => 403,
            Self::OtpNotFound => 404,
            Self::ConcurrentRequestInFlight | Self::EmailTaken => 409,
            Self::RateLimitExceeded { .. }
            | Self::OtpOnCooldown { .. }
            | Self::OtpRateExceeded { .. } => 429,
            Self::DeliveryFailed(_) => 502,
            Self::Store(_) => 503,
            Self::Signing(_) | Self::Internal(_) => 500,
        }
    }

    /// Get error code for API responses
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::MissingField(_) => "MISSING_FIELD",
            Self::InvalidInput(_) => "INVALID_INPUT",
            Self::NoToken => "NO_TOKEN",
            Self::TokenExpired => "TOKEN_EXPIRED",
            Self::InvalidSignature => "INVALID_SIGNATURE",
            Self::DeviceIdMissing => "DEVICE_ID_MISSING",
            Self::SessionNotFound => "SESSION_NOT_FOUND",
            Self::DeviceMismatch => "DEVICE_MISMATCH",
            Self::InvalidCredentials => "INVALID_CREDENTIALS",
            Self::InsufficientRole { .. } => "INSUFFICIENT_ROLE",
            Self::CannotRevokeCurrentSession => "CANNOT_REVOKE_CURRENT_SESSION",
            Self::VerificationRequired => "VERIFICATION_REQUIRED",
            Self::ReusedCredentialDetected => "REUSED_CREDENTIAL_DETECTED",
            Self::ConcurrentRequestInFlight => "CONCURRENT_REQUEST_IN_FLIGHT",
            Self::EmailTaken => "EMAIL_TAKEN",
            Self::RateLimitExceeded { .. } => "RATE_LIMIT_EXCEEDED",
            Self::OtpOnCooldown { .. } => "OTP_ON_COOLDOWN",
            Self::OtpRateExceeded { .. } => "OTP_RATE_EXCEEDED",
            Self::OtpNotFound => "OTP_NOT_FOUND",
            Self::OtpCodeMismatch { .. } => "OTP_CODE_MISMATCH",
            Self::OtpAttemptsExhausted => "OTP_ATTEMPTS_EXHAUSTED",
            Self::Store(_) => "STORE_UNAVAILABLE",
            Self::DeliveryFailed(_) => "DELIVERY_FAILED",
            Self::Signing(_) => "SIGNING_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Category of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingField(_) | Self::InvalidInput(_) => ErrorKind::Input,
            Self::NoToken
            | Self::TokenExpired
            | Self::InvalidSignature
            | Self::DeviceIdMissing
            | Self::SessionNotFound
            | Self::DeviceMismatch
            | Self::InvalidCredentials
            | Self::OtpNotFound
            | Self::OtpCodeMismatch { .. }
            | Self::OtpAttemptsExhausted => ErrorKind::Authentication,
            Self::InsufficientRole { .. }
            | Self::CannotRevokeCurrentSession
            | Self::VerificationRequired => ErrorKind::Authorization,
            Self::ReusedCredentialDetected
            | Self::ConcurrentRequestInFlight
            | Self::EmailTaken => ErrorKind::Conflict,
            Self::RateLimitExceeded { .. }
            | Self::OtpOnCooldown { .. }
            | Self::OtpRateExceeded { .. } => ErrorKind::RateLimited,
            Self::Store(_) | Self::DeliveryFailed(_) | Self::Signing(_) | Self::Internal(_) => {
                ErrorKind::Dependency
            }
        }
    }

    /// Seconds the caller should wait, for rate errors
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            Self::RateLimitExceeded { retry_after_secs }
            | Self::OtpOnCooldown { retry_after_secs }
            | Self::OtpRateExceeded { retry_after_secs } => Some(*retry_after_secs),
            _ => None,
        }
    }

    /// Whether the client must drop its stored session identifiers
    pub fn clears_client_session(&self) -> bool {
        matches!(self, Self::ReusedCredentialDetected)
    }
}

impl From<warden_db::DbError> for AuthError {
    fn from(err: warden_db::DbError) -> Self {
        tracing::error!("Store error: {}", err);
        Self::Store(err.to_string())
    }
}

impl From<TokenError> for AuthError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Expired => Self::TokenExpired,
            TokenError::InvalidSignature => Self::InvalidSignature,
            TokenError::Signing(msg) => {
                tracing::error!("Token signing failed: {}", msg);
                Self::Signing(msg)
            }
        }
    }
}
