//! Token issuer: signed access and refresh tokens
//!
//! Access tokens bind a principal to one device session and carry a
//! denormalised role label. Refresh tokens carry only the principal; the
//! session record decides whether one is still live.

use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;
use warden_types::{Role, SessionId, UserId};

const ACCESS_TYPE: &str = "access";
const REFRESH_TYPE: &str = "refresh";

/// Token issuer errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    /// Key misconfiguration. Fatal, never retried.
    #[error("signing failed: {0}")]
    Signing(String),

    /// Well-formed and authentic, but past `exp`
    #[error("token expired")]
    Expired,

    /// Bad signature, issuer, type or shape. Treated as tampering.
    #[error("invalid signature")]
    InvalidSignature,
}

/// What an access token grants
#[derive(Debug, Clone)]
pub struct AccessGrant {
    pub principal: UserId,
    pub role: Role,
    pub device_id_hash: String,
    pub session_id: SessionId,
}

/// A freshly signed token
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Access token claims
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Principal ID
    pub sub: String,
    /// Role label at issue time
    pub role: String,
    /// Hash of the device the session is bound to
    pub dev: String,
    /// Session record ID
    pub sid: String,
    pub typ: String,
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
}

impl AccessClaims {
    /// Principal the token was issued to
    pub fn principal(&self) -> Result<UserId, TokenError> {
        UserId::parse(&self.sub).map_err(|_| TokenError::InvalidSignature)
    }

    /// Session the token was issued for
    pub fn session_id(&self) -> Result<SessionId, TokenError> {
        SessionId::parse(&self.sid).map_err(|_| TokenError::InvalidSignature)
    }

    /// Role through the rank table; unknown labels are lowest
    pub fn role(&self) -> Role {
        Role::from_label(&self.role)
    }
}

/// Refresh token claims
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshClaims {
    pub sub: String,
    pub typ: String,
    pub iss: String,
    pub iat: i64,
    /// Issue instant in microseconds, for ordering against revocations
    #[serde(default)]
    pub iat_us: i64,
    pub exp: i64,
    pub jti: String,
}

impl RefreshClaims {
    /// Principal the token was issued to
    pub fn principal(&self) -> Result<UserId, TokenError> {
        UserId::parse(&self.sub).map_err(|_| TokenError::InvalidSignature)
    }

    /// Issue instant in microseconds, falling back to `iat`
    pub fn issued_at_micros(&self) -> i64 {
        if self.iat_us > 0 {
            self.iat_us
        } else {
            self.iat.saturating_mul(1_000_000)
        }
    }
}

/// HS256 token issuer
#[derive(Clone)]
pub struct TokenIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
    validation: Validation,
}

impl TokenIssuer {
    /// Create an issuer. The secret length is validated by `AuthConfig`.
    pub fn new(secret: &[u8], issuer: impl Into<String>) -> Self {
        let issuer = issuer.into();

        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_issuer(&[issuer.as_str()]);
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);
        validation.validate_aud = false;

        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            issuer,
            validation,
        }
    }

    /// Issue an access token for a device session
    pub fn issue_access_token(
        &self,
        grant: &AccessGrant,
        ttl: Duration,
    ) -> Result<IssuedToken, TokenError> {
        let (iat, exp, expires_at) = lifetime(ttl)?;
        let claims = AccessClaims {
            sub: grant.principal.to_string(),
            role: grant.role.as_str().to_string(),
            dev: grant.device_id_hash.clone(),
            sid: grant.session_id.to_string(),
            typ: ACCESS_TYPE.to_string(),
            iss: self.issuer.clone(),
            iat,
            exp,
            jti: Uuid::new_v4().to_string(),
        };
        Ok(IssuedToken {
            token: self.sign(&claims)?,
            expires_at,
        })
    }

    /// Issue a refresh token carrying only the principal
    pub fn issue_refresh_token(
        &self,
        principal: UserId,
        ttl: Duration,
    ) -> Result<IssuedToken, TokenError> {
        let now = Utc::now();
        let (iat, exp, expires_at) = lifetime_from(now, ttl)?;
        let claims = RefreshClaims {
            sub: principal.to_string(),
            typ: REFRESH_TYPE.to_string(),
            iss: self.issuer.clone(),
            iat,
            iat_us: now.timestamp_micros(),
            exp,
            jti: Uuid::new_v4().to_string(),
        };
        Ok(IssuedToken {
            token: self.sign(&claims)?,
            expires_at,
        })
    }

    /// Verify an access token
    pub fn verify_access(&self, token: &str) -> Result<AccessClaims, TokenError> {
        let claims: AccessClaims = self.verify(token)?;
        if claims.typ != ACCESS_TYPE {
            tracing::debug!("Token type mismatch: expected access, got {}", claims.typ);
            return Err(TokenError::InvalidSignature);
        }
        Ok(claims)
    }

    /// Verify a refresh token
    pub fn verify_refresh(&self, token: &str) -> Result<RefreshClaims, TokenError> {
        let claims: RefreshClaims = self.verify(token)?;
        if claims.typ != REFRESH_TYPE {
            tracing::debug!("Token type mismatch: expected refresh, got {}", claims.typ);
            return Err(TokenError::InvalidSignature);
        }
        Ok(claims)
    }

    fn verify<C: DeserializeOwned>(&self, token: &str) -> Result<C, TokenError> {
        decode::<C>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::debug!("Token validation failed: {}", e);
                match e.kind() {
                    jsonwebtoken::errors::ErrorKind::ExpiredSignature => TokenError::Expired,
                    _ => TokenError::InvalidSignature,
                }
            })
    }

    fn sign<C: Serialize>(&self, claims: &C) -> Result<String, TokenError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key).map_err(|e| {
            tracing::error!("Failed to sign token: {}", e);
            TokenError::Signing(e.to_string())
        })
    }
}

impl std::fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenIssuer")
            .field("issuer", &self.issuer)
            .finish_non_exhaustive()
    }
}

fn lifetime(ttl: Duration) -> Result<(i64, i64, DateTime<Utc>), TokenError> {
    lifetime_from(Utc::now(), ttl)
}

fn lifetime_from(
    now: DateTime<Utc>,
    ttl: Duration,
) -> Result<(i64, i64, DateTime<Utc>), TokenError> {
    let iat = now.timestamp();
    let ttl_secs = i64::try_from(ttl.as_secs())
        .map_err(|_| TokenError::Signing("token lifetime out of range".to_string()))?;
    let exp = iat.saturating_add(ttl_secs);
    let expires_at = Utc
        .timestamp_opt(exp, 0)
        .single()
        .ok_or_else(|| TokenError::Signing("token lifetime out of range".to_string()))?;
    Ok((iat, exp, expires_at))
}
