//! Axum extractors for authentication

use axum::extract::{FromRef, FromRequestParts};
use axum::http::header;
use axum::http::request::Parts;
use warden_auth_core::AuthError;
use warden_types::{Role, SessionId, UserId};

use crate::error::ApiError;
use crate::state::AppState;

/// Header carrying the client's device identifier
pub const DEVICE_ID_HEADER: &str = "x-device-id";

/// Authenticated caller extracted from request
#[derive(Clone)]
pub struct AuthUser {
    pub user_id: UserId,
    pub role: Role,
    pub session_id: SessionId,
    /// Raw device identifier, needed to address the caller's own session
    pub device_id: String,
}

impl std::fmt::Debug for AuthUser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthUser")
            .field("user_id", &self.user_id)
            .field("role", &self.role)
            .field("session_id", &self.session_id)
            .finish_non_exhaustive()
    }
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let app_state = AppState::from_ref(state);

        let bearer = bearer_token(parts)?;
        let device_id = device_id(parts)?;

        let principal = app_state
            .auth
            .authenticate(bearer.as_deref(), device_id.as_deref(), Role::User)
            .await
            .map_err(|e| {
                tracing::debug!(error = %e, "Request authentication failed");
                ApiError::from(e)
            })?;

        Ok(AuthUser {
            user_id: principal.user_id,
            role: principal.role,
            session_id: principal.session_id,
            // authenticate rejects a missing device id before this point
            device_id: device_id.unwrap_or_default(),
        })
    }
}

/// Bearer token from the Authorization header
fn bearer_token(parts: &Parts) -> Result<Option<String>, ApiError> {
    let Some(value) = parts.headers.get(header::AUTHORIZATION) else {
        return Ok(None);
    };
    let value = value
        .to_str()
        .map_err(|_| ApiError::BadRequest("Invalid Authorization header encoding".into()))?;
    Ok(value
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string))
}

/// Device identifier from its header, if present and non-blank
pub fn device_id(parts: &Parts) -> Result<Option<String>, ApiError> {
    let Some(value) = parts.headers.get(DEVICE_ID_HEADER) else {
        return Ok(None);
    };
    let value = value
        .to_str()
        .map_err(|_| ApiError::BadRequest("Invalid device header encoding".into()))?;
    let value = value.trim();
    Ok((!value.is_empty()).then(|| value.to_string()))
}

/// Device identifier required by unauthenticated session endpoints
#[derive(Clone)]
pub struct DeviceId(pub String);

#[axum::async_trait]
impl<S> FromRequestParts<S> for DeviceId
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        device_id(parts)?
            .map(DeviceId)
            .ok_or(ApiError::Auth(AuthError::DeviceIdMissing))
    }
}
