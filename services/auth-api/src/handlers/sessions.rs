//! Session management handlers

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use warden_auth_core::{RateLimitRule, RequestIdentity};
use warden_types::{SessionId, SessionView, TokenPair};

use crate::error::ApiResult;
use crate::extractors::{AuthUser, DeviceId};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Serialize)]
pub struct SessionListResponse {
    pub sessions: Vec<SessionView>,
}

#[derive(Debug, Serialize)]
pub struct LogoutAllResponse {
    pub revoked: u64,
}

/// POST /api/v1/auth/refresh - Rotate a refresh token
pub async fn refresh(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    DeviceId(device_id): DeviceId,
    Json(req): Json<RefreshRequest>,
) -> ApiResult<Json<TokenPair>> {
    let identity = RequestIdentity::default()
        .with_address(addr.ip().to_string())
        .with_device_id(device_id.as_str());
    state
        .auth
        .rate_limiter()
        .check(&RateLimitRule::refresh(), &identity)
        .await?;

    let tokens = state.auth.rotate(&req.refresh_token, &device_id).await?;
    Ok(Json(tokens))
}

/// GET /api/v1/sessions - List the caller's live sessions
pub async fn list_sessions(
    State(state): State<AppState>,
    user: AuthUser,
) -> ApiResult<Json<SessionListResponse>> {
    check_management_rate(&state, &user).await?;
    let sessions = state
        .auth
        .list_sessions(user.user_id, Some(&user.device_id))
        .await?;
    Ok(Json(SessionListResponse { sessions }))
}

/// POST /api/v1/sessions/logout - End the caller's current session
pub async fn logout(State(state): State<AppState>, user: AuthUser) -> ApiResult<StatusCode> {
    state.auth.logout(user.user_id, &user.device_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/sessions/logout-all - End every session of the caller
pub async fn logout_all(
    State(state): State<AppState>,
    user: AuthUser,
) -> ApiResult<Json<LogoutAllResponse>> {
    let revoked = state.auth.logout_all(user.user_id).await?;
    Ok(Json(LogoutAllResponse { revoked }))
}

/// DELETE /api/v1/sessions/:id - Revoke another of the caller's sessions
pub async fn revoke_session(
    State(state): State<AppState>,
    user: AuthUser,
    Path(session_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    check_management_rate(&state, &user).await?;

    let actor = format!("revoke:{}", user.user_id);
    state
        .auth
        .single_flight()
        .run(
            &actor,
            state
                .auth
                .revoke_session(user.user_id, &user.device_id, SessionId::from(session_id)),
        )
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn check_management_rate(state: &AppState, user: &AuthUser) -> ApiResult<()> {
    let identity = RequestIdentity::default().with_principal(user.user_id);
    state
        .auth
        .rate_limiter()
        .check(&RateLimitRule::session_management(), &identity)
        .await?;
    Ok(())
}
