//! Error types for the Auth API service.

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use warden_auth_core::{AuthError, ErrorKind};

/// Cookies the client keeps its session identifiers in
const CLEAR_SESSION_COOKIES: [&str; 2] = [
    "warden_refresh=; Max-Age=0; Path=/; HttpOnly; Secure; SameSite=Strict",
    "warden_device=; Max-Age=0; Path=/; HttpOnly; Secure; SameSite=Strict",
];

/// API error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// API error type
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Auth(#[from] AuthError),
}

impl ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Auth(e) => {
                StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            }
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "BAD_REQUEST",
            Self::Auth(e) => e.error_code(),
        }
    }

    /// Human message; dependency failures stay generic
    fn public_message(&self) -> String {
        match self {
            Self::Auth(e) if e.kind() == ErrorKind::Dependency => {
                "Service temporarily unavailable".to_string()
            }
            other => other.to_string(),
        }
    }

    fn details(&self) -> Option<serde_json::Value> {
        if !cfg!(debug_assertions) {
            return None;
        }
        match self {
            Self::Auth(e) => Some(serde_json::json!({
                "kind": format!("{:?}", e.kind()),
                "internal": e.to_string(),
            })),
            Self::BadRequest(_) => None,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Log internal errors
        if status.is_server_error() {
            tracing::error!(error = %self, code = self.error_code(), "Internal API error");
        }

        let body = ErrorResponse {
            error: ErrorDetail {
                code: self.error_code().to_string(),
                message: self.public_message(),
                details: self.details(),
            },
        };

        let mut response = (status, Json(body)).into_response();
        if let Self::Auth(e) = &self {
            let headers = response.headers_mut();
            if let Some(secs) = e.retry_after_secs() {
                headers.insert(header::RETRY_AFTER, HeaderValue::from(secs));
            }
            if e.clears_client_session() {
                for cookie in CLEAR_SESSION_COOKIES {
                    headers.append(header::SET_COOKIE, HeaderValue::from_static(cookie));
                }
            }
        }
        response
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
