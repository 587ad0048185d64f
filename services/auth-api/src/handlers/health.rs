//! Health check handlers

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use std::time::Instant;
use warden_db::EphemeralStore;

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
}

#[derive(Debug, Serialize)]
pub struct ReadyResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub checks: ReadyChecks,
}

#[derive(Debug, Serialize)]
pub struct ReadyChecks {
    pub database: CheckResult,
    pub ephemeral: CheckResult,
}

#[derive(Debug, Serialize)]
pub struct CheckResult {
    pub status: &'static str,
    pub latency_ms: u64,
}

impl CheckResult {
    fn from_outcome(ok: bool, start: Instant) -> Self {
        Self {
            status: if ok { "ok" } else { "error" },
            latency_ms: u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
        }
    }

    fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}

/// GET /health - Liveness probe (fast, no dependencies)
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: "auth-api",
    })
}

/// GET /ready - Readiness probe (durable and ephemeral stores)
pub async fn ready(
    State(state): State<AppState>,
) -> Result<Json<ReadyResponse>, (StatusCode, Json<ReadyResponse>)> {
    let start = Instant::now();
    let db_result = sqlx::query("SELECT 1").fetch_one(&state.pool).await;
    let database = CheckResult::from_outcome(db_result.is_ok(), start);

    let start = Instant::now();
    let ephemeral_result = state.ephemeral.ping().await;
    let ephemeral = CheckResult::from_outcome(ephemeral_result.is_ok(), start);

    if let Err(e) = &db_result {
        tracing::warn!(error = %e, "Readiness: database check failed");
    }
    if let Err(e) = &ephemeral_result {
        tracing::warn!(error = %e, "Readiness: ephemeral store check failed");
    }

    let ready = database.is_ok() && ephemeral.is_ok();
    let body = ReadyResponse {
        status: if ready { "ready" } else { "not_ready" },
        service: "auth-api",
        checks: ReadyChecks {
            database,
            ephemeral,
        },
    };

    if ready {
        Ok(Json(body))
    } else {
        Err((StatusCode::SERVICE_UNAVAILABLE, Json(body)))
    }
}
