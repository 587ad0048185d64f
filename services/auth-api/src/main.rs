//! Warden Auth API
//!
//! Session management service over PostgreSQL and Redis.

mod config;
mod error;
mod extractors;
mod handlers;
mod state;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::routing::{delete, get, post};
use axum::Router;
use tokio::sync::{broadcast, mpsc};
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use warden_auth_core::{AuthService, BroadcastNotifier, ChannelDelivery, CodeMessage, SessionEvent};
use warden_db::{create_pool, run_migrations, RedisStore, Repositories};

use crate::config::Config;
use crate::state::AppState;

/// Pending code deliveries before `send_otp` reports the channel full
const DELIVERY_QUEUE: usize = 1024;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("Starting Warden Auth API");

    let config = Config::from_env().context("loading configuration")?;

    let pool = create_pool(&config.database_url)
        .await
        .context("connecting to PostgreSQL")?;
    run_migrations(&pool).await.context("running migrations")?;
    let repos = Repositories::new(pool.clone());

    let ephemeral = Arc::new(
        RedisStore::connect(&config.redis_url)
            .await
            .context("connecting to Redis")?,
    );

    let notifier = Arc::new(BroadcastNotifier::default());
    spawn_event_log(notifier.subscribe());

    let (delivery, outbox) = ChannelDelivery::new(DELIVERY_QUEUE);
    spawn_delivery_drain(outbox);

    let auth = AuthService::new(
        config.auth.clone(),
        Arc::new(repos.principals),
        Arc::new(repos.sessions),
        Arc::clone(&ephemeral),
        notifier,
        Arc::new(delivery),
    )
    .context("building auth service")?;

    let state = AppState::new(auth, pool, ephemeral);
    spawn_session_sweep(state.clone(), config.session_sweep_interval);

    let app = router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.http_port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/ready", get(handlers::ready))
        .route("/api/v1/auth/refresh", post(handlers::refresh))
        .route("/api/v1/sessions", get(handlers::list_sessions))
        .route("/api/v1/sessions/logout", post(handlers::logout))
        .route("/api/v1/sessions/logout-all", post(handlers::logout_all))
        .route("/api/v1/sessions/:id", delete(handlers::revoke_session))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Periodically delete session records past their refresh expiry
fn spawn_session_sweep(state: AppState, every: std::time::Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match state.auth.purge_expired_sessions().await {
                Ok(purged) if purged > 0 => tracing::info!(purged, "Session sweep complete"),
                Ok(_) => {}
                Err(e) => tracing::warn!(error = %e, "Session sweep failed"),
            }
        }
    });
}

/// Hand-off point for the mail/SMS sender, which runs outside this service
fn spawn_delivery_drain(mut outbox: mpsc::Receiver<CodeMessage>) {
    tokio::spawn(async move {
        while let Some(message) = outbox.recv().await {
            tracing::info!(
                purpose = %message.purpose,
                expires_in_secs = message.expires_in_secs,
                "Verification code queued for delivery"
            );
        }
    });
}

/// Record session events until a real-time gateway subscribes
fn spawn_event_log(mut events: broadcast::Receiver<SessionEvent>) {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => tracing::debug!(event = %event.name, "Session event"),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Session event log lagged")
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}
