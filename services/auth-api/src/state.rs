//! Application state

use std::sync::Arc;

use warden_auth_core::AuthService;
use warden_db::pg::{PgPrincipalRepository, PgSessionRepository};
use warden_db::{DbPool, RedisStore};

/// Type alias for the auth service with concrete store types
pub type AuthServiceImpl = AuthService<PgPrincipalRepository, PgSessionRepository, RedisStore>;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Session engine
    pub auth: Arc<AuthServiceImpl>,
    /// Database pool (readiness checks)
    pub pool: DbPool,
    /// Ephemeral store (readiness checks)
    pub ephemeral: Arc<RedisStore>,
}

impl AppState {
    pub fn new(
        auth: AuthServiceImpl,
        pool: DbPool,
        ephemeral: Arc<RedisStore>,
    ) -> Self {
        Self {
            auth: Arc::new(auth),
            pool,
            ephemeral,
        }
    }
}
