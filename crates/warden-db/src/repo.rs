//! Repository traits
//!
//! Define async repository interfaces for the durable record store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::DbResult;
use crate::models::*;

/// Principal repository trait
#[async_trait]
pub trait PrincipalRepository: Send + Sync {
    /// Find a principal by ID
    async fn find_by_id(&self, id: Uuid) -> DbResult<Option<PrincipalRow>>;

    /// Find a principal by (normalised) email
    async fn find_by_email(&self, email: &str) -> DbResult<Option<PrincipalRow>>;

    /// Find a principal by federated provider subject
    async fn find_by_federated_subject(&self, subject: &str) -> DbResult<Option<PrincipalRow>>;

    /// Create a new principal. Fails with `DbError::Conflict` if the email
    /// or subject is already taken.
    async fn create(&self, principal: CreatePrincipal) -> DbResult<PrincipalRow>;

    /// Attach a federated subject to an existing principal
    async fn link_federated_subject(&self, id: Uuid, subject: &str) -> DbResult<()>;

    /// Replace the stored password hash (format is opaque to this crate)
    async fn update_password_hash(&self, id: Uuid, password_hash: &str) -> DbResult<()>;
}

/// Create principal input
#[derive(Debug, Clone)]
pub struct CreatePrincipal {
    pub id: Uuid,
    pub email: String,
    pub display_name: Option<String>,
    pub federated_subject: Option<String>,
    pub role: String,
    pub password_hash: Option<String>,
}

/// Session repository trait
///
/// Every read hides records whose `refresh_expires_at` has passed, so an
/// expired record is indistinguishable from a deleted one.
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Find a session by ID, scoped to its owner
    async fn find_by_id(&self, user_id: Uuid, id: Uuid) -> DbResult<Option<SessionRow>>;

    /// Find the session for a principal on a device
    async fn find_by_device(
        &self,
        user_id: Uuid,
        device_id_hash: &str,
    ) -> DbResult<Option<SessionRow>>;

    /// Find all live sessions for a principal, newest first
    async fn find_by_user_id(&self, user_id: Uuid) -> DbResult<Vec<SessionRow>>;

    /// Create the session for `(user_id, device_id_hash)`, atomically
    /// replacing any existing record for that pair
    async fn upsert(&self, session: CreateSession) -> DbResult<SessionRow>;

    /// Compare-and-replace the refresh credential.
    ///
    /// Succeeds only if the stored hash still equals `expected_hash`;
    /// returns `None` when the record is missing, expired, or was already
    /// rotated by a concurrent request.
    async fn rotate_refresh(
        &self,
        user_id: Uuid,
        device_id_hash: &str,
        expected_hash: &str,
        rotation: RefreshRotation,
    ) -> DbResult<Option<SessionRow>>;

    /// Delete the session for a principal on a device
    async fn delete_by_device(&self, user_id: Uuid, device_id_hash: &str) -> DbResult<bool>;

    /// Delete one session by ID, scoped to its owner
    async fn delete_by_id(&self, user_id: Uuid, id: Uuid) -> DbResult<bool>;

    /// Delete all sessions for a principal
    async fn delete_all_for_user(&self, user_id: Uuid) -> DbResult<u64>;

    /// Delete all sessions for a principal except the one on `keep_device_hash`
    async fn delete_all_except(&self, user_id: Uuid, keep_device_hash: &str) -> DbResult<u64>;

    /// Delete sessions whose refresh credential has expired
    async fn delete_expired(&self) -> DbResult<u64>;
}

/// Create session input
#[derive(Debug, Clone)]
pub struct CreateSession {
    pub id: Uuid,
    pub user_id: Uuid,
    pub device_id_hash: String,
    pub refresh_credential_hash: String,
    pub access_expires_at: DateTime<Utc>,
    pub refresh_expires_at: DateTime<Utc>,
    pub remember: bool,
    pub device_label: Option<String>,
    pub origin_address: Option<String>,
}

/// Replacement credential written by a successful rotation
#[derive(Debug, Clone)]
pub struct RefreshRotation {
    pub refresh_credential_hash: String,
    pub access_expires_at: DateTime<Utc>,
    pub refresh_expires_at: DateTime<Utc>,
}
