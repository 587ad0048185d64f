//! Database row models
//!
//! These types map directly to database rows using SQLx's FromRow derive.

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;
use warden_types::{RefreshClass, Role, SessionId, SessionView, UserId};

/// Principal row from the database
#[derive(Debug, Clone, FromRow)]
pub struct PrincipalRow {
    pub id: Uuid,
    pub email: String,
    pub display_name: Option<String>,
    pub federated_subject: Option<String>,
    pub role: String,
    pub password_hash: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PrincipalRow {
    /// Typed principal ID
    pub fn user_id(&self) -> UserId {
        UserId(self.id)
    }

    /// Role resolved through the rank table (unknown labels are lowest)
    pub fn role(&self) -> Role {
        Role::from_label(&self.role)
    }
}

/// Session record: one per principal and device
#[derive(Debug, Clone, FromRow)]
pub struct SessionRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub device_id_hash: String,
    pub refresh_credential_hash: String,
    pub access_expires_at: DateTime<Utc>,
    pub refresh_expires_at: DateTime<Utc>,
    pub remember: bool,
    pub device_label: Option<String>,
    pub origin_address: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl SessionRow {
    /// Typed session ID
    pub fn session_id(&self) -> SessionId {
        SessionId(self.id)
    }

    /// Typed owner ID
    pub fn owner(&self) -> UserId {
        UserId(self.user_id)
    }

    /// Refresh lifetime class fixed at login
    pub fn refresh_class(&self) -> RefreshClass {
        RefreshClass::from_remember(self.remember)
    }

    /// Whether the refresh credential has passed its expiry
    pub fn is_expired(&self) -> bool {
        self.refresh_expires_at <= Utc::now()
    }

    /// Owner-facing view with the credential hash stripped
    pub fn to_view(&self, is_current: bool) -> SessionView {
        SessionView {
            id: self.session_id(),
            device_label: self.device_label.clone(),
            origin_address: self.origin_address.clone(),
            created_at: self.created_at,
            access_expires_at: self.access_expires_at,
            refresh_expires_at: self.refresh_expires_at,
            remember: self.remember,
            is_current,
        }
    }
}
