//! Session lifecycle coordinator
//!
//! One session record per principal and device. Each record holds the
//! salted hash of the only live refresh token for that device. Rotation
//! replaces that hash with a compare-and-replace, so an old refresh token
//! that shows up again is proof of replay and revokes every session of the
//! principal.
//!
//! Mass revocations leave a watermark (`revoked:{principal}`) in the
//! ephemeral store. A refresh token issued before the watermark whose record
//! is gone was revoked with its siblings and gets `SessionNotFound` instead
//! of triggering another mass revocation. Revoking a single session leaves
//! the same kind of marker scoped to that device only
//! (`revoked:{principal}:{device_hash}`), so every other device keeps full
//! replay containment. Both markers hold microsecond instants.

use std::sync::Arc;

use warden_db::{
    CreateSession, EphemeralStore, PrincipalRepository, RefreshRotation, SessionRepository,
    SessionRow,
};
use warden_types::{RefreshClass, Role, SessionId, SessionView, TokenPair, UserId};

use crate::config::{AuthConfig, ConfigError};
use crate::crypto::{
    constant_time_str_eq, generate_device_id, hash_refresh_credential, verify_refresh_credential,
    HmacKey,
};
use crate::notify::{events, Audience, Notifier, SessionEvent};
use crate::token::{AccessGrant, TokenIssuer};
use crate::AuthError;

/// Device facts supplied at login
#[derive(Debug, Clone, Default)]
pub struct DeviceContext {
    /// Client device identifier; one is generated when absent
    pub device_id: Option<String>,
    /// Human label, usually the user agent
    pub label: Option<String>,
    /// Client network address
    pub address: Option<String>,
}

/// Result of a successful login
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub user_id: UserId,
    pub role: Role,
    pub tokens: TokenPair,
    /// Device identifier the client must send from now on
    pub device_id: String,
    pub session: SessionView,
}

/// Caller identity established by [`SessionManager::authenticate`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedPrincipal {
    pub user_id: UserId,
    pub role: Role,
    pub session_id: SessionId,
    pub device_id_hash: String,
}

/// Coordinates login, rotation, revocation and per-request authentication
pub struct SessionManager<P, S, E> {
    config: AuthConfig,
    issuer: TokenIssuer,
    device_key: HmacKey,
    principals: Arc<P>,
    sessions: Arc<S>,
    store: Arc<E>,
    notifier: Arc<dyn Notifier>,
}

impl<P, S, E> SessionManager<P, S, E>
where
    P: PrincipalRepository,
    S: SessionRepository,
    E: EphemeralStore,
{
    pub fn new(
        config: AuthConfig,
        principals: Arc<P>,
        sessions: Arc<S>,
        store: Arc<E>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self, ConfigError> {
        let device_key = config.hmac_key()?.derive("device");
        let issuer = TokenIssuer::new(config.token_secret.as_bytes(), config.issuer.clone());
        Ok(Self {
            config,
            issuer,
            device_key,
            principals,
            sessions,
            store,
            notifier,
        })
    }

    pub fn issuer(&self) -> &TokenIssuer {
        &self.issuer
    }

    /// Keyed one-way hash of a raw device identifier
    pub fn hash_device_id(&self, device_id: &str) -> String {
        self.device_key.digest_hex(device_id)
    }

    /// Create the session for a principal on a device, replacing any earlier
    /// session on the same device.
    pub async fn open_session(
        &self,
        principal: UserId,
        role: Role,
        device: DeviceContext,
        remember: bool,
    ) -> Result<LoginOutcome, AuthError> {
        let device_id = device
            .device_id
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty())
            .unwrap_or_else(generate_device_id);
        let device_hash = self.hash_device_id(&device_id);
        let session_id = SessionId::new();
        let class = RefreshClass::from_remember(remember);

        let grant = AccessGrant {
            principal,
            role,
            device_id_hash: device_hash.clone(),
            session_id,
        };
        let access = self
            .issuer
            .issue_access_token(&grant, self.config.access_ttl)?;
        let refresh_ttl = self.config.refresh_ttl(class);
        let refresh = self.issuer.issue_refresh_token(principal, refresh_ttl)?;

        let row = self
            .sessions
            .upsert(CreateSession {
                id: session_id.0,
                user_id: principal.0,
                device_id_hash: device_hash.clone(),
                refresh_credential_hash: hash_refresh_credential(&refresh.token),
                access_expires_at: access.expires_at,
                refresh_expires_at: refresh.expires_at,
                remember,
                device_label: device.label,
                origin_address: device.address,
            })
            .await?;

        self.notifier.notify(
            SessionEvent::new(Audience::Principal(principal), events::NEW_SESSION).with_payload(
                serde_json::json!({
                    "session_id": row.id,
                    "device_label": row.device_label,
                }),
            ),
        );

        tracing::info!(
            user_id = %principal,
            device_hash = short(&device_hash),
            session_id = %row.id,
            remember,
            "Session opened"
        );

        Ok(LoginOutcome {
            user_id: principal,
            role,
            tokens: TokenPair::bearer(
                access.token,
                refresh.token,
                self.config.access_ttl.as_secs(),
                refresh_ttl.as_secs(),
            ),
            device_id,
            session: row.to_view(true),
        })
    }

    /// Exchange a refresh token for a new token pair.
    ///
    /// The presented token must match the record for its device; anything
    /// else is treated as replay and revokes every session of the principal.
    pub async fn rotate(
        &self,
        refresh_token: &str,
        device_id: &str,
    ) -> Result<TokenPair, AuthError> {
        if refresh_token.trim().is_empty() {
            return Err(AuthError::NoToken);
        }
        if device_id.trim().is_empty() {
            return Err(AuthError::DeviceIdMissing);
        }

        let claims = self.issuer.verify_refresh(refresh_token)?;
        let principal = claims.principal()?;
        let device_hash = self.hash_device_id(device_id.trim());

        let record = match self
            .sessions
            .find_by_device(principal.0, &device_hash)
            .await?
        {
            Some(record) => record,
            None => {
                if self
                    .revoked_after_issue(principal, &device_hash, claims.issued_at_micros())
                    .await?
                {
                    tracing::debug!(
                        user_id = %principal,
                        device_hash = short(&device_hash),
                        "Refresh for a session that was already revoked"
                    );
                    return Err(AuthError::SessionNotFound);
                }
                return Err(self.contain_reuse(principal, &device_hash).await);
            }
        };

        if !verify_refresh_credential(refresh_token, &record.refresh_credential_hash) {
            return Err(self.contain_reuse(principal, &device_hash).await);
        }

        let role = self
            .principals
            .find_by_id(principal.0)
            .await?
            .map(|p| p.role())
            .ok_or(AuthError::SessionNotFound)?;

        let class = record.refresh_class();
        let grant = AccessGrant {
            principal,
            role,
            device_id_hash: device_hash.clone(),
            session_id: record.session_id(),
        };
        let access = self
            .issuer
            .issue_access_token(&grant, self.config.access_ttl)?;
        let refresh_ttl = self.config.refresh_ttl(class);
        let refresh = self.issuer.issue_refresh_token(principal, refresh_ttl)?;

        let rotated = self
            .sessions
            .rotate_refresh(
                principal.0,
                &device_hash,
                &record.refresh_credential_hash,
                RefreshRotation {
                    refresh_credential_hash: hash_refresh_credential(&refresh.token),
                    access_expires_at: access.expires_at,
                    refresh_expires_at: refresh.expires_at,
                },
            )
            .await?;

        if rotated.is_none() {
            // A concurrent request rotated this credential first.
            return Err(self.contain_reuse(principal, &device_hash).await);
        }

        tracing::debug!(
            user_id = %principal,
            device_hash = short(&device_hash),
            session_id = %record.id,
            "Refresh token rotated"
        );

        Ok(TokenPair::bearer(
            access.token,
            refresh.token,
            self.config.access_ttl.as_secs(),
            refresh_ttl.as_secs(),
        ))
    }

    /// Check a bearer access token for a privileged request
    pub async fn authenticate(
        &self,
        bearer: Option<&str>,
        device_id: Option<&str>,
        required: Role,
    ) -> Result<AuthenticatedPrincipal, AuthError> {
        let token = bearer
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::NoToken)?;
        let claims = self.issuer.verify_access(token)?;

        let device_id = device_id
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .ok_or(AuthError::DeviceIdMissing)?;
        let device_hash = self.hash_device_id(device_id);
        if !constant_time_str_eq(&device_hash, &claims.dev) {
            tracing::debug!(device_hash = short(&device_hash), "Access token used from another device");
            return Err(AuthError::DeviceMismatch);
        }

        let principal = claims.principal()?;
        let session_id = claims.session_id()?;
        let record = self
            .sessions
            .find_by_device(principal.0, &device_hash)
            .await?
            .filter(|r| r.id == session_id.0)
            .ok_or(AuthError::SessionNotFound)?;

        let role = claims.role();
        if !role.satisfies(required) {
            return Err(AuthError::InsufficientRole {
                required,
                actual: role,
            });
        }

        Ok(AuthenticatedPrincipal {
            user_id: principal,
            role,
            session_id: record.session_id(),
            device_id_hash: device_hash,
        })
    }

    /// The caller's own live session
    pub async fn current_session(
        &self,
        principal: UserId,
        device_id: &str,
    ) -> Result<SessionRow, AuthError> {
        let device_hash = self.hash_device_id(device_id.trim());
        self.sessions
            .find_by_device(principal.0, &device_hash)
            .await?
            .ok_or(AuthError::SessionNotFound)
    }

    /// End the caller's own session
    pub async fn logout(&self, principal: UserId, device_id: &str) -> Result<(), AuthError> {
        let device_hash = self.hash_device_id(device_id.trim());
        let deleted = self
            .sessions
            .delete_by_device(principal.0, &device_hash)
            .await?;

        if deleted {
            self.notifier.notify(SessionEvent::new(
                Audience::Principal(principal),
                events::LIST_CHANGED,
            ));
        }
        tracing::info!(
            user_id = %principal,
            device_hash = short(&device_hash),
            deleted,
            "Session logged out"
        );
        Ok(())
    }

    /// End every session of a principal
    pub async fn logout_all(&self, principal: UserId) -> Result<u64, AuthError> {
        self.revoke_all(principal, "logout_all").await
    }

    /// Revoke every session of a principal and leave a watermark
    pub async fn revoke_all(&self, principal: UserId, reason: &str) -> Result<u64, AuthError> {
        let revoked = self.sessions.delete_all_for_user(principal.0).await?;
        self.mark_revoked(principal, &watermark_key(principal)).await;

        self.notifier.notify(
            SessionEvent::new(Audience::Principal(principal), events::FORCED_LOGOUT)
                .with_payload(serde_json::json!({ "scope": "all", "reason": reason })),
        );
        tracing::info!(user_id = %principal, revoked, reason, "All sessions revoked");
        Ok(revoked)
    }

    /// Revoke one of the caller's other sessions by ID. The caller's own
    /// session must be ended through [`SessionManager::logout`].
    pub async fn revoke_session(
        &self,
        principal: UserId,
        current_device_id: &str,
        session_id: SessionId,
    ) -> Result<(), AuthError> {
        let current = self.current_session(principal, current_device_id).await?;
        if current.id == session_id.0 {
            return Err(AuthError::CannotRevokeCurrentSession);
        }

        let target = self
            .sessions
            .find_by_id(principal.0, session_id.0)
            .await?
            .ok_or(AuthError::SessionNotFound)?;
        if !self.sessions.delete_by_id(principal.0, session_id.0).await? {
            return Err(AuthError::SessionNotFound);
        }
        // Only the revoked device's next refresh is spared the replay path.
        let marker = device_watermark_key(principal, &target.device_id_hash);
        self.mark_revoked(principal, &marker).await;

        self.notifier.notify(
            SessionEvent::new(Audience::Principal(principal), events::FORCED_LOGOUT)
                .with_payload(serde_json::json!({ "scope": "single", "session_id": session_id })),
        );
        self.notifier.notify(SessionEvent::new(
            Audience::Principal(principal),
            events::LIST_CHANGED,
        ));
        tracing::info!(user_id = %principal, session_id = %session_id, "Session revoked");
        Ok(())
    }

    /// Revoke every session except the caller's current one
    pub async fn revoke_others(
        &self,
        principal: UserId,
        current_device_id: &str,
    ) -> Result<u64, AuthError> {
        let current = self.current_session(principal, current_device_id).await?;
        let revoked = self
            .sessions
            .delete_all_except(principal.0, &current.device_id_hash)
            .await?;
        self.mark_revoked(principal, &watermark_key(principal)).await;

        self.notifier.notify(
            SessionEvent::new(Audience::Principal(principal), events::FORCED_LOGOUT).with_payload(
                serde_json::json!({ "scope": "others", "kept_session_id": current.id }),
            ),
        );
        tracing::info!(
            user_id = %principal,
            kept_session_id = %current.id,
            revoked,
            "Other sessions revoked"
        );
        Ok(revoked)
    }

    /// Live sessions of a principal, flagging the caller's own
    pub async fn list_sessions(
        &self,
        principal: UserId,
        current_device_id: Option<&str>,
    ) -> Result<Vec<SessionView>, AuthError> {
        let current_hash = current_device_id.map(|d| self.hash_device_id(d.trim()));
        let rows = self.sessions.find_by_user_id(principal.0).await?;

        Ok(rows
            .iter()
            .filter(|row| !row.is_expired())
            .map(|row| {
                let is_current = current_hash
                    .as_deref()
                    .is_some_and(|h| constant_time_str_eq(h, &row.device_id_hash));
                row.to_view(is_current)
            })
            .collect())
    }

    /// Delete records past their refresh expiry
    pub async fn purge_expired(&self) -> Result<u64, AuthError> {
        let purged = self.sessions.delete_expired().await?;
        if purged > 0 {
            tracing::debug!(purged, "Expired sessions purged");
        }
        Ok(purged)
    }

    /// Replay containment: revoke everything and report the reuse
    async fn contain_reuse(&self, principal: UserId, device_hash: &str) -> AuthError {
        tracing::warn!(
            user_id = %principal,
            device_hash = short(device_hash),
            operation = "rotate",
            "Refresh credential reuse detected, revoking all sessions"
        );
        match self.revoke_all(principal, "credential_reuse").await {
            Ok(_) => AuthError::ReusedCredentialDetected,
            Err(e) => e,
        }
    }

    async fn mark_revoked(&self, principal: UserId, key: &str) {
        let now = chrono::Utc::now().timestamp_micros().to_string();
        if let Err(e) = self
            .store
            .set(key, &now, self.config.revocation_watermark_ttl)
            .await
        {
            tracing::error!(user_id = %principal, "Failed to record revocation watermark: {}", e);
        }
    }

    /// Whether a token issued at `issued_at_us` was revoked afterwards, either
    /// with all of the principal's sessions or as this device alone. Store
    /// failures propagate; guessing either way would be wrong.
    async fn revoked_after_issue(
        &self,
        principal: UserId,
        device_hash: &str,
        issued_at_us: i64,
    ) -> Result<bool, AuthError> {
        for key in [
            watermark_key(principal),
            device_watermark_key(principal, device_hash),
        ] {
            let Some(value) = self.store.get(&key).await? else {
                continue;
            };
            match value.parse::<i64>() {
                Ok(revoked_at) if issued_at_us < revoked_at => return Ok(true),
                Ok(_) => {}
                Err(_) => tracing::warn!(user_id = %principal, "Unreadable revocation watermark"),
            }
        }
        Ok(false)
    }
}

impl<P, S, E> std::fmt::Debug for SessionManager<P, S, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn watermark_key(principal: UserId) -> String {
    format!("revoked:{principal}")
}

fn device_watermark_key(principal: UserId, device_hash: &str) -> String {
    format!("revoked:{principal}:{device_hash}")
}

/// Log-safe prefix of a hash
fn short(hash: &str) -> &str {
    hash.get(..12).unwrap_or(hash)
}
