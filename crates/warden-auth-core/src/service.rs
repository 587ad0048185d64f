//! Auth service - ties together sessions, OTP challenges, rate limiting and
//! principal resolution

use std::sync::Arc;

use warden_db::{CreatePrincipal, DbError, EphemeralStore, PrincipalRepository, PrincipalRow, SessionRepository};
use warden_types::{FederatedIdentity, OtpPurpose, Role, SessionId, SessionView, TokenPair, UserId};

use crate::{
    config::{AuthConfig, ConfigError},
    delivery::{CodeDelivery, CodeMessage},
    notify::Notifier,
    otp::{normalize_identifier, OtpManager},
    rate_limit::RateLimiter,
    session::{AuthenticatedPrincipal, DeviceContext, LoginOutcome, SessionManager},
    single_flight::SingleFlightGuard,
    AuthError,
};

/// Primary credential outcome, already checked by the identity collaborator
#[derive(Debug, Clone)]
pub enum VerifiedCredential {
    /// Password matched for this principal
    Password { principal_id: UserId },
    /// Federated provider callback
    Federated(FederatedIdentity),
    /// Registration completion after a verified `Registration` code
    Registration {
        email: String,
        display_name: Option<String>,
        password_hash: String,
    },
}

/// Login request
#[derive(Debug, Clone)]
pub struct LoginRequest {
    pub credential: VerifiedCredential,
    pub device: DeviceContext,
    pub remember: bool,
}

/// Authentication service
///
/// Provides unified interface for:
/// - Login, registration and federated login
/// - Refresh rotation with reuse detection
/// - Logout, revocation and password flows
/// - OTP send and verify
/// - Per-request authentication
pub struct AuthService<P, S, E> {
    sessions: SessionManager<P, S, E>,
    otp: OtpManager<E>,
    rate_limiter: RateLimiter<E>,
    single_flight: SingleFlightGuard<E>,
    principals: Arc<P>,
    delivery: Arc<dyn CodeDelivery>,
}

impl<P, S, E> AuthService<P, S, E>
where
    P: PrincipalRepository,
    S: SessionRepository,
    E: EphemeralStore,
{
    /// Create a new auth service
    pub fn new(
        config: AuthConfig,
        principals: Arc<P>,
        session_repo: Arc<S>,
        ephemeral: Arc<E>,
        notifier: Arc<dyn Notifier>,
        delivery: Arc<dyn CodeDelivery>,
    ) -> Result<Self, ConfigError> {
        let identity_key = config.hmac_key()?.derive("ratelimit");

        Ok(Self {
            otp: OtpManager::new(
                Arc::clone(&ephemeral),
                config.otp.clone(),
                identity_key.clone(),
            ),
            rate_limiter: RateLimiter::new(Arc::clone(&ephemeral), identity_key),
            single_flight: SingleFlightGuard::new(Arc::clone(&ephemeral), config.single_flight_ttl),
            sessions: SessionManager::new(
                config,
                Arc::clone(&principals),
                session_repo,
                ephemeral,
                notifier,
            )?,
            principals,
            delivery,
        })
    }

    pub fn sessions(&self) -> &SessionManager<P, S, E> {
        &self.sessions
    }

    pub fn otp(&self) -> &OtpManager<E> {
        &self.otp
    }

    pub fn rate_limiter(&self) -> &RateLimiter<E> {
        &self.rate_limiter
    }

    pub fn single_flight(&self) -> &SingleFlightGuard<E> {
        &self.single_flight
    }

    // =========================================================================
    // Login
    // =========================================================================

    /// Resolve (or create) the principal and open a session on the device
    pub async fn login(&self, request: LoginRequest) -> Result<LoginOutcome, AuthError> {
        let principal = match request.credential {
            VerifiedCredential::Password { principal_id } => self
                .principals
                .find_by_id(principal_id.0)
                .await?
                .ok_or(AuthError::InvalidCredentials)?,
            VerifiedCredential::Federated(identity) => self.resolve_federated(&identity).await?,
            VerifiedCredential::Registration {
                email,
                display_name,
                password_hash,
            } => {
                self.complete_registration(&email, display_name, password_hash)
                    .await?
            }
        };

        self.sessions
            .open_session(
                principal.user_id(),
                principal.role(),
                request.device,
                request.remember,
            )
            .await
    }

    /// Subject first, then email (linking the subject), then a new principal
    async fn resolve_federated(
        &self,
        identity: &FederatedIdentity,
    ) -> Result<PrincipalRow, AuthError> {
        let subject = identity.subject.trim();
        if subject.is_empty() {
            return Err(AuthError::MissingField("subject"));
        }
        let email = normalize_email(&identity.email)?;

        if let Some(principal) = self.principals.find_by_federated_subject(subject).await? {
            return Ok(principal);
        }

        if let Some(mut principal) = self.principals.find_by_email(&email).await? {
            self.principals
                .link_federated_subject(principal.id, subject)
                .await?;
            tracing::info!(user_id = %principal.id, "Federated subject linked");
            principal.federated_subject = Some(subject.to_string());
            return Ok(principal);
        }

        let principal = self
            .principals
            .create(CreatePrincipal {
                id: uuid::Uuid::new_v4(),
                email,
                display_name: identity.display_name.clone(),
                federated_subject: Some(subject.to_string()),
                role: Role::User.as_str().to_string(),
                password_hash: None,
            })
            .await
            .map_err(conflict_as_email_taken)?;
        tracing::info!(user_id = %principal.id, "Principal created from federated login");
        Ok(principal)
    }

    async fn complete_registration(
        &self,
        email: &str,
        display_name: Option<String>,
        password_hash: String,
    ) -> Result<PrincipalRow, AuthError> {
        let email = normalize_email(email)?;
        if !self.otp.is_verified(&email, OtpPurpose::Registration).await? {
            return Err(AuthError::VerificationRequired);
        }
        if self.principals.find_by_email(&email).await?.is_some() {
            return Err(AuthError::EmailTaken);
        }

        let principal = self
            .principals
            .create(CreatePrincipal {
                id: uuid::Uuid::new_v4(),
                email: email.clone(),
                display_name,
                federated_subject: None,
                role: Role::User.as_str().to_string(),
                password_hash: Some(password_hash),
            })
            .await
            .map_err(conflict_as_email_taken)?;
        self.otp
            .clear_verified(&email, OtpPurpose::Registration)
            .await?;

        tracing::info!(user_id = %principal.id, "Principal registered");
        Ok(principal)
    }

    // =========================================================================
    // Session Management
    // =========================================================================

    /// Exchange a refresh token for a new pair
    pub async fn rotate(&self, refresh_token: &str, device_id: &str) -> Result<TokenPair, AuthError> {
        self.sessions.rotate(refresh_token, device_id).await
    }

    /// End the caller's session on this device
    pub async fn logout(&self, principal: UserId, device_id: &str) -> Result<(), AuthError> {
        self.sessions.logout(principal, device_id).await
    }

    /// End every session of the caller
    pub async fn logout_all(&self, principal: UserId) -> Result<u64, AuthError> {
        self.sessions.logout_all(principal).await
    }

    /// Revoke another of the caller's sessions
    pub async fn revoke_session(
        &self,
        principal: UserId,
        current_device_id: &str,
        session_id: SessionId,
    ) -> Result<(), AuthError> {
        self.sessions
            .revoke_session(principal, current_device_id, session_id)
            .await
    }

    /// Live sessions of the caller
    pub async fn list_sessions(
        &self,
        principal: UserId,
        current_device_id: Option<&str>,
    ) -> Result<Vec<SessionView>, AuthError> {
        self.sessions
            .list_sessions(principal, current_device_id)
            .await
    }

    /// Check a bearer token for a privileged request
    pub async fn authenticate(
        &self,
        bearer: Option<&str>,
        device_id: Option<&str>,
        required: Role,
    ) -> Result<AuthenticatedPrincipal, AuthError> {
        self.sessions.authenticate(bearer, device_id, required).await
    }

    /// Delete records past their refresh expiry
    pub async fn purge_expired_sessions(&self) -> Result<u64, AuthError> {
        self.sessions.purge_expired().await
    }

    // =========================================================================
    // Passwords
    // =========================================================================

    /// Change the password and revoke every other session of the caller.
    /// Returns how many sessions were revoked.
    pub async fn change_password(
        &self,
        principal: UserId,
        current_device_id: &str,
        new_password_hash: &str,
    ) -> Result<u64, AuthError> {
        self.sessions
            .current_session(principal, current_device_id)
            .await?;
        self.principals
            .update_password_hash(principal.0, new_password_hash)
            .await
            .map_err(not_found_as_session_missing)?;
        self.sessions
            .revoke_others(principal, current_device_id)
            .await
    }

    /// Reset the password after a verified `PasswordReset` code and revoke
    /// every session. Returns how many sessions were revoked.
    pub async fn reset_password(
        &self,
        identifier: &str,
        new_password_hash: &str,
    ) -> Result<u64, AuthError> {
        let email = normalize_email(identifier)?;
        if !self.otp.is_verified(&email, OtpPurpose::PasswordReset).await? {
            return Err(AuthError::VerificationRequired);
        }
        let principal = self
            .principals
            .find_by_email(&email)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        // The gate may have expired or been spent while we looked up the principal.
        if !self.otp.is_verified(&email, OtpPurpose::PasswordReset).await? {
            return Err(AuthError::VerificationRequired);
        }
        self.principals
            .update_password_hash(principal.id, new_password_hash)
            .await?;
        let revoked = self
            .sessions
            .revoke_all(principal.user_id(), "password_reset")
            .await?;
        self.otp
            .clear_verified(&email, OtpPurpose::PasswordReset)
            .await?;
        Ok(revoked)
    }

    // =========================================================================
    // OTP
    // =========================================================================

    /// Create a challenge and hand the code to the delivery collaborator.
    ///
    /// A delivery failure is reported as `DeliveryFailed`; the challenge
    /// stays and the client recovers by resending after the cooldown.
    pub async fn send_otp(&self, identifier: &str, purpose: OtpPurpose) -> Result<u64, AuthError> {
        let recipient = normalize_identifier(identifier)?;
        let issued = self.otp.create(&recipient, purpose).await?;
        let expires_in_secs = issued.expires_in.as_secs();

        self.delivery
            .deliver(CodeMessage {
                recipient,
                purpose,
                code: issued.code,
                expires_in_secs,
            })
            .await
            .map_err(|e| {
                tracing::error!(purpose = purpose.as_str(), "OTP delivery failed: {}", e);
                AuthError::DeliveryFailed(e.to_string())
            })?;

        Ok(expires_in_secs)
    }

    /// Verify a code for an identifier and purpose
    pub async fn verify_otp(
        &self,
        identifier: &str,
        purpose: OtpPurpose,
        code: &str,
    ) -> Result<(), AuthError> {
        self.otp.verify(identifier, purpose, code).await
    }
}

impl<P, S, E> std::fmt::Debug for AuthService<P, S, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthService")
            .field("sessions", &self.sessions)
            .finish_non_exhaustive()
    }
}

fn normalize_email(email: &str) -> Result<String, AuthError> {
    let email = email.trim().to_lowercase();
    if email.is_empty() {
        return Err(AuthError::MissingField("email"));
    }
    if !email.contains('@') {
        return Err(AuthError::InvalidInput("email must contain '@'".to_string()));
    }
    Ok(email)
}

fn conflict_as_email_taken(err: DbError) -> AuthError {
    match err {
        DbError::Conflict(_) => AuthError::EmailTaken,
        other => other.into(),
    }
}

fn not_found_as_session_missing(err: DbError) -> AuthError {
    match err {
        DbError::NotFound => AuthError::SessionNotFound,
        other => other.into(),
    }
}
