//! Common test utilities for warden-auth-core integration tests

pub mod mock_repos;

use std::sync::Arc;
use std::time::Duration;

use warden_auth_core::{AuthConfig, AuthService, DeviceContext, LoginOutcome, LoginRequest, VerifiedCredential};
use warden_db::{MemoryStore, PrincipalRow};

#[allow(unused_imports)]
pub use mock_repos::{
    FlakyStore, MockPrincipalRepository, MockSessionRepository, RecordingDelivery,
    RecordingNotifier,
};

pub const TEST_SECRET: &str = "test-secret-that-is-at-least-32-bytes-long";

pub type TestService = AuthService<MockPrincipalRepository, MockSessionRepository, MemoryStore>;

/// Service wired to in-memory stores, with handles to every collaborator
pub struct Harness {
    pub service: TestService,
    pub principals: Arc<MockPrincipalRepository>,
    pub sessions: Arc<MockSessionRepository>,
    pub store: Arc<MemoryStore>,
    pub notifier: Arc<RecordingNotifier>,
    pub delivery: Arc<RecordingDelivery>,
}

#[allow(dead_code)]
impl Harness {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: AuthConfig) -> Self {
        let principals = Arc::new(MockPrincipalRepository::new());
        let sessions = Arc::new(MockSessionRepository::new());
        let store = Arc::new(MemoryStore::new());
        let notifier = Arc::new(RecordingNotifier::default());
        let delivery = Arc::new(RecordingDelivery::default());

        let service = AuthService::new(
            config,
            Arc::clone(&principals),
            Arc::clone(&sessions),
            Arc::clone(&store),
            notifier.clone(),
            delivery.clone(),
        )
        .expect("test config is valid");

        Self {
            service,
            principals,
            sessions,
            store,
            notifier,
            delivery,
        }
    }

    /// Insert a principal with the given role label
    pub fn principal(&self, role: &str) -> PrincipalRow {
        let row = MockPrincipalRepository::test_principal(role);
        self.principals.insert(row.clone());
        row
    }

    /// Password login for `principal` on `device_id`
    pub async fn login(&self, principal: &PrincipalRow, device_id: &str, remember: bool) -> LoginOutcome {
        self.service
            .login(LoginRequest {
                credential: VerifiedCredential::Password {
                    principal_id: principal.user_id(),
                },
                device: DeviceContext {
                    device_id: Some(device_id.to_string()),
                    label: Some(format!("device {device_id}")),
                    address: Some("203.0.113.7".to_string()),
                },
                remember,
            })
            .await
            .expect("login succeeds")
    }
}

pub fn test_config() -> AuthConfig {
    AuthConfig::try_new(TEST_SECRET)
        .expect("secret is long enough")
        .with_issuer("warden-test")
        .with_single_flight_ttl(Duration::from_secs(10))
}
