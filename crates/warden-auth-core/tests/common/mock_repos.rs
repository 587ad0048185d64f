//! Mock repositories and collaborators for testing

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use uuid::Uuid;
use warden_auth_core::{CodeDelivery, CodeMessage, DeliveryError, Notifier, SessionEvent};
use warden_db::{
    CreatePrincipal, CreateSession, DbError, DbResult, EphemeralStore, MemoryStore,
    PrincipalRepository, PrincipalRow, RefreshRotation, SessionRepository, SessionRow,
    WindowCount,
};

/// In-memory principal repository for testing
#[derive(Default, Clone)]
pub struct MockPrincipalRepository {
    principals: Arc<DashMap<Uuid, PrincipalRow>>,
    by_email: Arc<DashMap<String, Uuid>>,
    by_subject: Arc<DashMap<String, Uuid>>,
}

#[allow(dead_code)]
impl MockPrincipalRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a test principal directly
    pub fn insert(&self, row: PrincipalRow) {
        self.by_email.insert(row.email.clone(), row.id);
        if let Some(ref sub) = row.federated_subject {
            self.by_subject.insert(sub.clone(), row.id);
        }
        self.principals.insert(row.id, row);
    }

    pub fn test_principal(role: &str) -> PrincipalRow {
        let id = Uuid::new_v4();
        PrincipalRow {
            id,
            email: format!("user-{id}@example.com"),
            display_name: None,
            federated_subject: None,
            role: role.to_string(),
            password_hash: Some("opaque-hash".to_string()),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    pub fn get(&self, id: Uuid) -> Option<PrincipalRow> {
        self.principals.get(&id).map(|r| r.value().clone())
    }

    pub fn count(&self) -> usize {
        self.principals.len()
    }
}

#[async_trait]
impl PrincipalRepository for MockPrincipalRepository {
    async fn find_by_id(&self, id: Uuid) -> DbResult<Option<PrincipalRow>> {
        Ok(self.get(id))
    }

    async fn find_by_email(&self, email: &str) -> DbResult<Option<PrincipalRow>> {
        Ok(self
            .by_email
            .get(email)
            .and_then(|id| self.get(*id.value())))
    }

    async fn find_by_federated_subject(&self, subject: &str) -> DbResult<Option<PrincipalRow>> {
        Ok(self
            .by_subject
            .get(subject)
            .and_then(|id| self.get(*id.value())))
    }

    async fn create(&self, principal: CreatePrincipal) -> DbResult<PrincipalRow> {
        if self.by_email.contains_key(&principal.email) {
            return Err(DbError::Conflict("principals.email".to_string()));
        }
        let row = PrincipalRow {
            id: principal.id,
            email: principal.email,
            display_name: principal.display_name,
            federated_subject: principal.federated_subject,
            role: principal.role,
            password_hash: principal.password_hash,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        self.insert(row.clone());
        Ok(row)
    }

    async fn link_federated_subject(&self, id: Uuid, subject: &str) -> DbResult<()> {
        let mut row = self.principals.get_mut(&id).ok_or(DbError::NotFound)?;
        row.federated_subject = Some(subject.to_string());
        row.updated_at = Utc::now();
        self.by_subject.insert(subject.to_string(), id);
        Ok(())
    }

    async fn update_password_hash(&self, id: Uuid, password_hash: &str) -> DbResult<()> {
        let mut row = self.principals.get_mut(&id).ok_or(DbError::NotFound)?;
        row.password_hash = Some(password_hash.to_string());
        row.updated_at = Utc::now();
        Ok(())
    }
}

/// In-memory session repository for testing.
///
/// Keyed by `(user_id, device_id_hash)` so the one-record-per-device rule
/// holds by construction; `rotate_refresh` compares and replaces under the
/// entry lock.
#[derive(Default, Clone)]
pub struct MockSessionRepository {
    sessions: Arc<DashMap<(Uuid, String), SessionRow>>,
    unavailable: Arc<AtomicBool>,
}

#[allow(dead_code)]
impl MockSessionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count_for(&self, user_id: Uuid) -> usize {
        self.sessions.iter().filter(|e| e.key().0 == user_id).count()
    }

    pub fn all_for(&self, user_id: Uuid) -> Vec<SessionRow> {
        self.sessions
            .iter()
            .filter(|e| e.key().0 == user_id)
            .map(|e| e.value().clone())
            .collect()
    }

    /// Make every call fail as if the database were down
    pub fn set_unavailable(&self, down: bool) {
        self.unavailable.store(down, Ordering::SeqCst);
    }

    fn check(&self) -> DbResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(DbError::Unavailable("connection refused".to_string()));
        }
        Ok(())
    }

    /// Push a record's refresh expiry into the past
    pub fn expire(&self, user_id: Uuid, device_id_hash: &str) {
        if let Some(mut row) = self
            .sessions
            .get_mut(&(user_id, device_id_hash.to_string()))
        {
            row.refresh_expires_at = Utc::now() - chrono::Duration::seconds(1);
        }
    }
}

#[async_trait]
impl SessionRepository for MockSessionRepository {
    async fn find_by_id(&self, user_id: Uuid, id: Uuid) -> DbResult<Option<SessionRow>> {
        self.check()?;
        Ok(self
            .sessions
            .iter()
            .find(|e| e.key().0 == user_id && e.value().id == id && !e.value().is_expired())
            .map(|e| e.value().clone()))
    }

    async fn find_by_device(
        &self,
        user_id: Uuid,
        device_id_hash: &str,
    ) -> DbResult<Option<SessionRow>> {
        self.check()?;
        Ok(self
            .sessions
            .get(&(user_id, device_id_hash.to_string()))
            .map(|r| r.value().clone())
            .filter(|r| !r.is_expired()))
    }

    async fn find_by_user_id(&self, user_id: Uuid) -> DbResult<Vec<SessionRow>> {
        self.check()?;
        let mut rows: Vec<SessionRow> = self
            .all_for(user_id)
            .into_iter()
            .filter(|r| !r.is_expired())
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }

    async fn upsert(&self, session: CreateSession) -> DbResult<SessionRow> {
        self.check()?;
        let row = SessionRow {
            id: session.id,
            user_id: session.user_id,
            device_id_hash: session.device_id_hash.clone(),
            refresh_credential_hash: session.refresh_credential_hash,
            access_expires_at: session.access_expires_at,
            refresh_expires_at: session.refresh_expires_at,
            remember: session.remember,
            device_label: session.device_label,
            origin_address: session.origin_address,
            created_at: Utc::now(),
        };
        self.sessions
            .insert((session.user_id, session.device_id_hash), row.clone());
        Ok(row)
    }

    async fn rotate_refresh(
        &self,
        user_id: Uuid,
        device_id_hash: &str,
        expected_hash: &str,
        rotation: RefreshRotation,
    ) -> DbResult<Option<SessionRow>> {
        self.check()?;
        let Some(mut row) = self.sessions.get_mut(&(user_id, device_id_hash.to_string())) else {
            return Ok(None);
        };
        if row.refresh_credential_hash != expected_hash || row.is_expired() {
            return Ok(None);
        }
        row.refresh_credential_hash = rotation.refresh_credential_hash;
        row.access_expires_at = rotation.access_expires_at;
        row.refresh_expires_at = rotation.refresh_expires_at;
        Ok(Some(row.clone()))
    }

    async fn delete_by_device(&self, user_id: Uuid, device_id_hash: &str) -> DbResult<bool> {
        self.check()?;
        Ok(self
            .sessions
            .remove(&(user_id, device_id_hash.to_string()))
            .is_some())
    }

    async fn delete_by_id(&self, user_id: Uuid, id: Uuid) -> DbResult<bool> {
        self.check()?;
        let before = self.sessions.len();
        self.sessions
            .retain(|key, row| !(key.0 == user_id && row.id == id));
        Ok(self.sessions.len() < before)
    }

    async fn delete_all_for_user(&self, user_id: Uuid) -> DbResult<u64> {
        self.check()?;
        let before = self.sessions.len();
        self.sessions.retain(|key, _| key.0 != user_id);
        Ok((before - self.sessions.len()) as u64)
    }

    async fn delete_all_except(&self, user_id: Uuid, keep_device_hash: &str) -> DbResult<u64> {
        self.check()?;
        let before = self.sessions.len();
        self.sessions
            .retain(|key, _| key.0 != user_id || key.1 == keep_device_hash);
        Ok((before - self.sessions.len()) as u64)
    }

    async fn delete_expired(&self) -> DbResult<u64> {
        self.check()?;
        let before = self.sessions.len();
        self.sessions.retain(|_, row| !row.is_expired());
        Ok((before - self.sessions.len()) as u64)
    }
}

/// Notifier that keeps every event
#[derive(Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<SessionEvent>>,
}

#[allow(dead_code)]
impl RecordingNotifier {
    pub fn names(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(|e| e.name.clone())
            .collect()
    }

    pub fn events(&self) -> Vec<SessionEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, event: SessionEvent) {
        self.events.lock().unwrap().push(event);
    }
}

/// Delivery that keeps every message, or fails on demand
#[derive(Default)]
pub struct RecordingDelivery {
    messages: Mutex<Vec<CodeMessage>>,
    fail: AtomicBool,
}

#[allow(dead_code)]
impl RecordingDelivery {
    pub fn fail_next(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn last_code(&self) -> Option<String> {
        self.messages.lock().unwrap().last().map(|m| m.code.clone())
    }

    pub fn messages(&self) -> Vec<CodeMessage> {
        self.messages.lock().unwrap().clone()
    }
}

#[async_trait]
impl CodeDelivery for RecordingDelivery {
    async fn deliver(&self, message: CodeMessage) -> Result<(), DeliveryError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(DeliveryError::Transport("smtp unavailable".to_string()));
        }
        self.messages.lock().unwrap().push(message);
        Ok(())
    }
}

/// Ephemeral store that can be taken down mid-test
#[derive(Default, Clone)]
pub struct FlakyStore {
    inner: MemoryStore,
    down: Arc<AtomicBool>,
}

#[allow(dead_code)]
impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    pub fn live_keys(&self) -> usize {
        self.inner.len()
    }

    fn check(&self) -> DbResult<()> {
        if self.down.load(Ordering::SeqCst) {
            return Err(DbError::Unavailable("redis connection reset".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl EphemeralStore for FlakyStore {
    async fn incr_window(&self, key: &str, window: Duration) -> DbResult<WindowCount> {
        self.check()?;
        self.inner.incr_window(key, window).await
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> DbResult<bool> {
        self.check()?;
        self.inner.set_if_absent(key, value, ttl).await
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> DbResult<()> {
        self.check()?;
        self.inner.set(key, value, ttl).await
    }

    async fn get(&self, key: &str) -> DbResult<Option<String>> {
        self.check()?;
        self.inner.get(key).await
    }

    async fn delete(&self, keys: &[&str]) -> DbResult<u64> {
        self.check()?;
        self.inner.delete(keys).await
    }

    async fn ttl(&self, key: &str) -> DbResult<Option<Duration>> {
        self.check()?;
        self.inner.ttl(key).await
    }

    async fn decrement_if_positive(&self, key: &str) -> DbResult<Option<i64>> {
        self.check()?;
        self.inner.decrement_if_positive(key).await
    }

    async fn ping(&self) -> DbResult<()> {
        self.check()?;
        self.inner.ping().await
    }
}
