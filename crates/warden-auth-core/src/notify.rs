//! Session event notifications
//!
//! Fire-and-forget: emitting never blocks or fails the operation that
//! triggered it. The real-time fan-out to connected clients lives behind the
//! [`Notifier`] trait.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use warden_types::UserId;

/// Event names understood by the real-time collaborator
pub mod events {
    pub const NEW_SESSION: &str = "session:new";
    pub const FORCED_LOGOUT: &str = "session:forced_logout";
    pub const LIST_CHANGED: &str = "session:list_changed";
}

/// Who should receive an event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum Audience {
    /// Every live connection of one principal
    Principal(UserId),
    /// A named broadcast group
    Group(String),
}

/// A session lifecycle event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionEvent {
    pub audience: Audience,
    pub name: String,
    pub payload: serde_json::Value,
    pub emitted_at: DateTime<Utc>,
}

impl SessionEvent {
    pub fn new(audience: Audience, name: impl Into<String>) -> Self {
        Self {
            audience,
            name: name.into(),
            payload: serde_json::Value::Object(Default::default()),
            emitted_at: Utc::now(),
        }
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }
}

/// Best-effort event sink
pub trait Notifier: Send + Sync {
    fn notify(&self, event: SessionEvent);
}

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 256;

/// In-process fan-out over a `tokio::sync::broadcast` channel
#[derive(Debug, Clone)]
pub struct BroadcastNotifier {
    sender: broadcast::Sender<SessionEvent>,
}

impl BroadcastNotifier {
    /// Slow receivers past `capacity` observe `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.sender.subscribe()
    }
}

impl Default for BroadcastNotifier {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl Notifier for BroadcastNotifier {
    fn notify(&self, event: SessionEvent) {
        // No receivers is fine.
        let _ = self.sender.send(event);
    }
}

/// Discards every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn notify(&self, _event: SessionEvent) {}
}
