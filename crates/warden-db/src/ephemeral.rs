//! Ephemeral key-value store interface
//!
//! Rate-limit counters, single-flight locks and OTP challenge state live in a
//! shared TTL store. Implementations must make every method below atomic with
//! respect to concurrent callers on the same key.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::DbResult;

/// Result of incrementing a fixed-window counter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowCount {
    /// Counter value after the increment
    pub count: u64,
    /// Time until the window resets
    pub resets_in: Duration,
}

/// TTL-capable key-value store
#[async_trait]
pub trait EphemeralStore: Send + Sync {
    /// Increment `key`, setting its expiry to `window` only when the
    /// increment created it.
    async fn incr_window(&self, key: &str, window: Duration) -> DbResult<WindowCount>;

    /// Set `key` only if it does not exist. Returns `true` if the value was set.
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> DbResult<bool>;

    /// Set `key` unconditionally with an expiry
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> DbResult<()>;

    /// Read `key`
    async fn get(&self, key: &str) -> DbResult<Option<String>>;

    /// Delete keys, returning how many existed
    async fn delete(&self, keys: &[&str]) -> DbResult<u64>;

    /// Remaining time to live of `key`, `None` if it does not exist
    async fn ttl(&self, key: &str) -> DbResult<Option<Duration>>;

    /// Decrement an integer counter only if it is currently above zero.
    ///
    /// Returns the new value, or `None` when the key is missing or already
    /// at zero. The check and the decrement happen as one operation and the
    /// key keeps its expiry.
    async fn decrement_if_positive(&self, key: &str) -> DbResult<Option<i64>>;

    /// Connectivity check
    async fn ping(&self) -> DbResult<()>;
}
