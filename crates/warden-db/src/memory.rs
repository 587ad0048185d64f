//! In-process ephemeral store
//!
//! Backs tests and single-node development. Expiry uses the tokio clock, so
//! tests can pause and advance time deterministically. Each operation holds
//! the map shard lock for its key, which makes it atomic per key.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::time::Instant;

use crate::ephemeral::{EphemeralStore, WindowCount};
use crate::error::{DbError, DbResult};

#[derive(Debug, Clone)]
struct Slot {
    value: String,
    expires_at: Instant,
}

impl Slot {
    fn new(value: impl Into<String>, ttl: Duration) -> Self {
        Self {
            value: value.into(),
            expires_at: Instant::now() + ttl,
        }
    }

    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }

    fn remaining(&self, now: Instant) -> Duration {
        self.expires_at.saturating_duration_since(now)
    }
}

/// In-memory ephemeral store
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    slots: Arc<DashMap<String, Slot>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live keys
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.slots.iter().filter(|s| s.is_live(now)).count()
    }

    /// Whether the store holds no live keys
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every expired slot
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let before = self.slots.len();
        self.slots.retain(|_, slot| slot.is_live(now));
        before.saturating_sub(self.slots.len())
    }

    /// Live slot for `key`; an expired one is evicted on the way
    fn live(&self, key: &str, now: Instant) -> Option<Slot> {
        if let Some(slot) = self.slots.get(key) {
            if slot.is_live(now) {
                return Some(slot.clone());
            }
        }
        self.slots.remove_if(key, |_, slot| !slot.is_live(now));
        None
    }

    fn parse_counter(key: &str, value: &str) -> DbResult<i64> {
        value.parse::<i64>().map_err(|_| {
            tracing::error!(key, "Non-integer value in counter slot");
            DbError::Corrupt(key.to_string())
        })
    }
}

#[async_trait]
impl EphemeralStore for MemoryStore {
    async fn incr_window(&self, key: &str, window: Duration) -> DbResult<WindowCount> {
        let now = Instant::now();
        let mut slot = self
            .slots
            .entry(key.to_string())
            .or_insert_with(|| Slot::new("0", window));
        if !slot.is_live(now) {
            *slot = Slot::new("0", window);
        }

        let count = Self::parse_counter(key, &slot.value)? + 1;
        slot.value = count.to_string();

        Ok(WindowCount {
            count: count.max(0) as u64,
            resets_in: slot.remaining(now),
        })
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> DbResult<bool> {
        let now = Instant::now();
        match self.slots.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_live(now) {
                    return Ok(false);
                }
                occupied.insert(Slot::new(value, ttl));
                Ok(true)
            }
            Entry::Vacant(vacant) => {
                vacant.insert(Slot::new(value, ttl));
                Ok(true)
            }
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> DbResult<()> {
        self.slots.insert(key.to_string(), Slot::new(value, ttl));
        Ok(())
    }

    async fn get(&self, key: &str) -> DbResult<Option<String>> {
        Ok(self.live(key, Instant::now()).map(|s| s.value))
    }

    async fn delete(&self, keys: &[&str]) -> DbResult<u64> {
        let now = Instant::now();
        let mut removed = 0;
        for key in keys {
            if let Some((_, slot)) = self.slots.remove(*key) {
                if slot.is_live(now) {
                    removed += 1;
                }
            }
        }
        Ok(removed)
    }

    async fn ttl(&self, key: &str) -> DbResult<Option<Duration>> {
        let now = Instant::now();
        Ok(self.live(key, now).map(|s| s.remaining(now)))
    }

    async fn decrement_if_positive(&self, key: &str) -> DbResult<Option<i64>> {
        let now = Instant::now();
        let Some(mut slot) = self.slots.get_mut(key) else {
            return Ok(None);
        };
        if !slot.is_live(now) {
            return Ok(None);
        }

        let current = Self::parse_counter(key, &slot.value)?;
        if current <= 0 {
            return Ok(None);
        }
        slot.value = (current - 1).to_string();
        Ok(Some(current - 1))
    }

    async fn ping(&self) -> DbResult<()> {
        // Opportunistic cleanup for long-running local use
        let evicted = self.sweep();
        if evicted > 0 {
            tracing::debug!(evicted, "Expired ephemeral keys evicted");
        }
        Ok(())
    }
}
