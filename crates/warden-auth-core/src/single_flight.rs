//! Single-flight guard: at most one in-flight privileged operation per actor

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use warden_db::EphemeralStore;

use crate::AuthError;

/// Proof that the lock for an actor is held
#[derive(Debug)]
#[must_use = "release the permit once the guarded operation has finished"]
pub struct FlightPermit {
    key: String,
}

/// Short-TTL lock keyed by actor identity
pub struct SingleFlightGuard<E> {
    store: Arc<E>,
    ttl: Duration,
}

impl<E: EphemeralStore> SingleFlightGuard<E> {
    pub fn new(store: Arc<E>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// Take the lock for `actor`, failing if another request holds it
    pub async fn acquire(&self, actor: &str) -> Result<FlightPermit, AuthError> {
        let key = lock_key(actor);
        if self.store.set_if_absent(&key, "1", self.ttl).await? {
            Ok(FlightPermit { key })
        } else {
            tracing::debug!("Request already in flight for actor");
            Err(AuthError::ConcurrentRequestInFlight)
        }
    }

    /// Drop the lock. Unconditional; the TTL covers a skipped release.
    pub async fn release(&self, permit: FlightPermit) -> Result<(), AuthError> {
        self.store.delete(&[permit.key.as_str()]).await?;
        Ok(())
    }

    /// Run `operation` under the lock for `actor`, releasing it whether the
    /// operation succeeds or fails.
    pub async fn run<T, F>(&self, actor: &str, operation: F) -> Result<T, AuthError>
    where
        F: Future<Output = Result<T, AuthError>>,
    {
        let permit = self.acquire(actor).await?;
        let outcome = operation.await;
        if let Err(e) = self.release(permit).await {
            // Lock expires on its own; the operation's outcome wins.
            tracing::warn!("Failed to release single-flight lock: {}", e);
        }
        outcome
    }
}

impl<E> Clone for SingleFlightGuard<E> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            ttl: self.ttl,
        }
    }
}

fn lock_key(actor: &str) -> String {
    format!("lock:{actor}")
}
