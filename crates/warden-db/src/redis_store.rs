//! Redis-backed ephemeral store
//!
//! Atomic read-modify-write primitives run as Lua scripts so Redis executes
//! them without interleaving other clients.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, RedisError, Script};

use crate::ephemeral::{EphemeralStore, WindowCount};
use crate::error::{DbError, DbResult};

const INCR_WINDOW_LUA: &str = r#"
local count = redis.call('INCR', KEYS[1])
local ttl = redis.call('PTTL', KEYS[1])
if count == 1 or ttl == -1 then
    redis.call('PEXPIRE', KEYS[1], ARGV[1])
    ttl = tonumber(ARGV[1])
end
return {count, ttl}
"#;

const DECR_IF_POSITIVE_LUA: &str = r#"
local value = redis.call('GET', KEYS[1])
if not value then
    return -1
end
local n = tonumber(value)
if not n or n <= 0 then
    return -1
end
return redis.call('DECR', KEYS[1])
"#;

/// Redis ephemeral store
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
    incr_window: Script,
    decr_if_positive: Script,
}

impl RedisStore {
    /// Connect to Redis
    pub async fn connect(redis_url: &str) -> DbResult<Self> {
        let client = redis::Client::open(redis_url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self::from_connection(conn))
    }

    /// Wrap an existing connection manager
    pub fn from_connection(conn: ConnectionManager) -> Self {
        Self {
            conn,
            incr_window: Script::new(INCR_WINDOW_LUA),
            decr_if_positive: Script::new(DECR_IF_POSITIVE_LUA),
        }
    }
}

/// Connection-level failures become [`DbError::Unavailable`] so callers can
/// tell an outage from a bad reply.
fn command_failed(operation: &'static str, err: RedisError) -> DbError {
    let unreachable = err.is_io_error()
        || err.is_connection_refusal()
        || err.is_connection_dropped()
        || err.is_timeout();
    if unreachable {
        tracing::warn!(operation, error = %err, "Redis unreachable");
        DbError::Unavailable(err.to_string())
    } else {
        tracing::error!(operation, error = %err, "Redis command failed");
        DbError::Redis(err)
    }
}

fn millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

#[async_trait]
impl EphemeralStore for RedisStore {
    async fn incr_window(&self, key: &str, window: Duration) -> DbResult<WindowCount> {
        let mut conn = self.conn.clone();
        let (count, ttl_ms): (i64, i64) = self
            .incr_window
            .key(key)
            .arg(millis(window))
            .invoke_async(&mut conn)
            .await
            .map_err(|e| command_failed("incr_window", e))?;

        Ok(WindowCount {
            count: count.max(0) as u64,
            resets_in: Duration::from_millis(ttl_ms.max(0) as u64),
        })
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> DbResult<bool> {
        let mut conn = self.conn.clone();
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(millis(ttl))
            .query_async(&mut conn)
            .await
            .map_err(|e| command_failed("set_if_absent", e))?;

        Ok(reply.is_some())
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> DbResult<()> {
        let mut conn = self.conn.clone();
        redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("PX")
            .arg(millis(ttl))
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(|e| command_failed("set", e))?;

        Ok(())
    }

    async fn get(&self, key: &str) -> DbResult<Option<String>> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn
            .get(key)
            .await
            .map_err(|e| command_failed("get", e))?;
        Ok(value)
    }

    async fn delete(&self, keys: &[&str]) -> DbResult<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn.clone();
        let removed: u64 = redis::cmd("DEL")
            .arg(keys)
            .query_async(&mut conn)
            .await
            .map_err(|e| command_failed("delete", e))?;
        Ok(removed)
    }

    async fn ttl(&self, key: &str) -> DbResult<Option<Duration>> {
        let mut conn = self.conn.clone();
        let ttl_ms: i64 = redis::cmd("PTTL")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| command_failed("ttl", e))?;
        Ok(match ttl_ms {
            -2 => None,
            ms if ms < 0 => Some(Duration::ZERO),
            ms => Some(Duration::from_millis(ms as u64)),
        })
    }

    async fn decrement_if_positive(&self, key: &str) -> DbResult<Option<i64>> {
        let mut conn = self.conn.clone();
        let value: i64 = self
            .decr_if_positive
            .key(key)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| command_failed("decrement_if_positive", e))?;

        Ok((value >= 0).then_some(value))
    }

    async fn ping(&self) -> DbResult<()> {
        let mut conn = self.conn.clone();
        redis::cmd("PING")
            .query_async::<_, String>(&mut conn)
            .await
            .map_err(|e| command_failed("ping", e))?;
        Ok(())
    }
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore").finish_non_exhaustive()
    }
}
