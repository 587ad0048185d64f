//! Warden DB - Storage abstractions
//!
//! Two independently failing stores back the session engine:
//! - a durable record store (PostgreSQL via SQLx) holding one session record
//!   per principal and device, plus the principal table
//! - a volatile TTL key-value store (Redis) holding rate-limit counters,
//!   single-flight locks and OTP challenge state
//!
//! # Example
//!
//! ```rust,ignore
//! use warden_db::{create_pool, run_migrations, RedisStore, Repositories};
//!
//! let pool = create_pool("postgres://localhost/warden").await?;
//! run_migrations(&pool).await?;
//! let repos = Repositories::new(pool);
//! let ephemeral = RedisStore::connect("redis://localhost").await?;
//! ```

pub mod ephemeral;
pub mod error;
pub mod memory;
pub mod models;
pub mod pg;
pub mod pool;
pub mod redis_store;
pub mod repo;

pub use ephemeral::{EphemeralStore, WindowCount};
pub use error::{DbError, DbResult};
pub use memory::MemoryStore;
pub use models::*;
pub use pg::Repositories;
pub use pool::{create_pool, run_migrations, DbPool};
pub use redis_store::RedisStore;
pub use repo::*;
