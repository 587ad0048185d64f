//! Storage errors

use thiserror::Error;

/// Storage errors
#[derive(Error, Debug)]
pub enum DbError {
    /// SQLx error
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// Migration failure
    #[error("migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    /// Ephemeral store error
    #[error("ephemeral store error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Store could not be reached
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Record not found
    #[error("record not found")]
    NotFound,

    /// Unique constraint violated
    #[error("conflict: {0}")]
    Conflict(String),

    /// Stored value could not be interpreted
    #[error("corrupt value at {0}")]
    Corrupt(String),
}

/// Result alias for storage operations
pub type DbResult<T> = Result<T, DbError>;

impl DbError {
    /// Map a SQLx error, turning unique violations into [`DbError::Conflict`]
    pub(crate) fn from_write(err: sqlx::Error, what: &str) -> Self {
        match &err {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                Self::Conflict(what.to_string())
            }
            _ => Self::Sqlx(err),
        }
    }
}
