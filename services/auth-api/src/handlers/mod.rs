//! HTTP handlers

mod health;
mod sessions;

pub use health::{health, ready};
pub use sessions::{list_sessions, logout, logout_all, refresh, revoke_session};
