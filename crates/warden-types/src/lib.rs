//! Warden Types - Shared domain types
//!
//! This crate contains domain types used across Warden crates:
//! - Principal and session identifiers
//! - Ordered roles used for authorization
//! - OTP challenge purposes
//! - Token pairs and session listings

pub mod error;
pub mod otp;
pub mod role;
pub mod session;
pub mod user;

pub use error::*;
pub use otp::*;
pub use role::*;
pub use session::*;
pub use user::*;
