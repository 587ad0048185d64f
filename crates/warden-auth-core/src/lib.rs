//! Warden Auth Core - credential and session lifecycle engine
//!
//! Issues, rotates, binds and revokes tokens across the devices of each
//! principal, runs OTP challenges, and guards privileged requests with rate
//! limits and single-flight locks. Durable state goes through the
//! `warden-db` repositories; volatile state through an `EphemeralStore`.

pub mod config;
pub mod crypto;
pub mod delivery;
pub mod error;
pub mod notify;
pub mod otp;
pub mod rate_limit;
pub mod service;
pub mod session;
pub mod single_flight;
pub mod token;

pub use config::*;
pub use delivery::{ChannelDelivery, CodeDelivery, CodeMessage, DeliveryError};
pub use error::*;
pub use notify::{Audience, BroadcastNotifier, NoopNotifier, Notifier, SessionEvent};
pub use otp::{IssuedOtp, OtpManager};
pub use rate_limit::{IdentityMode, RateDecision, RateLimitRule, RateLimiter, RequestIdentity};
pub use service::*;
pub use session::*;
pub use single_flight::{FlightPermit, SingleFlightGuard};
pub use token::{AccessClaims, AccessGrant, IssuedToken, RefreshClaims, TokenError, TokenIssuer};
