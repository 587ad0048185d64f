//! OTP code delivery
//!
//! Transport (email, SMS) belongs to an external collaborator. A failed
//! delivery does not undo the challenge; resending goes through the normal
//! cooldown and hourly budget.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;
use warden_types::OtpPurpose;

/// A code ready to be sent
#[derive(Clone)]
pub struct CodeMessage {
    pub recipient: String,
    pub purpose: OtpPurpose,
    pub code: String,
    pub expires_in_secs: u64,
}

impl std::fmt::Debug for CodeMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodeMessage")
            .field("purpose", &self.purpose)
            .field("expires_in_secs", &self.expires_in_secs)
            .finish_non_exhaustive()
    }
}

/// Delivery failures
#[derive(Error, Debug)]
pub enum DeliveryError {
    #[error("delivery channel closed")]
    Closed,

    #[error("delivery queue full")]
    Full,

    #[error("transport error: {0}")]
    Transport(String),
}

/// Out-of-band code transport
#[async_trait]
pub trait CodeDelivery: Send + Sync {
    async fn deliver(&self, message: CodeMessage) -> Result<(), DeliveryError>;
}

/// Hands codes to a worker over a bounded channel
#[derive(Debug, Clone)]
pub struct ChannelDelivery {
    sender: mpsc::Sender<CodeMessage>,
}

impl ChannelDelivery {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<CodeMessage>) {
        let (sender, receiver) = mpsc::channel(capacity);
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl CodeDelivery for ChannelDelivery {
    async fn deliver(&self, message: CodeMessage) -> Result<(), DeliveryError> {
        self.sender.try_send(message).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => DeliveryError::Full,
            mpsc::error::TrySendError::Closed(_) => DeliveryError::Closed,
        })
    }
}
