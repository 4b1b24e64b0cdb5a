// Delivery capability - the outbound transport boundary

use async_trait::async_trait;
use tracing::info;

use crate::error::DeliveryError;

/// Outbound message transport, supplied by the host application (SMTP,
/// webhook, whatever). The engine only cares that a send either succeeds or
/// fails.
#[async_trait]
pub trait Delivery: Send + Sync {
    async fn send(&self, recipient: &str, subject: &str, body: &str)
    -> Result<(), DeliveryError>;
}

/// Default transport: writes the message to the log instead of sending it.
/// Useful for development hosts that have no mail transport wired up yet.
#[derive(Debug, Clone, Default)]
pub struct LogDelivery;

impl LogDelivery {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Delivery for LogDelivery {
    async fn send(
        &self,
        recipient: &str,
        subject: &str,
        body: &str,
    ) -> Result<(), DeliveryError> {
        info!(
            "Notification to {}: {} ({} bytes)",
            recipient,
            subject,
            body.len()
        );
        Ok(())
    }
}
