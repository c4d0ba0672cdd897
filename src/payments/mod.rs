use async_trait::async_trait;

use crate::{domain::Payment, error::Result};

pub mod payos_client;
pub mod webhook;

pub use payos_client::PayOsClient;
pub use webhook::{WebhookData, WebhookPayload};

#[derive(Debug, Clone, PartialEq)]
pub struct CheckoutLink {
    pub checkout_url: String,
    pub provider_reference: Option<String>,
}

/// Outbound side of the payment provider: turning a pending payment into a
/// link or QR code the learner pays through. The inbound side is the signed
/// webhook in [`webhook`].
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    async fn create_payment_link(&self, payment: &Payment) -> Result<CheckoutLink>;
}
