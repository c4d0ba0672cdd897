use async_trait::async_trait;
use serde_json::json;

use crate::{
    config::NotifierConfig,
    error::{AppError, Result},
    integrations::{Integration, IntegrationEvent},
};

/// Posts booking and refund events as JSON to a configured URL, where the
/// notification service turns them into e-mails and in-app messages.
pub struct WebhookNotifier {
    name: String,
    config: NotifierConfig,
    client: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new(config: Option<NotifierConfig>) -> Option<Self> {
        config.and_then(|cfg| {
            if cfg.enabled {
                Some(Self {
                    name: "WebhookNotifier".to_string(),
                    config: cfg,
                    client: reqwest::Client::new(),
                })
            } else {
                None
            }
        })
    }

    fn body(event: &IntegrationEvent) -> serde_json::Value {
        match event {
            IntegrationEvent::PaymentPaid(payment) | IntegrationEvent::PaymentClosed(payment) => json!({
                "event": event.name(),
                "recipient_id": payment.user_id,
                "tutor_id": payment.tutor_id,
                "payment_id": payment.id,
                "order_code": payment.order_code,
                "status": payment.status,
                "amount": payment.amount,
            }),
            IntegrationEvent::RefundOpened(refund) | IntegrationEvent::RefundUpdated(refund) => json!({
                "event": event.name(),
                "recipient_id": refund.user_id,
                "tutor_id": refund.tutor_id,
                "refund_id": refund.id,
                "payment_id": refund.payment_id,
                "status": refund.status,
                "amount": refund.refund_amount,
            }),
        }
    }
}

#[async_trait]
impl Integration for WebhookNotifier {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    async fn health_check(&self) -> Result<()> {
        if self.config.webhook_url.is_empty() {
            return Err(AppError::Integration("Notifier webhook URL not configured".to_string()));
        }
        Ok(())
    }

    async fn handle_event(&self, event: &IntegrationEvent) -> Result<()> {
        let response = self.client
            .post(&self.config.webhook_url)
            .json(&Self::body(event))
            .send()
            .await
            .map_err(|e| AppError::Integration(format!("Notifier request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(AppError::Integration(format!(
                "Notifier returned {}",
                response.status()
            )));
        }

        Ok(())
    }
}
