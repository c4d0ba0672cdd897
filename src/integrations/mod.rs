use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;
use crate::domain::{Payment, RefundRequest};
use crate::error::Result;

pub mod captcha;
pub mod course;
pub mod notifier;

#[derive(Debug, Clone)]
pub enum IntegrationEvent {
    PaymentPaid(Payment),
    /// Cancelled, failed or expired before money moved.
    PaymentClosed(Payment),
    RefundOpened(RefundRequest),
    RefundUpdated(RefundRequest),
}

impl IntegrationEvent {
    pub fn name(&self) -> &'static str {
        match self {
            IntegrationEvent::PaymentPaid(_) => "payment.paid",
            IntegrationEvent::PaymentClosed(_) => "payment.closed",
            IntegrationEvent::RefundOpened(_) => "refund.opened",
            IntegrationEvent::RefundUpdated(_) => "refund.updated",
        }
    }
}

#[async_trait]
pub trait Integration: Send + Sync {
    fn name(&self) -> &str;
    fn is_enabled(&self) -> bool;
    async fn health_check(&self) -> Result<()>;
    async fn handle_event(&self, event: &IntegrationEvent) -> Result<()>;
}

/// Fire-and-forget notification fan-out. Failures are logged, never
/// propagated to the operation that raised the event.
pub struct IntegrationManager {
    integrations: RwLock<Vec<Arc<dyn Integration>>>,
}

impl IntegrationManager {
    pub fn new() -> Self {
        Self {
            integrations: RwLock::new(Vec::new()),
        }
    }

    pub async fn register(&self, integration: Arc<dyn Integration>) {
        if integration.is_enabled() {
            tracing::info!("Registered integration: {}", integration.name());
            self.integrations.write().await.push(integration);
        }
    }

    /// Delivers the event on a background task so callers never wait on
    /// delivery. Call only after the triggering transaction has committed.
    pub fn dispatch(self: &Arc<Self>, event: IntegrationEvent) {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            manager.handle_event(event).await;
        });
    }

    pub async fn handle_event(&self, event: IntegrationEvent) {
        let integrations = self.integrations.read().await;

        for integration in integrations.iter() {
            if !integration.is_enabled() {
                continue;
            }

            match integration.handle_event(&event).await {
                Ok(_) => {
                    tracing::debug!(
                        "Integration {} handled {} successfully",
                        integration.name(),
                        event.name()
                    );
                }
                Err(e) => {
                    tracing::error!(
                        "Integration {} failed to handle {}: {:?}",
                        integration.name(),
                        event.name(),
                        e
                    );
                    // Continue processing other integrations even if one fails
                }
            }
        }
    }

    pub async fn health_check_all(&self) -> Vec<(String, Result<()>)> {
        let integrations = self.integrations.read().await;
        let mut results = Vec::new();

        for integration in integrations.iter() {
            let name = integration.name().to_string();
            let result = integration.health_check().await;
            results.push((name, result));
        }

        results
    }
}

impl Default for IntegrationManager {
    fn default() -> Self {
        Self::new()
    }
}
