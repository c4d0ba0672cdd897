use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{
    config::PaymentConfig,
    domain::Payment,
    error::{AppError, Result},
    payments::{webhook::sign, CheckoutLink, PaymentProvider},
};

/// Provider limit on the transfer description shown to the payer.
const MAX_DESCRIPTION_LEN: usize = 25;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateLinkRequest<'a> {
    order_code: i64,
    amount: i64,
    description: String,
    return_url: &'a str,
    cancel_url: &'a str,
    expired_at: i64,
    signature: String,
}

#[derive(Debug, Deserialize)]
struct ProviderResponse<T> {
    code: String,
    desc: String,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateLinkData {
    checkout_url: String,
    #[serde(default)]
    payment_link_id: Option<String>,
}

/// HTTP client for a PayOS-style bank-transfer provider.
pub struct PayOsClient {
    client: reqwest::Client,
    endpoint: String,
    client_id: String,
    api_key: String,
    checksum_key: String,
    return_url: String,
    cancel_url: String,
}

impl PayOsClient {
    /// Returns `None` unless the provider is enabled and fully configured.
    pub fn from_config(config: &PaymentConfig) -> Option<Self> {
        if !config.enabled {
            return None;
        }

        match (
            config.endpoint.clone(),
            config.client_id.clone(),
            config.api_key.clone(),
            config.return_url.clone(),
            config.cancel_url.clone(),
        ) {
            (Some(endpoint), Some(client_id), Some(api_key), Some(return_url), Some(cancel_url))
                if !config.checksum_key.is_empty() =>
            {
                Some(Self {
                    client: reqwest::Client::new(),
                    endpoint,
                    client_id,
                    api_key,
                    checksum_key: config.checksum_key.clone(),
                    return_url,
                    cancel_url,
                })
            }
            _ => {
                tracing::warn!("Payment provider enabled but missing configuration");
                None
            }
        }
    }

    fn description(payment: &Payment) -> String {
        let mut description = format!("TH{}", payment.order_code);
        description.truncate(MAX_DESCRIPTION_LEN);
        description
    }

    /// The provider signs the five link fields in alphabetical order.
    fn link_signature(&self, amount: i64, description: &str, order_code: i64) -> Result<String> {
        let message = format!(
            "amount={}&cancelUrl={}&description={}&orderCode={}&returnUrl={}",
            amount, self.cancel_url, description, order_code, self.return_url
        );
        sign(&self.checksum_key, &message)
    }
}

#[async_trait]
impl PaymentProvider for PayOsClient {
    async fn create_payment_link(&self, payment: &Payment) -> Result<CheckoutLink> {
        let description = Self::description(payment);
        let signature = self.link_signature(payment.amount, &description, payment.order_code)?;

        let request = CreateLinkRequest {
            order_code: payment.order_code,
            amount: payment.amount,
            description,
            return_url: &self.return_url,
            cancel_url: &self.cancel_url,
            expired_at: payment.expires_at.timestamp(),
            signature,
        };

        let response: ProviderResponse<CreateLinkData> = self.client
            .post(format!("{}/v2/payment-requests", self.endpoint.trim_end_matches('/')))
            .header("x-client-id", &self.client_id)
            .header("x-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::External(format!("Payment provider error: {}", e)))?
            .json()
            .await
            .map_err(|e| AppError::External(format!("Payment provider returned bad body: {}", e)))?;

        if response.code != "00" {
            return Err(AppError::External(format!(
                "Payment provider rejected order {}: {} ({})",
                payment.order_code, response.desc, response.code
            )));
        }

        let data = response.data
            .ok_or_else(|| AppError::External("No checkout URL returned".to_string()))?;

        Ok(CheckoutLink {
            checkout_url: data.checkout_url,
            provider_reference: data.payment_link_id,
        })
    }
}
