use async_trait::async_trait;
use serde::Deserialize;

use crate::{
    config::CaptchaConfig,
    error::{AppError, Result},
};

/// Anti-automation check run on checkout requests before any booking work.
#[async_trait]
pub trait CaptchaVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<bool>;
}

/// Accepts everything; used when no verifier is configured.
pub struct DisabledCaptcha;

#[async_trait]
impl CaptchaVerifier for DisabledCaptcha {
    async fn verify(&self, _token: &str) -> Result<bool> {
        Ok(true)
    }
}

#[derive(Debug, Deserialize)]
struct SiteVerifyResponse {
    success: bool,
    #[serde(default, rename = "error-codes")]
    error_codes: Vec<String>,
}

/// Client for the `siteverify` endpoint shape shared by reCAPTCHA and
/// Turnstile.
pub struct HttpCaptchaVerifier {
    config: CaptchaConfig,
    client: reqwest::Client,
}

impl HttpCaptchaVerifier {
    pub fn new(config: CaptchaConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl CaptchaVerifier for HttpCaptchaVerifier {
    async fn verify(&self, token: &str) -> Result<bool> {
        if token.is_empty() {
            return Ok(false);
        }

        let response: SiteVerifyResponse = self.client
            .post(&self.config.verify_url)
            .form(&[("secret", self.config.secret.as_str()), ("response", token)])
            .send()
            .await
            .map_err(|e| AppError::External(format!("Captcha verify failed: {}", e)))?
            .json()
            .await
            .map_err(|e| AppError::External(format!("Captcha verify returned bad body: {}", e)))?;

        if !response.success {
            tracing::debug!("Captcha rejected: {:?}", response.error_codes);
        }

        Ok(response.success)
    }
}
