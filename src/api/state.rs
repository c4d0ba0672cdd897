use std::sync::Arc;

use crate::{
    auth::JwtVerifier,
    config::Settings,
    integrations::captcha::CaptchaVerifier,
    service::ServiceContext,
};

#[derive(Clone)]
pub struct AppState {
    pub service_context: Arc<ServiceContext>,
    pub jwt: Arc<JwtVerifier>,
    pub captcha: Arc<dyn CaptchaVerifier>,
    pub settings: Arc<Settings>,
}

impl AppState {
    pub fn new(
        service_context: Arc<ServiceContext>,
        captcha: Arc<dyn CaptchaVerifier>,
    ) -> Self {
        let settings = service_context.settings.clone();
        let jwt = Arc::new(JwtVerifier::new(&settings.auth.jwt_secret));

        Self {
            service_context,
            jwt,
            captcha,
            settings,
        }
    }
}
