use serde::Deserialize;
use config::{Config, ConfigError, Environment, File};

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    #[serde(default)]
    pub payment: PaymentConfig,
    #[serde(default)]
    pub booking: BookingConfig,
    #[serde(default)]
    pub admission: AdmissionConfig,
    #[serde(default)]
    pub integrations: IntegrationConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub base_url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
}

/// Payment provider credentials. `checksum_key` signs both outbound
/// payment-link requests and inbound webhooks.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct PaymentConfig {
    #[serde(default)]
    pub enabled: bool,
    pub endpoint: Option<String>,
    pub client_id: Option<String>,
    pub api_key: Option<String>,
    #[serde(default)]
    pub checksum_key: String,
    pub return_url: Option<String>,
    pub cancel_url: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BookingConfig {
    /// Lifetime of a slot reservation and of the pending payment holding it.
    pub reservation_ttl_minutes: i64,
    pub max_working_days: u32,
    pub lock_timeout_ms: u64,
    pub sweep_interval_secs: u64,
}

impl Default for BookingConfig {
    fn default() -> Self {
        Self {
            reservation_ttl_minutes: 15,
            max_working_days: 4,
            lock_timeout_ms: 5_000,
            sweep_interval_secs: 30,
        }
    }
}

/// Backpressure against checkout loops: a user with more than
/// `cancellation_threshold` cancelled or expired payments on one target
/// inside the trailing window cannot start another.
#[derive(Debug, Deserialize, Clone)]
pub struct AdmissionConfig {
    pub cancellation_threshold: i64,
    pub window_minutes: i64,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            cancellation_threshold: 5,
            window_minutes: 60,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct IntegrationConfig {
    pub notifier: Option<NotifierConfig>,
    pub captcha: Option<CaptchaConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct NotifierConfig {
    pub enabled: bool,
    pub webhook_url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CaptchaConfig {
    pub enabled: bool,
    pub verify_url: String,
    pub secret: String,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let config = Config::builder()
            // Start with default values
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 8080)?
            .set_default("server.base_url", "http://localhost:8080")?
            .set_default("database.url", "sqlite://tutorhub.db")?
            .set_default("database.max_connections", 10)?
            .set_default("payment.enabled", false)?
            .set_default("booking.reservation_ttl_minutes", 15)?
            .set_default("booking.max_working_days", 4)?
            .set_default("booking.lock_timeout_ms", 5_000)?
            .set_default("booking.sweep_interval_secs", 30)?
            .set_default("admission.cancellation_threshold", 5)?
            .set_default("admission.window_minutes", 60)?

            // Add config file if it exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))

            // Add environment variables (with TUTORHUB__ prefix, double underscore separates levels)
            .add_source(Environment::with_prefix("TUTORHUB").separator("__"))

            .build()?;

        config.try_deserialize()
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
                base_url: "http://localhost:8080".to_string(),
            },
            database: DatabaseConfig {
                url: "sqlite://tutorhub.db".to_string(),
                max_connections: 10,
            },
            auth: AuthConfig {
                jwt_secret: "change-me-in-production".to_string(),
            },
            payment: PaymentConfig::default(),
            booking: BookingConfig::default(),
            admission: AdmissionConfig::default(),
            integrations: IntegrationConfig {
                notifier: None,
                captcha: None,
            },
        }
    }
}
