use std::{str::FromStr, sync::Arc, time::Duration};

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tutorhub::{
    api::{self, state::AppState},
    clock::SystemClock,
    config::Settings,
    integrations::{
        captcha::{CaptchaVerifier, DisabledCaptcha, HttpCaptchaVerifier},
        course::SqliteCourseGateway,
        notifier::WebhookNotifier,
        IntegrationManager,
    },
    payments::{PayOsClient, PaymentProvider},
    service::ServiceContext,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tutorhub=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let settings = Arc::new(Settings::new().unwrap_or_else(|e| {
        tracing::warn!("Failed to load config: {}. Using defaults.", e);
        Settings::default()
    }));

    tracing::info!("Starting TutorHub server on {}:{}", settings.server.host, settings.server.port);

    // Initialize database
    let connect_options = SqliteConnectOptions::from_str(&settings.database.url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5))
        .foreign_keys(true);

    let db_pool = SqlitePoolOptions::new()
        .max_connections(settings.database.max_connections)
        .connect_with(connect_options)
        .await?;

    // Run migrations
    sqlx::migrate!("./migrations")
        .run(&db_pool)
        .await?;

    // Initialize integration manager
    let integration_manager = Arc::new(IntegrationManager::new());

    if let Some(notifier) = WebhookNotifier::new(settings.integrations.notifier.clone()) {
        integration_manager.register(Arc::new(notifier)).await;
    }

    // Check integration health
    let health_results = integration_manager.health_check_all().await;
    for (name, result) in health_results {
        match result {
            Ok(_) => tracing::info!("Integration {} is healthy", name),
            Err(e) => tracing::warn!("Integration {} health check failed: {:?}", name, e),
        }
    }

    // Initialize payment provider if configured
    let provider: Option<Arc<dyn PaymentProvider>> = match PayOsClient::from_config(&settings.payment) {
        Some(client) => {
            tracing::info!("Payment provider enabled");
            Some(Arc::new(client))
        }
        None => {
            tracing::info!("Payment provider disabled, checkouts will have no payment link");
            None
        }
    };

    if settings.payment.checksum_key.is_empty() {
        tracing::warn!("payment.checksum_key is empty, every webhook will be rejected");
    }

    let captcha: Arc<dyn CaptchaVerifier> = match settings.integrations.captcha.clone() {
        Some(config) if config.enabled => Arc::new(HttpCaptchaVerifier::new(config)),
        _ => Arc::new(DisabledCaptcha),
    };

    // Create service context
    let service_context = Arc::new(ServiceContext::new(
        settings.clone(),
        db_pool.clone(),
        Arc::new(SystemClock),
        Arc::new(SqliteCourseGateway::new(db_pool.clone())),
        provider,
        integration_manager,
    ));

    // Background expiry of stale payments and slot locks
    service_context.sweeper.clone().spawn(Duration::from_secs(settings.booking.sweep_interval_secs));

    let app = api::create_app(AppState::new(service_context, captcha));

    let listener = tokio::net::TcpListener::bind(
        format!("{}:{}", settings.server.host, settings.server.port)
    ).await?;

    tracing::info!("Server listening on http://{}:{}", settings.server.host, settings.server.port);

    axum::serve(listener, app).await?;

    Ok(())
}
