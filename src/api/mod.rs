pub mod handlers;
pub mod middleware;
pub mod state;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    compression::CompressionLayer,
    cors::CorsLayer,
    trace::TraceLayer,
};

use state::AppState;

pub fn create_app(app_state: AppState) -> Router {
    Router::new()
        // Root and health endpoints
        .route("/", get(handlers::root::root))
        .route("/health", get(handlers::root::health_check))

        // API routes
        .nest("/api", api_routes(app_state.clone()))

        // Admin routes
        .nest("/admin", admin_routes(app_state.clone()))

        // Add state to the router
        .with_state(app_state)

        // Middleware
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive()) // Configure properly for production
        .layer(TraceLayer::new_for_http())
}

fn api_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .nest("/plans", plan_routes(state.clone()))
        .nest("/payments", payment_routes(state.clone()))
        .nest("/refunds", refund_routes(state))
}

fn plan_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/", post(handlers::plans::create))
        .route("/mine", get(handlers::plans::list_mine))
        .route("/:id", get(handlers::plans::get).put(handlers::plans::update))
        .route("/:id/deactivate", post(handlers::plans::deactivate))
        .route("/:id/slots", get(handlers::plans::slots))
        .route_layer(axum::middleware::from_fn_with_state(
            state,
            middleware::auth::require_auth,
        ))
}

fn payment_routes(state: AppState) -> Router<AppState> {
    Router::new()
        // Provider webhook (signature checked, no bearer token)
        .route("/webhook", post(handlers::payments::webhook))
        // Protected payment endpoints
        .merge(
            Router::new()
                .route("/checkout", post(handlers::payments::checkout))
                .route("/mine", get(handlers::payments::list_mine))
                .route("/:id", get(handlers::payments::get))
                .route("/:id/cancel", post(handlers::payments::cancel))
                .route("/:id/reject", post(handlers::payments::reject))
                .route_layer(axum::middleware::from_fn_with_state(
                    state,
                    middleware::auth::require_auth,
                )),
        )
}

fn refund_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/mine", get(handlers::refunds::list_mine))
        .route("/:id/bank-info", post(handlers::refunds::submit_bank_info))
        .route_layer(axum::middleware::from_fn_with_state(
            state,
            middleware::auth::require_auth,
        ))
}

fn admin_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/refunds", get(handlers::admin::list_refunds))
        .route("/refunds/:id/decision", post(handlers::admin::decide_refund))
        .route_layer(axum::middleware::from_fn_with_state(
            state,
            middleware::auth::require_admin,
        ))
}
