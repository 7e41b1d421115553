use super::handlers;
use super::state::AppState;
use axum::{
    routing::{get, post, put},
    Router,
};
use tower_http::trace::TraceLayer;

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Session control
        .route("/session/start", post(handlers::start_session))
        .route("/session/stop", post(handlers::stop_session))
        .route("/session/language", put(handlers::set_language))
        // Session queries
        .route("/session/status", get(handlers::get_status))
        .route("/session/transcript", get(handlers::get_transcript))
        .route(
            "/session/translation/audio",
            get(handlers::download_translation),
        )
        // Payment callbacks
        .route("/payment/pending", get(handlers::get_pending_payment))
        .route("/payment/complete", post(handlers::complete_payment))
        .route("/payment/cancel", post(handlers::cancel_payment))
        .route("/payment/retry", post(handlers::retry_payment))
        // Add tracing middleware for request logging
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
