use super::handlers;
use super::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Session control
        .route("/voice/session/start", post(handlers::start_session))
        .route("/voice/session/stop", post(handlers::stop_session))
        // Session queries
        .route("/voice/session/status", get(handlers::get_session_status))
        .route(
            "/voice/session/transcript",
            get(handlers::get_session_transcript),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
