//! API routes

use axum::{routing::get, Router};

use super::handlers::{self, AppState};

/// Create the status router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/status", get(handlers::status))
        .route("/metrics", get(handlers::metrics))
        .with_state(state)
}
