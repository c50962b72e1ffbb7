//! HTTP route handlers and router configuration

mod admin;
mod search;

pub use admin::{HealthResponse, StatsResponse};
pub use search::{SearchRequest, SearchResponse};

use crate::state::AppState;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Build the main application router
pub fn build_router(state: Arc<AppState>) -> Router {
    let mut router = Router::new()
        // Health check
        .route("/health", get(admin::health))
        // Snapshot diagnostics
        .route("/api/stats", get(admin::stats))
        // Polygon search
        .route("/api/search", post(search::search))
        .with_state(state.clone());

    // Add middleware
    router = router
        .layer(DefaultBodyLimit::max(state.config.body_limit))
        .layer(TraceLayer::new_for_http());

    // Add CORS if enabled
    if state.config.cors_enabled {
        router = router.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );
    }

    router
}
