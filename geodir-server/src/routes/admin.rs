//! Admin endpoints: /health, /api/stats

use crate::state::AppState;
use axum::extract::State;
use axum::Json;
use serde::Serialize;
use std::sync::Arc;

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

/// Health check endpoint
///
/// GET /health
pub async fn health() -> Json<HealthResponse> {
    tracing::debug!("health check requested");
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Snapshot statistics response
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsResponse {
    /// Server uptime in seconds
    pub uptime_secs: u64,
    /// Whether the snapshot has been built yet
    pub snapshot_built: bool,
    /// Records in the snapshot
    pub records: usize,
    /// Rows left out because their coordinates could not be resolved
    pub excluded: u64,
    /// Rows skipped as malformed
    pub malformed: u64,
    /// Attribute columns
    pub columns: usize,
    /// Server version
    pub version: &'static str,
}

/// Snapshot statistics endpoint
///
/// GET /api/stats
///
/// Never triggers a snapshot build; counts are zero until the first query.
pub async fn stats(State(state): State<Arc<AppState>>) -> Json<StatsResponse> {
    let snapshot = state.cache().peek();
    Json(StatsResponse {
        uptime_secs: state.uptime_secs(),
        snapshot_built: snapshot.is_some(),
        records: snapshot.as_ref().map_or(0, |s| s.len()),
        excluded: snapshot.as_ref().map_or(0, |s| s.excluded),
        malformed: snapshot.as_ref().map_or(0, |s| s.malformed),
        columns: snapshot.as_ref().map_or(0, |s| s.columns.len()),
        version: env!("CARGO_PKG_VERSION"),
    })
}
