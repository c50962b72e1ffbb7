//! Polygon search: POST /api/search

use crate::error::Result;
use crate::state::AppState;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use geodir_core::{ColumnSet, GeoRecord};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::Instrument;

fn default_true() -> bool {
    true
}

/// Search request body
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    /// GeoJSON Polygon, MultiPolygon or Feature. Absent or null clears the selection.
    #[serde(default)]
    pub geometry: Value,

    /// Attribute columns to return; all when absent.
    #[serde(default)]
    pub fields: Option<Vec<String>>,

    /// Include the column list in the response. Clients that already hold it send `false`.
    #[serde(default = "default_true")]
    pub include_columns: bool,
}

/// Search response body
#[derive(Debug, Serialize)]
pub struct SearchResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub columns: Option<ColumnSet>,
    pub companies: Vec<GeoRecord>,
    pub count: usize,
}

/// POST /api/search
pub async fn search(
    State(state): State<Arc<AppState>>,
    payload: std::result::Result<Json<SearchRequest>, JsonRejection>,
) -> Result<Json<SearchResponse>> {
    let Json(request) = payload?;
    let span = tracing::info_span!(
        "search",
        projection = request.fields.as_ref().map_or(0, Vec::len),
        matches = tracing::field::Empty,
    );

    async move {
        let result = state
            .engine
            .query(&request.geometry, request.fields.as_deref())
            .await?;

        tracing::Span::current().record("matches", result.matches.len());
        tracing::info!(
            scanned = result.stats.scanned,
            passed_bbox = result.stats.passed_bbox,
            matches = result.stats.result_count,
            elapsed_ms = result.stats.elapsed.as_millis() as u64,
            "search complete"
        );

        Ok(Json(SearchResponse {
            columns: result.columns.filter(|_| request.include_columns),
            count: result.matches.len(),
            companies: result.matches,
        }))
    }
    .instrument(span)
    .await
}
