//! Application state management
//!
//! One [`AppState`] is shared by all handlers. It owns the query engine, and
//! through it the process snapshot cache; handlers never reach the snapshot
//! any other way.

use crate::config::ServerConfig;
use crate::telemetry::TelemetryConfig;
use geodir_spatial::{CsvSnapshotSource, PolygonQueryEngine, SnapshotCache, SnapshotSource};
use std::sync::Arc;
use std::time::Instant;

/// Shared application state
pub struct AppState {
    /// Server configuration
    pub config: ServerConfig,

    /// Telemetry configuration
    pub telemetry_config: TelemetryConfig,

    /// Polygon query engine over the shared snapshot
    pub engine: PolygonQueryEngine,

    /// Server start time
    pub start_time: Instant,
}

impl AppState {
    /// Create state reading the snapshot from `config.source`.
    pub fn new(
        config: ServerConfig,
        telemetry_config: TelemetryConfig,
    ) -> Result<Self, geodir_core::CoreError> {
        let dataset = config.dataset.to_config()?;
        let source = Arc::new(CsvSnapshotSource::new(config.source.clone(), dataset));
        Ok(Self::with_source(config, telemetry_config, source))
    }

    /// Create state over an explicit snapshot source.
    pub fn with_source(
        config: ServerConfig,
        telemetry_config: TelemetryConfig,
        source: Arc<dyn SnapshotSource>,
    ) -> Self {
        let cache = Arc::new(SnapshotCache::new(source));
        Self {
            config,
            telemetry_config,
            engine: PolygonQueryEngine::new(cache),
            start_time: Instant::now(),
        }
    }

    pub fn cache(&self) -> &Arc<SnapshotCache> {
        self.engine.cache()
    }

    /// Get server uptime in seconds
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
