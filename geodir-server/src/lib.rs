//! Geodir HTTP Server
//!
//! Serves polygon searches over an in-memory snapshot of a geocoded
//! establishment file. The snapshot is built once per process, on the
//! first query or at startup with `--warm-snapshot`.
//!
//! # Endpoints
//!
//! - `GET /health`
//! - `GET /api/stats`
//! - `POST /api/search`
//!
//! # Example
//!
//! ```ignore
//! use geodir_server::{GeodirServer, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = ServerConfig::default();
//!     let server = GeodirServer::new(config).unwrap();
//!     server.run().await.unwrap();
//! }
//! ```

pub mod config;
pub mod error;
pub mod routes;
pub mod state;
pub mod telemetry;

pub use config::ServerConfig;
pub use error::{Result, ServerError};
pub use state::AppState;
pub use telemetry::{init_logging, TelemetryConfig};

use axum::Router;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};

/// Geodir HTTP Server
pub struct GeodirServer {
    /// Application state
    state: Arc<AppState>,
    /// Configured router
    router: Router,
}

impl GeodirServer {
    /// Create a new server with the given configuration
    pub fn new(config: ServerConfig) -> std::result::Result<Self, geodir_core::CoreError> {
        let telemetry_config = TelemetryConfig::with_server_config(&config);
        let state = Arc::new(AppState::new(config, telemetry_config)?);
        Ok(Self::with_state(state))
    }

    /// Create a server over prepared state
    pub fn with_state(state: Arc<AppState>) -> Self {
        let router = routes::build_router(state.clone());
        Self { state, router }
    }

    /// Get a reference to the application state
    pub fn state(&self) -> &Arc<AppState> {
        &self.state
    }

    /// Get the router for testing
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server
    pub async fn run(self) -> std::result::Result<(), std::io::Error> {
        let addr = self.state.config.listen_addr;
        let listener = TcpListener::bind(addr).await?;

        if self.state.config.warm_snapshot {
            // A failed warm-up leaves the cache empty; the first query retries.
            if let Err(e) = self.state.cache().get().await {
                warn!(error = %e, "snapshot warm-up failed");
            }
        }

        info!(
            addr = %addr,
            source = %self.state.config.source.display(),
            snapshot_built = self.state.cache().is_built(),
            "Geodir server starting"
        );

        axum::serve(listener, self.router).await
    }
}
