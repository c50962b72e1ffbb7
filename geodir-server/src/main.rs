//! Geodir server CLI
//!
//! Run with: `cargo run -p geodir-server -- --help`

use clap::Parser;
use geodir_server::{
    telemetry::{init_logging, TelemetryConfig},
    GeodirServer, ServerConfig,
};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = ServerConfig::parse();

    let telemetry_config = TelemetryConfig::with_server_config(&config);
    init_logging(&telemetry_config);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        addr = %config.listen_addr,
        source = %config.source.display(),
        geocoding = ?config.dataset.geocoding,
        cors = config.cors_enabled,
        body_limit = config.body_limit,
        warm_snapshot = config.warm_snapshot,
        log_format = ?telemetry_config.log_format,
        "Starting geodir server"
    );

    let server = GeodirServer::new(config)?;
    server.run().await.map_err(Into::into)
}
