//! Server configuration

use clap::{ArgAction, Parser};
use geodir_core::DatasetArgs;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Server configuration, from CLI flags with environment fallbacks.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "geodir-server",
    about = "Polygon search over a geocoded establishment dataset",
    version
)]
pub struct ServerConfig {
    /// Address to listen on
    #[arg(long, env = "GEODIR_LISTEN_ADDR", default_value = "0.0.0.0:8080")]
    pub listen_addr: SocketAddr,

    /// Delimited source file the snapshot is built from
    #[arg(long, env = "GEODIR_SOURCE")]
    pub source: PathBuf,

    /// Enable CORS (Cross-Origin Resource Sharing)
    #[arg(long, env = "GEODIR_CORS_ENABLED", default_value = "true", action = ArgAction::Set)]
    pub cors_enabled: bool,

    /// Request body size limit in bytes (default 10MB)
    #[arg(long, env = "GEODIR_BODY_LIMIT", default_value = "10485760")]
    pub body_limit: usize,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "GEODIR_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Build the snapshot at startup instead of on the first query
    #[arg(long, env = "GEODIR_WARM_SNAPSHOT")]
    pub warm_snapshot: bool,

    #[command(flatten)]
    pub dataset: DatasetArgs,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            source: PathBuf::from("StockEtablissement.csv"),
            cors_enabled: true,
            body_limit: 10 * 1024 * 1024, // 10MB
            log_level: "info".to_string(),
            warm_snapshot: false,
            dataset: DatasetArgs::default(),
        }
    }
}
