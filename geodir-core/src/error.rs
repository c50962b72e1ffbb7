//! Error types for decoding and dataset configuration.

use thiserror::Error;

/// Errors from the shared record layer.
#[derive(Debug, Error)]
pub enum CoreError {
    /// IO error while reading the source stream.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV reader error that is not a per-row problem (e.g. IO underneath the reader).
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// The header row does not name a column the dataset configuration requires.
    #[error("Missing column in header: {0}")]
    MissingColumn(String),

    /// The source has no header row.
    #[error("Source is empty: no header row")]
    EmptySource,

    /// Invalid dataset configuration.
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
