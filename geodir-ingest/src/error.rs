//! Loader error types.
//!
//! Only run-level failures are errors here. Malformed rows, unresolvable
//! geocodes and duplicate keys are counted in [`crate::LoadSummary`] instead.

use thiserror::Error;

/// Errors that abort a load run.
#[derive(Debug, Error)]
pub enum IngestError {
    /// A precondition failed before any state was touched.
    #[error("Precondition failed: {0}")]
    Precondition(String),

    /// Source decoding failed (IO underneath the reader, missing header column).
    #[error(transparent)]
    Source(#[from] geodir_core::CoreError),

    /// The destination store rejected an operation or is unreachable.
    #[error("Destination error: {0}")]
    Destination(String),

    /// PostgreSQL client error.
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    /// Checkpoint file could not be written or removed.
    #[error("Checkpoint error: {0}")]
    Checkpoint(#[source] std::io::Error),

    /// Attribute bag could not be serialized.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl IngestError {
    pub fn destination(msg: impl Into<String>) -> Self {
        IngestError::Destination(msg.into())
    }

    pub fn precondition(msg: impl Into<String>) -> Self {
        IngestError::Precondition(msg.into())
    }
}

/// Result type for loader operations.
pub type Result<T> = std::result::Result<T, IngestError>;
