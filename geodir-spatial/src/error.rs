//! Error types for the spatial query layer.

use thiserror::Error;

/// Spatial query errors.
#[derive(Error, Debug)]
pub enum SpatialError {
    /// The query geometry is not a usable polygon selection. A client error.
    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),

    /// A requested projection column is not part of the dataset.
    #[error("Unknown column: {0}")]
    UnknownColumn(String),

    /// The snapshot could not be built from its source.
    #[error("Snapshot build failed: {0}")]
    Snapshot(#[from] geodir_core::CoreError),

    /// Internal error (should not happen).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SpatialError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        SpatialError::InvalidGeometry(msg.into())
    }

    /// Whether the error was caused by the caller's input.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            SpatialError::InvalidGeometry(_) | SpatialError::UnknownColumn(_)
        )
    }
}

/// Result type for spatial operations.
pub type Result<T> = std::result::Result<T, SpatialError>;
