//! Server error types with HTTP status code mapping

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use geodir_spatial::SpatialError;
use serde::Serialize;
use thiserror::Error;

/// Server error type that wraps query errors and provides HTTP status mapping
#[derive(Error, Debug)]
pub enum ServerError {
    /// Spatial query layer error
    #[error("{0}")]
    Spatial(#[from] SpatialError),

    /// Request body was not valid JSON or did not match the expected shape
    #[error("Invalid request body: {0}")]
    Body(#[from] JsonRejection),

    /// Generic bad request error
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ServerError {
    /// Compact error type identifier for the `@type` field.
    pub fn error_type(&self) -> &'static str {
        match self {
            ServerError::Spatial(SpatialError::InvalidGeometry(_)) => "err:geo/InvalidGeometry",
            ServerError::Spatial(SpatialError::UnknownColumn(_)) => "err:geo/UnknownColumn",
            ServerError::Spatial(SpatialError::Snapshot(_)) => "err:geo/SnapshotUnavailable",
            ServerError::Spatial(SpatialError::Internal(_)) => "err:system/Internal",
            ServerError::Body(_) => "err:request/InvalidBody",
            ServerError::BadRequest(_) => "err:request/BadRequest",
            ServerError::Internal(_) => "err:system/Internal",
        }
    }

    /// Map error to HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 400 - Bad Request (client errors)
            ServerError::Spatial(e) if e.is_client_error() => StatusCode::BAD_REQUEST,
            ServerError::Body(_) => StatusCode::BAD_REQUEST,
            ServerError::BadRequest(_) => StatusCode::BAD_REQUEST,

            // 500 - Internal Server Error
            ServerError::Spatial(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ServerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Create a bad request error
    pub fn bad_request(msg: impl Into<String>) -> Self {
        ServerError::BadRequest(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        ServerError::Internal(msg.into())
    }
}

/// JSON error response body
#[derive(Serialize)]
pub struct ErrorResponse {
    /// Error message
    pub error: String,
    /// HTTP status code
    pub status: u16,
    /// Error type (e.g. "err:geo/InvalidGeometry")
    #[serde(rename = "@type")]
    pub error_type: String,
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_type = self.error_type();

        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::debug!(error = %self, "rejected request");
        }

        let body = ErrorResponse {
            error: self.to_string(),
            status: status.as_u16(),
            error_type: error_type.to_string(),
        };

        let json = serde_json::to_string(&body).unwrap_or_else(|_| {
            format!(
                r#"{{"error":"internal","status":{},"@type":"{}"}}"#,
                status.as_u16(),
                error_type
            )
        });

        (status, [("content-type", "application/json")], json).into_response()
    }
}

/// Result type alias for server operations
pub type Result<T> = std::result::Result<T, ServerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let invalid = ServerError::from(SpatialError::invalid("bad ring"));
        assert_eq!(invalid.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(invalid.error_type(), "err:geo/InvalidGeometry");

        let unknown = ServerError::from(SpatialError::UnknownColumn("zip".into()));
        assert_eq!(unknown.status_code(), StatusCode::BAD_REQUEST);

        let snapshot = ServerError::from(SpatialError::Snapshot(geodir_core::CoreError::EmptySource));
        assert_eq!(snapshot.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
