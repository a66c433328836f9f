//! Error types for scout-daemon

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use scout_proxy::ProxyError;
use scout_registry::RegistryError;
use scout_runtime::RuntimeError;
use scout_store::StoreError;
use scout_types::{Protocol, UnitName};
use scout_verify::VerifyError;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

/// Daemon-level errors
#[derive(Debug, Error)]
pub enum DaemonError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Server startup error
    #[error("Server error: {0}")]
    Server(String),

    /// Registry setup error
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    /// Store setup error
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Verification client setup error
    #[error("Verification error: {0}")]
    Verify(#[from] VerifyError),

    /// Reconciliation error
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors of a single reconciliation step
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Runtime error: {0}")]
    Runtime(#[from] RuntimeError),

    #[error("Proxy error: {0}")]
    Proxy(#[from] ProxyError),

    #[error("Verification error: {0}")]
    Verify(#[from] VerifyError),

    #[error("Migration error: {0}")]
    Migration(#[from] MigrationError),

    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    #[error("No reachable {protocol} endpoint for {unit}")]
    NoEndpoint { unit: UnitName, protocol: Protocol },

    #[error("Unit {0} disappeared from the store")]
    MissingRecord(UnitName),

    #[error("Port allocation failed: {0}")]
    PortAllocation(String),
}

/// One-time migration errors
#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),
}

/// API-specific errors
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Service unavailable
    #[error("Unavailable: {0}")]
    Unavailable(String),

    /// Store error
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ApiError::Unavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "UNAVAILABLE"),
            ApiError::Store(StoreError::Malformed { .. }) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "MALFORMED_RECORD")
            }
            ApiError::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, "STORE_ERROR"),
        };

        let body = ErrorResponse {
            error: self.to_string(),
            code: code.to_string(),
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for API operations
pub type ApiResult<T> = Result<T, ApiError>;

/// Result type alias for daemon operations
pub type DaemonResult<T> = Result<T, DaemonError>;

/// Result type alias for engine operations
pub type EngineResult<T> = Result<T, EngineError>;
