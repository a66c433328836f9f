//! Verification error types

use thiserror::Error;

/// Verification errors
#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Explorer API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Explorer rejected request: {0}")]
    Rejected(String),

    #[error("Contract catalog for {unit} unavailable: {reason}")]
    Catalog { unit: String, reason: String },

    #[error("Explorer unreachable: {0}")]
    Unreachable(String),
}

/// Result type for verification operations
pub type Result<T> = std::result::Result<T, VerifyError>;
