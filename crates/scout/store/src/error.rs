//! Store error types

use scout_types::UnitName;
use thiserror::Error;

/// Errors raised by metadata store backends
#[derive(Debug, Error)]
pub enum StoreError {
    /// Reading or replacing the state file failed
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// State file is not valid JSON
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// State file root is not a JSON object
    #[error("state file {0} does not contain a JSON object")]
    NotAnObject(String),

    /// A single record could not be decoded
    #[error("malformed record for {unit}: {reason}")]
    Malformed { unit: UnitName, reason: String },

    /// Upsert of an unknown unit without ports and endpoint
    #[error("cannot create record for {0}: ports and endpoint are required")]
    IncompleteRecord(UnitName),
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;
