//! Runtime error types

use thiserror::Error;

/// Container runtime errors
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("Container not found: {0}")]
    NotFound(String),

    #[error("Container already exists: {0}")]
    AlreadyExists(String),

    #[error("Failed to spawn runtime command: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("Runtime command `{command}` failed: {stderr}")]
    CommandFailed { command: String, stderr: String },

    #[error("Unexpected runtime output: {0}")]
    Parse(String),
}

/// Result type for runtime operations
pub type Result<T> = std::result::Result<T, RuntimeError>;
