//! Registry error types

use std::path::PathBuf;
use thiserror::Error;

/// Registry errors
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("ABI file not found: {0}")]
    AbiNotFound(PathBuf),

    #[error("Invalid ABI file: {0}")]
    InvalidAbi(String),

    #[error("Invalid address for {field}: {value}")]
    InvalidAddress { field: &'static str, value: String },

    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("Contract call failed: {0}")]
    Contract(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Chain not found in registry: {0}")]
    ChainNotFound(String),
}

/// Result type for registry operations
pub type Result<T> = std::result::Result<T, RegistryError>;
