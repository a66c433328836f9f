//! Proxy error types

use thiserror::Error;

/// Proxy configuration errors
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("Failed to write proxy config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to reload proxy: {0}")]
    Reload(#[from] scout_runtime::RuntimeError),

    #[error("Background task failed: {0}")]
    Task(String),
}

/// Result type for proxy operations
pub type Result<T> = std::result::Result<T, ProxyError>;
