//! Error types for lmbridge

use thiserror::Error;

/// Main error type for lmbridge operations
#[derive(Error, Debug)]
pub enum BridgeError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Proxy/HTTP errors
    #[error("Proxy error: {0}")]
    Proxy(String),
}

/// Result type alias for lmbridge operations
pub type Result<T> = std::result::Result<T, BridgeError>;
