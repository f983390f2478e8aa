//! Error types for the gateway

use thiserror::Error;

/// Main error type for gateway operations
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Configuration errors (missing service URLs, invalid route rules, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Proxy/HTTP server errors
    #[error("Proxy error: {0}")]
    Proxy(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for gateway operations
pub type Result<T> = std::result::Result<T, GatewayError>;
