//! Unified error types for Relay

use thiserror::Error;

/// Unified error type for all Relay operations
#[derive(Error, Debug)]
pub enum RelayError {
    // Transport errors (connection dropped, refused, timed out)
    #[error("Transport error: {0}")]
    Transport(String),

    // Watched resource errors
    #[error("Resource is not valid UTF-8: {0}")]
    Decode(String),

    #[error("Schema error: {0}")]
    Schema(String),

    // Completion service errors
    #[error("Completion request failed: {0}")]
    Completion(String),

    #[error("Could not parse completion response: {0}")]
    ResponseParse(String),

    // Controller errors
    #[error("Controller error: {0}")]
    Controller(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Generic
    #[error("{0}")]
    Other(String),
}

impl RelayError {
    /// Whether this error means the underlying session is no longer usable.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Io(_))
    }
}

/// Result type alias using RelayError
pub type Result<T> = std::result::Result<T, RelayError>;
