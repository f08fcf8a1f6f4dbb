//! Error types for collaboration operations.

use thiserror::Error;

/// Result type for collaboration operations.
pub type CollabResult<T> = Result<T, CollabError>;

/// Errors that can occur in collaboration operations.
#[derive(Debug, Error)]
pub enum CollabError {
    /// Message serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Inbound message failed boundary validation.
    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    /// API base URL cannot be turned into a socket endpoint.
    #[error("Unsupported URL scheme: {0}")]
    UnsupportedScheme(String),

    /// API base URL cannot carry path segments.
    #[error("Invalid base URL: {0}")]
    InvalidBaseUrl(String),
}
