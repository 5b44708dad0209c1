//! Error types for the tab session manager

use thiserror::Error;

/// Main error type for session operations
#[derive(Debug, Error)]
pub enum TabdeckError {
    /// Network-related errors
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),
    /// Persistence errors
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
    /// Page engine reported a failure
    #[error("Engine error: {0}")]
    Engine(String),
    /// Image decoding/encoding errors
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// JSON encode/decode errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// Generic error with message
    #[error("Error: {0}")]
    Other(String),
}

/// Network-specific errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NetworkError {
    /// Request did not complete in time
    #[error("request timed out")]
    Timeout,
    /// HTTP error with status code
    #[error("HTTP {0}")]
    Http(u16),
    /// Declared content type is not acceptable
    #[error("unexpected content type: {0}")]
    ContentType(String),
    /// Payload exceeded the configured ceiling
    #[error("payload of {size} bytes exceeds limit of {limit} bytes")]
    TooLarge { size: usize, limit: usize },
    /// Invalid URL
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
    /// Transport-level failure
    #[error("request failed: {0}")]
    Request(String),
}

/// Persistence-specific errors
#[derive(Debug, Error)]
pub enum StorageError {
    /// Backing store could not be read or written
    #[error("backend failure for key '{key}': {reason}")]
    Backend { key: String, reason: String },
    /// Stored value could not be decoded
    #[error("corrupt value for key '{key}': {source}")]
    Decode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

impl From<reqwest::Error> for NetworkError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if let Some(status) = err.status() {
            Self::Http(status.as_u16())
        } else {
            Self::Request(err.to_string())
        }
    }
}

impl From<reqwest::Error> for TabdeckError {
    fn from(err: reqwest::Error) -> Self {
        Self::Network(err.into())
    }
}

/// Convenience Result type for session operations
pub type Result<T> = std::result::Result<T, TabdeckError>;
