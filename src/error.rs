//! Error types for s3sync

use thiserror::Error;

/// Result type alias for s3sync operations
pub type Result<T> = std::result::Result<T, SyncError>;

/// Main error type for s3sync
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Corrupt sync state: {0}")]
    CorruptState(String),

    #[error("Listing failed for {bucket}/{prefix}: {message}")]
    Listing {
        bucket: String,
        prefix: String,
        message: String,
    },

    #[error("Transfer failed for {key}: {message}")]
    Transfer {
        key: String,
        message: String,
        retryable: bool,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Run cancelled")]
    Cancelled,
}

impl SyncError {
    /// Check if error is retryable (transient transfer failures only)
    pub fn is_retryable(&self) -> bool {
        matches!(self, SyncError::Transfer { retryable: true, .. })
    }

    /// Shorthand for a transient transfer error
    pub fn transfer_transient(key: impl Into<String>, message: impl Into<String>) -> Self {
        SyncError::Transfer {
            key: key.into(),
            message: message.into(),
            retryable: true,
        }
    }

    /// Shorthand for a permanent transfer error
    pub fn transfer_permanent(key: impl Into<String>, message: impl Into<String>) -> Self {
        SyncError::Transfer {
            key: key.into(),
            message: message.into(),
            retryable: false,
        }
    }
}
