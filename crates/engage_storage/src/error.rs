//! Error types for storage operations.

use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The blob key contains characters that cannot be used as an identifier.
    #[error("invalid blob key: {key:?}")]
    InvalidKey {
        /// The rejected key.
        key: String,
    },

    /// Another process holds the data directory.
    #[error("data directory locked: another process has exclusive access")]
    Locked,

    /// The store path exists but is not usable.
    #[error("invalid store location: {0}")]
    InvalidLocation(String),

    /// The store is not accepting writes.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StorageError {
    /// Creates an invalid key error.
    pub fn invalid_key(key: impl Into<String>) -> Self {
        Self::InvalidKey { key: key.into() }
    }
}
