//! Error types for the engagement engine.

use std::io;
use thiserror::Error;

/// Result type for engine operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in engine operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(#[from] engage_storage::StorageError),

    /// Codec error.
    #[error("codec error: {0}")]
    Codec(#[from] engage_codec::CodecError),

    /// Sync error.
    #[error("sync error: {0}")]
    Sync(#[from] engage_sync_engine::SyncError),

    /// Rule fetch error.
    #[error("fetch error: {0}")]
    Fetch(#[from] engage_sync_engine::FetchError),

    /// I/O error outside the blob store (attachments).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A payload body could not be interpreted.
    #[error("invalid payload {id}: {message}")]
    InvalidPayload {
        /// Queue id of the entry.
        id: u64,
        /// Description of the problem.
        message: String,
    },

    /// Operation not permitted in current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why operation is invalid.
        message: String,
    },

    /// The background worker stopped unexpectedly.
    #[error("worker failed: {message}")]
    Worker {
        /// Description of the failure.
        message: String,
    },
}

impl CoreError {
    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Creates an invalid payload error.
    pub fn invalid_payload(id: u64, message: impl Into<String>) -> Self {
        Self::InvalidPayload {
            id,
            message: message.into(),
        }
    }

    /// Creates a worker error.
    pub fn worker(message: impl Into<String>) -> Self {
        Self::Worker {
            message: message.into(),
        }
    }
}
