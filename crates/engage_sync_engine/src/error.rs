//! Error types for the sync engine.

use engage_targeting::RuleParseError;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Result type for queue operations.
pub type QueueResult<T> = Result<T, QueueError>;

/// Why a rule fetch produced nothing to commit.
///
/// Cloneable so every coalesced caller can receive the same outcome.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// The request never produced a response.
    #[error("network error: {message}")]
    Network {
        /// Error message.
        message: String,
    },

    /// The server answered with a non-success status.
    #[error("server returned status {status}")]
    Server {
        /// HTTP status code.
        status: u16,
    },

    /// The response could not be parsed or was incomplete.
    #[error("rule payload rejected: {0}")]
    Parse(#[from] RuleParseError),
}

impl FetchError {
    /// Creates a network error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }
}

/// Errors from payload queue operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    /// No entry has this id.
    #[error("payload {id} not found")]
    NotFound {
        /// Requested id.
        id: u64,
    },

    /// Another entry is already being sent.
    #[error("payload {in_flight} is already in flight")]
    AlreadyInFlight {
        /// Id of the entry being sent.
        in_flight: u64,
    },

    /// The entry is not in a state that allows the transition.
    #[error("payload {id} cannot move from {from} to {to}")]
    InvalidTransition {
        /// Entry id.
        id: u64,
        /// Current state.
        from: String,
        /// Attempted state.
        to: String,
    },
}

/// Errors that can occur during sync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Rule fetch failed.
    #[error("rule fetch failed: {0}")]
    Fetch(#[from] FetchError),

    /// Queue bookkeeping failed.
    #[error("queue error: {0}")]
    Queue(#[from] QueueError),

    /// Persistence failed.
    #[error("storage error: {0}")]
    Storage(#[from] engage_storage::StorageError),

    /// Encoding a persisted blob failed.
    #[error("codec error: {0}")]
    Codec(#[from] engage_codec::CodecError),
}

impl SyncError {
    /// Returns true if trying again later may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Fetch(FetchError::Network { .. }) => true,
            SyncError::Fetch(FetchError::Server { status }) => {
                *status == 408 || *status == 429 || *status >= 500
            }
            SyncError::Queue(QueueError::AlreadyInFlight { .. }) => true,
            SyncError::Storage(_) => true,
            _ => false,
        }
    }
}
