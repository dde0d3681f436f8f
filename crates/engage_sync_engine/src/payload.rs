//! Outbound payload types.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use uuid::Uuid;

/// Which profile record a diff belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ProfileKind {
    /// The device record.
    Device,
    /// The person record.
    Person,
}

impl ProfileKind {
    /// Lowercase name, also used as the wire root key.
    pub fn as_str(self) -> &'static str {
        match self {
            ProfileKind::Device => "device",
            ProfileKind::Person => "person",
        }
    }
}

impl fmt::Display for ProfileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of an outbound payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PayloadKind {
    /// A user-visible message.
    Message,
    /// An automated message that never appears in a thread. Deleted once delivered.
    HiddenMessage,
    /// A field-level profile delta.
    ProfileDiff(ProfileKind),
    /// An engagement event record.
    Event,
}

impl PayloadKind {
    /// True for kinds that are deleted outright on success.
    pub fn is_hidden(self) -> bool {
        matches!(self, PayloadKind::HiddenMessage)
    }

    /// The profile kind of a diff payload.
    pub fn profile(self) -> Option<ProfileKind> {
        match self {
            PayloadKind::ProfileDiff(kind) => Some(kind),
            _ => None,
        }
    }
}

impl fmt::Display for PayloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PayloadKind::Message => f.write_str("message"),
            PayloadKind::HiddenMessage => f.write_str("hidden-message"),
            PayloadKind::ProfileDiff(kind) => write!(f, "{kind}-diff"),
            PayloadKind::Event => f.write_str("event"),
        }
    }
}

/// Delivery state of a queue entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PayloadState {
    /// Waiting to be sent.
    Pending,
    /// Claimed by the coordinator. At most one entry is in this state.
    Sending,
    /// Delivered. Terminal.
    Sent,
    /// Rejected by the server. Terminal, never retried.
    FailedPermanent,
}

impl PayloadState {
    /// True for `Sent` and `FailedPermanent`.
    pub fn is_terminal(self) -> bool {
        matches!(self, PayloadState::Sent | PayloadState::FailedPermanent)
    }
}

impl fmt::Display for PayloadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PayloadState::Pending => "pending",
            PayloadState::Sending => "sending",
            PayloadState::Sent => "sent",
            PayloadState::FailedPermanent => "failed-permanent",
        })
    }
}

/// One outbound payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayloadEntry {
    /// Local id, monotonic in enqueue order.
    pub id: u64,
    /// Client-generated nonce, stable across retries.
    pub nonce: Uuid,
    /// Payload kind.
    pub kind: PayloadKind,
    /// JSON wire body.
    pub body: String,
    /// Delivery state.
    pub state: PayloadState,
    /// Enqueue time (milliseconds since the Unix epoch).
    pub created_at: u64,
    /// Retryable failures so far.
    pub retry_count: u32,
    /// Earliest time of the next attempt, after a retryable failure.
    pub next_attempt_at: Option<u64>,
    /// Local file sent with the payload.
    pub attachment: Option<PathBuf>,
    /// Last failure reason.
    pub last_error: Option<String>,
}

/// Input for [`crate::PayloadQueue::enqueue_with`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPayload {
    /// Payload kind.
    pub kind: PayloadKind,
    /// JSON wire body.
    pub body: String,
    /// Nonce to use; a fresh one is generated when absent.
    pub nonce: Option<Uuid>,
    /// Local attachment file.
    pub attachment: Option<PathBuf>,
}

impl NewPayload {
    /// A payload with just a kind and body.
    pub fn new(kind: PayloadKind, body: impl Into<String>) -> Self {
        Self {
            kind,
            body: body.into(),
            nonce: None,
            attachment: None,
        }
    }

    /// Sets the nonce.
    #[must_use]
    pub fn with_nonce(mut self, nonce: Uuid) -> Self {
        self.nonce = Some(nonce);
        self
    }

    /// Sets the attachment.
    #[must_use]
    pub fn with_attachment(mut self, path: impl Into<PathBuf>) -> Self {
        self.attachment = Some(path.into());
        self
    }
}

/// Transport classification of one send attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// Accepted by the server.
    Success {
        /// Server-assigned id, when the response carries one.
        remote_id: Option<String>,
    },
    /// Transient failure; send again later.
    RetryableFailure {
        /// Failure description.
        reason: String,
    },
    /// The server will never accept this payload.
    PermanentRejection {
        /// Failure description.
        reason: String,
    },
}

impl SendOutcome {
    /// Success without a remote id.
    pub fn success() -> Self {
        Self::Success { remote_id: None }
    }

    /// Retryable failure.
    pub fn retryable(reason: impl Into<String>) -> Self {
        Self::RetryableFailure {
            reason: reason.into(),
        }
    }

    /// Permanent rejection.
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::PermanentRejection {
            reason: reason.into(),
        }
    }
}

/// What [`crate::PayloadQueue::mark_result`] did with an entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settled {
    /// Delivered. `removed` is true for hidden kinds, which are deleted.
    Delivered {
        /// The entry as it was settled.
        entry: PayloadEntry,
        /// Whether the entry was deleted from the queue.
        removed: bool,
    },
    /// Returned to pending behind a backoff delay.
    WillRetry {
        /// The entry as it was settled.
        entry: PayloadEntry,
        /// Delay before the next attempt.
        delay: Duration,
    },
    /// Permanently rejected.
    Rejected {
        /// The entry as it was settled.
        entry: PayloadEntry,
    },
}

impl Settled {
    /// The settled entry.
    pub fn entry(&self) -> &PayloadEntry {
        match self {
            Settled::Delivered { entry, .. }
            | Settled::WillRetry { entry, .. }
            | Settled::Rejected { entry } => entry,
        }
    }
}
