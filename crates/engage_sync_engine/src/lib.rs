//! # Engage Sync Engine
//!
//! Outbound payload delivery and rule caching for the engage SDK.
//!
//! This crate provides:
//! - A durable FIFO payload queue with per-entry retry state
//! - Exponential backoff between retry attempts
//! - A rule cache with expiry and single-flight refresh
//! - A transport abstraction with a scripted mock and an HTTP mapping
//! - A coordinator that drains the queue and refreshes rules
//!
//! ## Delivery model
//!
//! Payloads are sent strictly in enqueue order, one at a time. Each send
//! ends in exactly one of three outcomes:
//! 1. Success: the entry is marked sent (hidden messages are deleted)
//! 2. Retryable failure: the entry goes back to pending behind a backoff
//! 3. Permanent rejection: the entry is marked failed and never resent
//!
//! While the queue head waits out its backoff, nothing behind it is sent.
//!
//! ## Key Invariants
//!
//! - At most one entry is `Sending` at any time
//! - Every mutation is persisted before the call returns, or flagged
//!   not durable and retried on the next mutation
//! - Cached rules are replaced only by a fully parsed payload
//! - Concurrent rule refreshes share one network fetch

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod clock;
mod config;
mod coordinator;
mod error;
mod http;
mod payload;
mod queue;
mod rule_cache;
mod transport;

pub use clock::{after, Clock, ManualClock, SystemClock};
pub use config::{RetryConfig, RuleCacheConfig, SyncConfig, DEFAULT_RULE_LIFETIME};
pub use coordinator::{
    DeliveryHook, DrainOutcome, DrainSummary, NoopHook, SyncCoordinator, SyncState, SyncStats,
};
pub use error::{FetchError, QueueError, QueueResult, SyncError, SyncResult};
pub use http::{
    classify_status, endpoint_for, parse_max_age, HttpClient, HttpResponse, HttpTransport,
    StatusClass,
};
pub use payload::{
    NewPayload, PayloadEntry, PayloadKind, PayloadState, ProfileKind, SendOutcome, Settled,
};
pub use queue::{PayloadQueue, QueueStats, QUEUE_KEY};
pub use rule_cache::{RuleCache, RuleSnapshot, RULE_CACHE_KEY};
pub use transport::{EngageTransport, MockTransport, RawRuleResponse};
