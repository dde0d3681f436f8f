//! # Engage Storage
//!
//! Blob store trait and implementations for the engage SDK.
//!
//! This crate provides the lowest-level persistence abstraction. Stores are
//! **opaque key-value blob stores** - they do not interpret the bytes they
//! hold.
//!
//! ## Design Principles
//!
//! - Stores are simple get/put/delete maps keyed by fixed identifiers
//! - No knowledge of queue, rule cache or profile formats
//! - Per-key atomicity only: a `put` either fully replaces a blob or leaves it untouched
//! - Must be `Send + Sync` so one store can be shared by every engine component
//!
//! ## Available Stores
//!
//! - [`InMemoryStore`] - For testing and ephemeral sessions
//! - [`FileStore`] - A directory of blob files written with write-then-rename
//!
//! ## Example
//!
//! ```rust
//! use engage_storage::{BlobStore, InMemoryStore};
//!
//! let store = InMemoryStore::new();
//! store.put("payload_queue", b"hello world").unwrap();
//! assert_eq!(store.get("payload_queue").unwrap().as_deref(), Some(&b"hello world"[..]));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod file;
mod memory;
mod store;

pub use error::{StorageError, StorageResult};
pub use file::FileStore;
pub use memory::InMemoryStore;
pub use store::{validate_key, BlobStore, MAX_KEY_LEN};
