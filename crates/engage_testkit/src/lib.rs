//! # Engage Testkit
//!
//! Test utilities for the engagement engine.
//!
//! This crate provides:
//! - Literal rule-set fixtures and engine helpers
//! - Property-based test generators using proptest
//! - A fault-injecting blob store for durability tests
//!
//! ## Usage
//!
//! ```rust,ignore
//! use engage_testkit::prelude::*;
//!
//! #[test]
//! fn survey_after_three_launches() {
//!     let t = TestEngine::memory();
//!     t.install(LAUNCH_SURVEY_RULES);
//!     for _ in 0..2 {
//!         assert!(t.engine.record_local_event("launch").is_none());
//!     }
//!     assert!(t.engine.record_local_event("launch").is_some());
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod faults;
pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::faults::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use faults::*;
pub use fixtures::*;
pub use generators::*;
