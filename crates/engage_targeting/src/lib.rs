//! # Engage Targeting
//!
//! Decides which interaction, if any, an event should show.
//!
//! This crate provides:
//! - [`EventName`] and the canonical `vendor#interaction#label` key
//! - [`FactSnapshot`], the read-only view criteria are evaluated against
//! - [`Criterion`] trees and their wire parser
//! - [`evaluate`], a pure three-valued evaluator
//! - [`RuleSet`], interaction definitions plus ordered target lists
//! - [`resolve`], first-match resolution of an event against a rule set
//!
//! This is a pure crate with no I/O. Everything here is synchronous and
//! safe to call from any thread.
//!
//! ## Example
//!
//! ```
//! use engage_targeting::{resolve, EventName, FactSnapshot, RuleSet};
//!
//! let rules = RuleSet::from_json(br#"{
//!     "interactions": [{"id": "s1", "type": "Survey", "configuration": {}}],
//!     "targets": {"local#app#launch": [
//!         {"interaction_id": "s1", "criteria": {"code_point/local#app#launch/invokes/total": {"$gte": 3}}}
//!     ]}
//! }"#).unwrap();
//!
//! let facts = FactSnapshot::builder(0).invocations("local#app#launch", 3).build();
//! let shown = resolve(&rules, &EventName::local("launch"), &facts);
//! assert_eq!(shown.map(|d| d.id.as_str()), Some("s1"));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod criteria;
mod error;
mod evaluator;
mod event;
mod facts;
mod resolver;
mod rules;

pub use criteria::{Comparison, Criterion, Operator};
pub use error::{RuleParseError, RuleParseResult};
pub use evaluator::{evaluate, evaluate_traced, Evaluation};
pub use event::{escape_segment, EventName, APP_INTERACTION, LOCAL_VENDOR, SEPARATOR};
pub use facts::{FactPath, FactSnapshot, FactSnapshotBuilder, InvocationStats};
pub use resolver::{resolve, resolve_key, resolve_traced, ResolutionTrace, TargetTrace};
pub use rules::{InteractionDefinition, InteractionKind, ParseReport, RuleSet, TargetRule};
