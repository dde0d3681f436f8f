//! Device and person profiles.
//!
//! The current profile is diffed against the last version the server
//! confirmed, so only changed fields are sent.

mod baseline;
mod delta;
mod info;
mod record;

pub use baseline::{BaselineStore, BASELINE_KEY};
pub use delta::{diff, FieldChange, ProfileDiff};
pub use info::{DeviceInfo, PersonInfo};
pub use record::ProfileRecord;
