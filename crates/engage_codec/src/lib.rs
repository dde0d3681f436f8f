//! # Engage Codec
//!
//! Dynamic values and CBOR blob encoding for the engage SDK.
//!
//! This crate provides:
//! - [`Value`], the dynamic scalar/nested value used for profile fields,
//!   custom data, fact lookups and opaque interaction configuration
//! - CBOR encoding for everything the engine persists
//! - A versioned envelope so a persisted blob can be recognised (or rejected)
//!   after an upgrade
//! - JSON bridging for wire bodies
//!
//! ## Encoding Rules
//!
//! - Persisted blobs are CBOR, always wrapped in a [`Versioned`] envelope
//! - Map keys are strings, kept sorted (`BTreeMap`) so identical inputs encode identically
//! - Wire bodies (rule payloads, outbound payloads) are JSON
//!
//! ## Usage
//!
//! ```
//! use engage_codec::{decode_versioned, encode_versioned, Value};
//!
//! let value = Value::from(42);
//! let bytes = encode_versioned(1, &value).unwrap();
//! let decoded: Value = decode_versioned(1, &bytes).unwrap();
//! assert_eq!(value, decoded);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod decoder;
mod encoder;
mod error;
mod json;
mod value;

pub use decoder::{decode_versioned, from_cbor};
pub use encoder::{encode_versioned, to_cbor, Versioned};
pub use error::{CodecError, CodecResult};
pub use json::{from_json_slice, from_json_value, to_json_value, to_json_vec};
pub use value::{Map, Value};
