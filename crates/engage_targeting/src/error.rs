//! Error types for rule payload parsing.

use thiserror::Error;

/// Result type for rule parsing.
pub type RuleParseResult<T> = Result<T, RuleParseError>;

/// Errors that reject a whole rule payload.
///
/// Individual malformed fragments never produce an error; they are dropped
/// and logged. Only a payload that cannot be committed as a unit fails.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuleParseError {
    /// The payload is not JSON.
    #[error("invalid rule payload: {message}")]
    InvalidJson {
        /// Parser message.
        message: String,
    },

    /// The payload lacks one of the two required sections.
    #[error("partial rule payload: missing or invalid `{section}`")]
    MissingSection {
        /// The absent section name.
        section: &'static str,
    },
}

impl RuleParseError {
    /// Create an invalid JSON error.
    pub fn invalid_json(message: impl Into<String>) -> Self {
        Self::InvalidJson {
            message: message.into(),
        }
    }

    /// Returns true if the payload was structurally valid JSON but incomplete.
    pub fn is_partial(&self) -> bool {
        matches!(self, Self::MissingSection { .. })
    }
}
