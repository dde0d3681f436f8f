//! Codec errors.

use thiserror::Error;

/// Result alias used throughout the codec.
pub type CodecResult<T> = Result<T, CodecError>;

/// A persisted blob or wire body could not be converted.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Serializing to CBOR or JSON failed.
    #[error("cannot serialize: {message}")]
    EncodingFailed {
        /// Underlying serializer message.
        message: String,
    },

    /// The bytes are not valid CBOR or JSON for the requested type.
    #[error("cannot deserialize: {message}")]
    DecodingFailed {
        /// Underlying deserializer message.
        message: String,
    },

    /// The blob was written with a format this build does not understand.
    #[error("unsupported blob format {found}, expected {expected}")]
    UnsupportedFormat {
        /// Format version found in the blob.
        found: u16,
        /// Format version this build writes.
        expected: u16,
    },
}

impl CodecError {
    /// Wraps a serializer failure.
    pub fn encoding_failed(message: impl Into<String>) -> Self {
        Self::EncodingFailed {
            message: message.into(),
        }
    }

    /// Wraps a deserializer failure.
    pub fn decoding_failed(message: impl Into<String>) -> Self {
        Self::DecodingFailed {
            message: message.into(),
        }
    }
}

