//! CBOR decoder for persisted blobs.

use crate::encoder::Versioned;
use crate::error::{CodecError, CodecResult};
use serde::de::DeserializeOwned;
use serde::Deserialize;

/// Decode CBOR bytes into any deserializable type.
///
/// # Errors
///
/// Returns an error if the bytes are not valid CBOR for `T`.
pub fn from_cbor<T: DeserializeOwned>(bytes: &[u8]) -> CodecResult<T> {
    ciborium::de::from_reader(bytes).map_err(|e| CodecError::decoding_failed(e.to_string()))
}

/// Decode a blob written by [`crate::encode_versioned`].
///
/// The format is checked before the body is interpreted, so a blob from an
/// unknown format is reported as [`CodecError::UnsupportedFormat`] rather than
/// as a confusing structural error.
///
/// # Errors
///
/// Returns an error if the bytes are malformed or the format does not match.
pub fn decode_versioned<T: DeserializeOwned>(expected: u16, bytes: &[u8]) -> CodecResult<T> {
    #[derive(Deserialize)]
    struct Header {
        format: u16,
    }

    let header: Header = from_cbor(bytes)?;
    if header.format != expected {
        return Err(CodecError::UnsupportedFormat {
            found: header.format,
            expected,
        });
    }

    let envelope: Versioned<T> = from_cbor(bytes)?;
    Ok(envelope.body)
}
