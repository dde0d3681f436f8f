//! CBOR encoder for persisted blobs.

use crate::error::{CodecError, CodecResult};
use serde::{Deserialize, Serialize};

/// Envelope written around every persisted blob.
///
/// The format number lets a newer build recognise a blob written by an older
/// one and discard it instead of misreading it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Versioned<T> {
    /// Format version of `body`.
    pub format: u16,
    /// The wrapped value.
    pub body: T,
}

/// Encode any serializable value to CBOR bytes.
///
/// # Errors
///
/// Returns an error if the value cannot be serialized.
pub fn to_cbor<T: Serialize + ?Sized>(value: &T) -> CodecResult<Vec<u8>> {
    let mut buffer = Vec::new();
    ciborium::ser::into_writer(value, &mut buffer)
        .map_err(|e| CodecError::encoding_failed(e.to_string()))?;
    Ok(buffer)
}

/// Encode `body` inside a [`Versioned`] envelope.
///
/// # Errors
///
/// Returns an error if the value cannot be serialized.
pub fn encode_versioned<T: Serialize>(format: u16, body: &T) -> CodecResult<Vec<u8>> {
    #[derive(Serialize)]
    struct Borrowed<'a, T> {
        format: u16,
        body: &'a T,
    }

    to_cbor(&Borrowed { format, body })
}
