//! Blob store trait definition.

use crate::error::{StorageError, StorageResult};

/// Longest accepted blob key, in bytes.
pub const MAX_KEY_LEN: usize = 64;

/// A synchronous key-value store of opaque blobs.
///
/// Every engine component persists its whole state under one fixed key
/// (`rule_cache`, `payload_queue`, ...). The store gives no transactional
/// guarantee across keys.
///
/// # Invariants
///
/// - `put` replaces the blob atomically: a reader sees either the old or the new bytes
/// - `get` returns exactly the bytes of the last successful `put`
/// - `delete` of a missing key is not an error
/// - Stores must be `Send + Sync`; interior locking is the implementor's job
///
/// # Implementors
///
/// - [`super::InMemoryStore`] - For testing
/// - [`super::FileStore`] - For persistent storage
pub trait BlobStore: Send + Sync {
    /// Reads the blob stored under `key`, or `None` if absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is invalid or an I/O error occurs.
    fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>>;

    /// Stores `data` under `key`, replacing any previous blob.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is invalid or the write could not be made durable.
    fn put(&self, key: &str, data: &[u8]) -> StorageResult<()>;

    /// Removes the blob stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is invalid or an I/O error occurs.
    fn delete(&self, key: &str) -> StorageResult<()>;

    /// Returns true if a blob exists under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is invalid or an I/O error occurs.
    fn contains(&self, key: &str) -> StorageResult<bool> {
        Ok(self.get(key)?.is_some())
    }
}

impl<S: BlobStore + ?Sized> BlobStore for std::sync::Arc<S> {
    fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        (**self).get(key)
    }

    fn put(&self, key: &str, data: &[u8]) -> StorageResult<()> {
        (**self).put(key, data)
    }

    fn delete(&self, key: &str) -> StorageResult<()> {
        (**self).delete(key)
    }

    fn contains(&self, key: &str) -> StorageResult<bool> {
        (**self).contains(key)
    }
}

/// Checks that `key` is usable as a blob identifier.
///
/// Keys are 1..=[`MAX_KEY_LEN`] bytes of `[a-z0-9_.-]` and may not start with a dot,
/// so they map one-to-one onto file names.
///
/// # Errors
///
/// Returns [`StorageError::InvalidKey`] for anything else.
pub fn validate_key(key: &str) -> StorageResult<()> {
    let valid = !key.is_empty()
        && key.len() <= MAX_KEY_LEN
        && !key.starts_with('.')
        && key
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || matches!(b, b'_' | b'.' | b'-'));

    if valid {
        Ok(())
    } else {
        Err(StorageError::invalid_key(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_fixed_identifiers() {
        for key in ["rule_cache", "payload_queue", "profile_baseline", "event-ledger", "v1.auto"] {
            assert!(validate_key(key).is_ok(), "{key}");
        }
    }

    #[test]
    fn rejects_path_like_keys() {
        for key in ["", "../etc", "a/b", "Upper", ".hidden", "with space"] {
            assert!(
                matches!(validate_key(key), Err(StorageError::InvalidKey { .. })),
                "{key}"
            );
        }
    }

    #[test]
    fn rejects_overlong_keys() {
        let key = "a".repeat(MAX_KEY_LEN + 1);
        assert!(validate_key(&key).is_err());
        assert!(validate_key(&key[..MAX_KEY_LEN]).is_ok());
    }
}
