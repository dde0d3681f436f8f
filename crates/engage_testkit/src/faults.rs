//! Fault injection for persistence tests.
//!
//! [`FlakyStore`] wraps any blob store and fails reads or writes on demand,
//! so components can be checked to degrade to "not durable" instead of
//! failing their callers.

use engage_storage::{BlobStore, StorageError, StorageResult};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// A blob store wrapper that can simulate storage failures.
pub struct FlakyStore {
    inner: Arc<dyn BlobStore>,
    fail_writes: AtomicBool,
    fail_reads: AtomicBool,
    writes_before_failure: AtomicUsize,
    failing_keys: Mutex<HashSet<String>>,
    failed_writes: AtomicUsize,
}

impl FlakyStore {
    /// Wraps a store. Nothing fails until configured.
    pub fn new(inner: Arc<dyn BlobStore>) -> Self {
        Self {
            inner,
            fail_writes: AtomicBool::new(false),
            fail_reads: AtomicBool::new(false),
            writes_before_failure: AtomicUsize::new(usize::MAX),
            failing_keys: Mutex::new(HashSet::new()),
            failed_writes: AtomicUsize::new(0),
        }
    }

    /// Sets whether every put and delete fails.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Sets whether every get fails.
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Lets `count` more writes succeed, then fails the rest.
    pub fn fail_after_writes(&self, count: usize) {
        self.writes_before_failure.store(count, Ordering::SeqCst);
    }

    /// Fails writes to one key only.
    pub fn fail_key(&self, key: impl Into<String>) {
        self.failing_keys.lock().insert(key.into());
    }

    /// Clears every injected fault.
    pub fn reset(&self) {
        self.fail_writes.store(false, Ordering::SeqCst);
        self.fail_reads.store(false, Ordering::SeqCst);
        self.writes_before_failure.store(usize::MAX, Ordering::SeqCst);
        self.failing_keys.lock().clear();
    }

    /// Writes rejected so far.
    pub fn failed_writes(&self) -> usize {
        self.failed_writes.load(Ordering::SeqCst)
    }

    /// The wrapped store.
    pub fn inner(&self) -> &Arc<dyn BlobStore> {
        &self.inner
    }

    fn check_write(&self, key: &str) -> StorageResult<()> {
        let budget_spent = self
            .writes_before_failure
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                if n == usize::MAX {
                    Some(n)
                } else {
                    n.checked_sub(1)
                }
            })
            .is_err();

        if budget_spent
            || self.fail_writes.load(Ordering::SeqCst)
            || self.failing_keys.lock().contains(key)
        {
            self.failed_writes.fetch_add(1, Ordering::SeqCst);
            return Err(StorageError::Io(io::Error::new(
                io::ErrorKind::Other,
                format!("simulated write failure for {key}"),
            )));
        }
        Ok(())
    }
}

impl BlobStore for FlakyStore {
    fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StorageError::Io(io::Error::new(
                io::ErrorKind::Other,
                format!("simulated read failure for {key}"),
            )));
        }
        self.inner.get(key)
    }

    fn put(&self, key: &str, bytes: &[u8]) -> StorageResult<()> {
        self.check_write(key)?;
        self.inner.put(key, bytes)
    }

    fn delete(&self, key: &str) -> StorageResult<()> {
        self.check_write(key)?;
        self.inner.delete(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use engage_storage::InMemoryStore;

    fn flaky() -> FlakyStore {
        FlakyStore::new(Arc::new(InMemoryStore::new()))
    }

    #[test]
    fn passes_through_by_default() {
        let store = flaky();
        store.put("a", b"1").unwrap();
        assert_eq!(store.get("a").unwrap(), Some(b"1".to_vec()));
        store.delete("a").unwrap();
        assert_eq!(store.get("a").unwrap(), None);
    }

    #[test]
    fn write_budget() {
        let store = flaky();
        store.fail_after_writes(2);
        store.put("a", b"1").unwrap();
        store.put("b", b"2").unwrap();
        assert!(store.put("c", b"3").is_err());
        assert!(store.put("a", b"4").is_err());
        assert_eq!(store.failed_writes(), 2);
        assert_eq!(store.get("a").unwrap(), Some(b"1".to_vec()));

        store.reset();
        store.put("c", b"3").unwrap();
    }

    #[test]
    fn per_key_failures() {
        let store = flaky();
        store.fail_key("payload_queue");
        assert!(store.put("payload_queue", b"x").is_err());
        store.put("rule_cache", b"x").unwrap();
    }

    #[test]
    fn read_failures() {
        let store = flaky();
        store.put("a", b"1").unwrap();
        store.set_fail_reads(true);
        assert!(store.get("a").is_err());
    }
}
