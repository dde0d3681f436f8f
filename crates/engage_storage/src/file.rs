//! Directory-backed blob store for persistent storage.
//!
//! Layout of a data directory:
//!
//! ```text
//! <data_dir>/
//! ├─ LOCK                  # Advisory lock for single-owner access
//! ├─ payload_queue.blob    # One file per blob key
//! ├─ rule_cache.blob
//! └─ *.blob.tmp            # Transient, only present mid-write
//! ```

use crate::error::{StorageError, StorageResult};
use crate::store::{validate_key, BlobStore};
use fs2::FileExt;
use parking_lot::Mutex;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

const LOCK_FILE: &str = "LOCK";
const BLOB_EXTENSION: &str = "blob";
const TEMP_SUFFIX: &str = "tmp";

/// A blob store keeping one file per key inside a data directory.
///
/// # Durability
///
/// Every `put` follows the write-then-rename pattern:
/// 1. Write the bytes to `<key>.blob.tmp`
/// 2. `sync_all` the temporary file
/// 3. Rename it over `<key>.blob`
/// 4. Fsync the directory so the rename itself is durable
///
/// A crash at any point leaves either the old or the new blob in place.
///
/// # Thread Safety
///
/// The store holds an exclusive advisory lock on the directory for its whole
/// lifetime, so only one engine instance can own a data directory at a time.
/// Writes within the process are serialised by an internal mutex.
///
/// # Example
///
/// ```no_run
/// use engage_storage::{BlobStore, FileStore};
/// use std::path::Path;
///
/// let store = FileStore::open(Path::new("engage-data")).unwrap();
/// store.put("payload_queue", b"queue state").unwrap();
/// ```
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    write_lock: Mutex<()>,
    _lock_file: File,
}

impl FileStore {
    /// Opens or creates a data directory and takes its lock.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The path exists but is not a directory
    /// - Another process holds the lock (returns [`StorageError::Locked`])
    /// - I/O errors occur
    pub fn open(path: &Path) -> StorageResult<Self> {
        if !path.exists() {
            fs::create_dir_all(path)?;
        }

        if !path.is_dir() {
            return Err(StorageError::InvalidLocation(format!(
                "path is not a directory: {}",
                path.display()
            )));
        }

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.join(LOCK_FILE))?;

        if lock_file.try_lock_exclusive().is_err() {
            return Err(StorageError::Locked);
        }

        let store = Self {
            path: path.to_path_buf(),
            write_lock: Mutex::new(()),
            _lock_file: lock_file,
        };
        store.remove_stale_temp_files()?;
        Ok(store)
    }

    /// Returns the data directory path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the file path used for `key`.
    #[must_use]
    pub fn blob_path(&self, key: &str) -> PathBuf {
        self.path.join(format!("{key}.{BLOB_EXTENSION}"))
    }

    fn temp_path(&self, key: &str) -> PathBuf {
        self.path
            .join(format!("{key}.{BLOB_EXTENSION}.{TEMP_SUFFIX}"))
    }

    /// Lists the keys currently stored in the directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be read.
    pub fn keys(&self) -> StorageResult<Vec<String>> {
        let mut keys = Vec::new();
        for entry in fs::read_dir(&self.path)? {
            let name = entry?.file_name();
            let Some(name) = name.to_str() else { continue };
            if let Some(key) = name.strip_suffix(&format!(".{BLOB_EXTENSION}")) {
                if validate_key(key).is_ok() {
                    keys.push(key.to_string());
                }
            }
        }
        keys.sort();
        Ok(keys)
    }

    /// Deletes temporary files left behind by a write interrupted by a crash.
    fn remove_stale_temp_files(&self) -> StorageResult<()> {
        let suffix = format!(".{BLOB_EXTENSION}.{TEMP_SUFFIX}");
        for entry in fs::read_dir(&self.path)? {
            let entry = entry?;
            let is_temp = entry
                .file_name()
                .to_str()
                .is_some_and(|name| name.ends_with(&suffix));
            if is_temp {
                fs::remove_file(entry.path())?;
            }
        }
        Ok(())
    }

    #[cfg(unix)]
    fn sync_directory(&self) -> StorageResult<()> {
        let dir = File::open(&self.path)?;
        dir.sync_all()?;
        Ok(())
    }

    #[cfg(not(unix))]
    fn sync_directory(&self) -> StorageResult<()> {
        // NTFS journals metadata updates; directory fsync is not available
        Ok(())
    }
}

impl BlobStore for FileStore {
    fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        validate_key(key)?;

        let mut file = match File::open(self.blob_path(key)) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let mut data = Vec::new();
        file.read_to_end(&mut data)?;
        Ok(Some(data))
    }

    fn put(&self, key: &str, data: &[u8]) -> StorageResult<()> {
        validate_key(key)?;
        let _guard = self.write_lock.lock();

        let temp_path = self.temp_path(key);
        let mut file = File::create(&temp_path)?;
        file.write_all(data)?;
        file.sync_all()?;
        drop(file);

        fs::rename(&temp_path, self.blob_path(key))?;
        self.sync_directory()
    }

    fn delete(&self, key: &str) -> StorageResult<()> {
        validate_key(key)?;
        let _guard = self.write_lock.lock();

        match fs::remove_file(self.blob_path(key)) {
            Ok(()) => self.sync_directory(),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn contains(&self, key: &str) -> StorageResult<bool> {
        validate_key(key)?;
        Ok(self.blob_path(key).exists())
    }
}
