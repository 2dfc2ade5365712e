//! Device-resident key-value storage.
//!
//! The local backend and the cloud token cache sit on top of this
//! abstraction: a flat string-key to byte-value map with an optional hard
//! capacity quota, mirroring what browser/device storage APIs offer. There
//! is no query capability; enumeration beyond [`DeviceStore::keys`] is the
//! caller's problem (the local backend keeps its own index).

use fs2::FileExt;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result type for device store operations.
pub type DeviceStoreResult<T> = Result<T, DeviceStoreError>;

/// Errors that can occur in a device store.
#[derive(Debug, Error)]
pub enum DeviceStoreError {
    /// An I/O failure in the underlying storage.
    #[error("device store I/O error: {0}")]
    Io(String),

    /// A write was rejected because it would exceed the capacity quota.
    #[error("quota exceeded: write needs {needed_bytes} bytes, quota is {quota_bytes}")]
    QuotaExceeded {
        /// Total bytes the store would hold after the write.
        needed_bytes: u64,
        /// The configured quota.
        quota_bytes: u64,
    },

    /// The persisted store contents could not be decoded.
    #[error("device store corrupted: {0}")]
    Corrupted(String),
}

impl DeviceStoreError {
    /// Creates an I/O error.
    pub fn io(message: impl Into<String>) -> Self {
        Self::Io(message.into())
    }
}

/// A flat key-value store resident on the device.
///
/// Implementations must be safe to share across threads; writes are
/// rejected with [`DeviceStoreError::QuotaExceeded`] once the configured
/// capacity would be crossed.
pub trait DeviceStore: Send + Sync {
    /// Reads the value stored under `key`, if any.
    fn read(&self, key: &str) -> DeviceStoreResult<Option<Vec<u8>>>;

    /// Writes `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceStoreError::QuotaExceeded`] if the write would push
    /// total usage past the quota, or an I/O error from the underlying
    /// storage.
    fn write(&self, key: &str, value: &[u8]) -> DeviceStoreResult<()>;

    /// Deletes the value under `key`. Returns whether a value existed.
    fn delete(&self, key: &str) -> DeviceStoreResult<bool>;

    /// Returns all keys currently present.
    fn keys(&self) -> DeviceStoreResult<Vec<String>>;

    /// Returns the total size of stored values in bytes.
    fn usage_bytes(&self) -> DeviceStoreResult<u64>;
}

fn usage_after_write(entries: &HashMap<String, Vec<u8>>, key: &str, value_len: u64) -> u64 {
    let current: u64 = entries.values().map(|v| v.len() as u64).sum();
    let replaced = entries.get(key).map(|v| v.len() as u64).unwrap_or(0);
    current - replaced + value_len
}

/// An in-memory device store.
///
/// Suitable for tests and ephemeral sessions. An optional quota makes it
/// behave like a capacity-limited device store.
#[derive(Debug, Default)]
pub struct MemoryDeviceStore {
    entries: RwLock<HashMap<String, Vec<u8>>>,
    quota_bytes: Option<u64>,
}

impl MemoryDeviceStore {
    /// Creates an unbounded in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an in-memory store with a hard byte quota on stored values.
    #[must_use]
    pub fn with_quota(quota_bytes: u64) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            quota_bytes: Some(quota_bytes),
        }
    }
}

impl DeviceStore for MemoryDeviceStore {
    fn read(&self, key: &str) -> DeviceStoreResult<Option<Vec<u8>>> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn write(&self, key: &str, value: &[u8]) -> DeviceStoreResult<()> {
        let mut entries = self.entries.write();
        if let Some(quota) = self.quota_bytes {
            let needed = usage_after_write(&entries, key, value.len() as u64);
            if needed > quota {
                return Err(DeviceStoreError::QuotaExceeded {
                    needed_bytes: needed,
                    quota_bytes: quota,
                });
            }
        }
        entries.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &str) -> DeviceStoreResult<bool> {
        Ok(self.entries.write().remove(key).is_some())
    }

    fn keys(&self) -> DeviceStoreResult<Vec<String>> {
        Ok(self.entries.read().keys().cloned().collect())
    }

    fn usage_bytes(&self) -> DeviceStoreResult<u64> {
        Ok(self.entries.read().values().map(|v| v.len() as u64).sum())
    }
}

/// A file-backed device store.
///
/// The whole map is kept in memory and persisted as a single CBOR file via
/// a temp-file-and-rename write, so a crash mid-write leaves the previous
/// snapshot intact. A sidecar lock file (`<path>.lock`) held for the
/// lifetime of the store keeps other processes out.
#[derive(Debug)]
pub struct FileDeviceStore {
    path: PathBuf,
    // Held for the exclusive flock; never read.
    _lock_file: File,
    entries: RwLock<HashMap<String, Vec<u8>>>,
    quota_bytes: Option<u64>,
}

impl FileDeviceStore {
    /// Opens or creates a file-backed store at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is already held by another process,
    /// the file cannot be created, or existing contents fail to decode.
    pub fn open(path: &Path) -> DeviceStoreResult<Self> {
        Self::open_with_quota(path, None)
    }

    /// Opens or creates a file-backed store with a byte quota.
    pub fn open_with_quota(path: &Path, quota_bytes: Option<u64>) -> DeviceStoreResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| DeviceStoreError::io(e.to_string()))?;
        }

        let lock_path = path.with_extension("lock");
        let lock_file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)
            .map_err(|e| DeviceStoreError::io(e.to_string()))?;
        if lock_file.try_lock_exclusive().is_err() {
            return Err(DeviceStoreError::io(format!(
                "device store locked by another process: {}",
                lock_path.display()
            )));
        }

        let entries = if path.exists() {
            let bytes = std::fs::read(path).map_err(|e| DeviceStoreError::io(e.to_string()))?;
            if bytes.is_empty() {
                HashMap::new()
            } else {
                medivault_codec::from_cbor(&bytes)
                    .map_err(|e| DeviceStoreError::Corrupted(e.to_string()))?
            }
        } else {
            HashMap::new()
        };

        Ok(Self {
            path: path.to_path_buf(),
            _lock_file: lock_file,
            entries: RwLock::new(entries),
            quota_bytes,
        })
    }

    /// Returns the path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, entries: &HashMap<String, Vec<u8>>) -> DeviceStoreResult<()> {
        let bytes =
            medivault_codec::to_cbor(entries).map_err(|e| DeviceStoreError::io(e.to_string()))?;
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, &bytes).map_err(|e| DeviceStoreError::io(e.to_string()))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| DeviceStoreError::io(e.to_string()))?;
        Ok(())
    }
}

impl DeviceStore for FileDeviceStore {
    fn read(&self, key: &str) -> DeviceStoreResult<Option<Vec<u8>>> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn write(&self, key: &str, value: &[u8]) -> DeviceStoreResult<()> {
        let mut entries = self.entries.write();
        if let Some(quota) = self.quota_bytes {
            let needed = usage_after_write(&entries, key, value.len() as u64);
            if needed > quota {
                return Err(DeviceStoreError::QuotaExceeded {
                    needed_bytes: needed,
                    quota_bytes: quota,
                });
            }
        }
        entries.insert(key.to_string(), value.to_vec());
        self.persist(&entries)
    }

    fn delete(&self, key: &str) -> DeviceStoreResult<bool> {
        let mut entries = self.entries.write();
        let existed = entries.remove(key).is_some();
        if existed {
            self.persist(&entries)?;
        }
        Ok(existed)
    }

    fn keys(&self) -> DeviceStoreResult<Vec<String>> {
        Ok(self.entries.read().keys().cloned().collect())
    }

    fn usage_bytes(&self) -> DeviceStoreResult<u64> {
        Ok(self.entries.read().values().map(|v| v.len() as u64).sum())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_write_read_delete() {
        let store = MemoryDeviceStore::new();
        store.write("a", b"one").unwrap();
        assert_eq!(store.read("a").unwrap(), Some(b"one".to_vec()));
        assert!(store.delete("a").unwrap());
        assert!(!store.delete("a").unwrap());
        assert_eq!(store.read("a").unwrap(), None);
    }

    #[test]
    fn memory_overwrite_replaces() {
        let store = MemoryDeviceStore::new();
        store.write("a", b"one").unwrap();
        store.write("a", b"two").unwrap();
        assert_eq!(store.read("a").unwrap(), Some(b"two".to_vec()));
        assert_eq!(store.usage_bytes().unwrap(), 3);
    }

    #[test]
    fn memory_quota_rejects_oversized_write() {
        let store = MemoryDeviceStore::with_quota(10);
        store.write("a", &[0u8; 8]).unwrap();
        let result = store.write("b", &[0u8; 8]);
        assert!(matches!(
            result,
            Err(DeviceStoreError::QuotaExceeded {
                needed_bytes: 16,
                quota_bytes: 10
            })
        ));
    }

    #[test]
    fn memory_quota_accounts_for_replacement() {
        let store = MemoryDeviceStore::with_quota(10);
        store.write("a", &[0u8; 8]).unwrap();
        // Replacing the same key frees its old bytes first.
        store.write("a", &[0u8; 10]).unwrap();
    }

    #[test]
    fn file_store_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vault.bin");
        {
            let store = FileDeviceStore::open(&path).unwrap();
            store.write("k", b"persisted").unwrap();
        }
        let store = FileDeviceStore::open(&path).unwrap();
        assert_eq!(store.read("k").unwrap(), Some(b"persisted".to_vec()));
    }

    #[test]
    fn file_store_second_open_is_locked_out() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vault.bin");
        let _store = FileDeviceStore::open(&path).unwrap();
        assert!(matches!(
            FileDeviceStore::open(&path),
            Err(DeviceStoreError::Io(_))
        ));
    }

    #[test]
    fn file_store_quota_applies() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vault.bin");
        let store = FileDeviceStore::open_with_quota(&path, Some(4)).unwrap();
        assert!(store.write("k", &[0u8; 16]).is_err());
    }
}
