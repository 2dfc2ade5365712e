//! Device-local storage backend.
//!
//! Records live in a flat [`DeviceStore`] under
//! `mv/{owner}/{data_type}/{id}` keys. Because the device store cannot be
//! queried, each owner also has an enumeration index at
//! `mv/index_{owner}`: a list of `(id, data_type, created_at)` entries
//! that is the sole means of listing records.
//!
//! The index and the record entries are kept consistent as a unit: a
//! record is written first and rolled back if the index write fails, so
//! the index never references a missing record and no record exists
//! outside the index. All mutations are serialized behind one lock.

use crate::backend::{BackendStats, Document, StorageBackend};
use crate::device::{DeviceStore, DeviceStoreError};
use crate::error::{BackendError, BackendResult};
use crate::record::{now_millis, EncryptedRecord, RecordId, StorageLocation};
use async_trait::async_trait;
use medivault_cipher::{CipherKey, CipherService};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

const KEY_PREFIX: &str = "mv/";
const INDEX_PREFIX: &str = "mv/index_";

/// Fraction of a user's records evicted when the device store is full:
/// one tenth, rounded up, at least one record.
const EVICTION_DENOMINATOR: usize = 10;

fn record_key(owner_id: &str, data_type: &str, id: RecordId) -> String {
    format!("{KEY_PREFIX}{owner_id}/{data_type}/{id}")
}

fn index_key(owner_id: &str) -> String {
    format!("{INDEX_PREFIX}{owner_id}")
}

fn is_record_key(key: &str) -> bool {
    key.starts_with(KEY_PREFIX) && !key.starts_with(INDEX_PREFIX)
}

/// One entry in a user's enumeration index.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct IndexEntry {
    id: RecordId,
    data_type: String,
    created_at_ms: u64,
}

/// Storage backend over a device-resident key-value store.
///
/// Works on any [`DeviceStore`]; production uses the file-backed store,
/// tests the in-memory one.
pub struct LocalBackend<S: DeviceStore> {
    store: S,
    // Serializes read-modify-write cycles on the per-owner index.
    write_lock: Mutex<()>,
}

impl<S: DeviceStore> LocalBackend<S> {
    /// Creates a local backend over the given device store.
    pub fn new(store: S) -> Self {
        Self {
            store,
            write_lock: Mutex::new(()),
        }
    }

    /// Returns a reference to the underlying device store.
    pub fn device_store(&self) -> &S {
        &self.store
    }

    fn load_index(&self, owner_id: &str) -> BackendResult<Vec<IndexEntry>> {
        match self.store.read(&index_key(owner_id))? {
            Some(bytes) => Ok(medivault_codec::from_cbor(&bytes)?),
            None => Ok(Vec::new()),
        }
    }

    fn save_index(&self, owner_id: &str, index: &[IndexEntry]) -> Result<(), DeviceStoreError> {
        let bytes = medivault_codec::to_cbor(&index)
            .map_err(|e| DeviceStoreError::io(e.to_string()))?;
        self.store.write(&index_key(owner_id), &bytes)
    }

    /// Finds the full device-store key for a record by its ID.
    fn find_record_key(&self, record_id: RecordId) -> BackendResult<Option<String>> {
        let suffix = format!("/{record_id}");
        Ok(self
            .store
            .keys()?
            .into_iter()
            .find(|k| is_record_key(k) && k.ends_with(&suffix)))
    }

    /// Drops the oldest tenth of this owner's records to make room.
    fn evict_oldest(&self, owner_id: &str) -> BackendResult<usize> {
        let mut index = self.load_index(owner_id)?;
        if index.is_empty() {
            return Ok(0);
        }

        index.sort_by_key(|entry| entry.created_at_ms);
        let evict_count = (index.len() + EVICTION_DENOMINATOR - 1) / EVICTION_DENOMINATOR;
        let victims: Vec<IndexEntry> = index.drain(..evict_count).collect();

        for victim in &victims {
            let key = record_key(owner_id, &victim.data_type, victim.id);
            self.store.delete(&key)?;
        }
        self.save_index(owner_id, &index)?;

        warn!(
            owner = owner_id,
            evicted = victims.len(),
            "device store full, evicted oldest records"
        );
        Ok(victims.len())
    }

    /// Writes the record and its index entry as a unit.
    ///
    /// The record goes in first; if the index write then fails, the record
    /// write is undone so the index never lags behind the store.
    fn write_record_and_index(
        &self,
        owner_id: &str,
        store_key: &str,
        bytes: &[u8],
        entry: &IndexEntry,
    ) -> BackendResult<()> {
        self.store.write(store_key, bytes)?;

        let index_result = self.load_index(owner_id).and_then(|mut index| {
            index.push(entry.clone());
            self.save_index(owner_id, &index).map_err(BackendError::from)
        });
        if let Err(err) = index_result {
            let _ = self.store.delete(store_key);
            return Err(err);
        }
        Ok(())
    }
}

#[async_trait]
impl<S: DeviceStore> StorageBackend for LocalBackend<S> {
    fn location(&self) -> StorageLocation {
        StorageLocation::Local
    }

    async fn store(
        &self,
        owner_id: &str,
        value: &Document,
        data_type: &str,
        key: &CipherKey,
    ) -> BackendResult<RecordId> {
        let payload = CipherService::new(key).encrypt(value)?;
        let record = EncryptedRecord::new(owner_id, data_type, payload, StorageLocation::Local);
        let bytes = medivault_codec::to_cbor(&record)?;
        let store_key = record_key(owner_id, data_type, record.id);
        let entry = IndexEntry {
            id: record.id,
            data_type: data_type.to_string(),
            created_at_ms: record.created_at_ms,
        };

        let _guard = self.write_lock.lock();
        match self.write_record_and_index(owner_id, &store_key, &bytes, &entry) {
            Ok(()) => {}
            Err(BackendError::QuotaExceeded { .. }) => {
                // Full device store: drop the oldest tenth of this owner's
                // records and retry once.
                self.evict_oldest(owner_id)?;
                self.write_record_and_index(owner_id, &store_key, &bytes, &entry)?;
            }
            Err(other) => return Err(other),
        }

        debug!(owner = owner_id, data_type, id = %record.id, "stored local record");
        Ok(record.id)
    }

    async fn retrieve(
        &self,
        owner_id: &str,
        data_type: &str,
        key: &CipherKey,
    ) -> BackendResult<Vec<Document>> {
        let service = CipherService::new(key);
        let index = self.load_index(owner_id)?;

        let mut documents = Vec::new();
        for entry in index.iter().filter(|e| e.data_type == data_type) {
            let store_key = record_key(owner_id, &entry.data_type, entry.id);
            let bytes = self.store.read(&store_key)?.ok_or_else(|| {
                BackendError::storage(format!("index references missing record {}", entry.id))
            })?;
            let record: EncryptedRecord = medivault_codec::from_cbor(&bytes)?;
            documents.push(service.decrypt(&record.payload)?);
        }
        Ok(documents)
    }

    async fn update(
        &self,
        record_id: RecordId,
        value: &Document,
        key: &CipherKey,
    ) -> BackendResult<()> {
        let _guard = self.write_lock.lock();
        let store_key = self
            .find_record_key(record_id)?
            .ok_or_else(|| BackendError::not_found(record_id))?;

        let bytes = self
            .store
            .read(&store_key)?
            .ok_or_else(|| BackendError::not_found(record_id))?;
        let mut record: EncryptedRecord = medivault_codec::from_cbor(&bytes)?;

        record.payload = CipherService::new(key).encrypt(value)?;
        record.updated_at_ms = now_millis();
        let bytes = medivault_codec::to_cbor(&record)?;
        self.store.write(&store_key, &bytes)?;
        Ok(())
    }

    async fn delete(&self, record_id: RecordId) -> BackendResult<()> {
        let _guard = self.write_lock.lock();
        let store_key = self
            .find_record_key(record_id)?
            .ok_or_else(|| BackendError::not_found(record_id))?;

        // mv/{owner}/{data_type}/{id}
        let owner_id = store_key
            .strip_prefix(KEY_PREFIX)
            .and_then(|rest| rest.split('/').next())
            .ok_or_else(|| BackendError::storage(format!("malformed record key {store_key}")))?
            .to_string();

        // Keep the record bytes around so a failed index write can be
        // undone without losing data.
        let previous = self.store.read(&store_key)?;
        self.store.delete(&store_key)?;

        let index_result = self.load_index(&owner_id).and_then(|mut index| {
            index.retain(|entry| entry.id != record_id);
            self.save_index(&owner_id, &index).map_err(BackendError::from)
        });
        if let Err(err) = index_result {
            if let Some(bytes) = previous {
                let _ = self.store.write(&store_key, &bytes);
            }
            return Err(err);
        }
        Ok(())
    }

    async fn stats(&self, owner_id: &str) -> BackendStats {
        let gather = || -> BackendResult<BackendStats> {
            let index = self.load_index(owner_id)?;
            let mut size = 0u64;
            for entry in &index {
                let store_key = record_key(owner_id, &entry.data_type, entry.id);
                if let Some(bytes) = self.store.read(&store_key)? {
                    size += bytes.len() as u64;
                }
            }
            Ok(BackendStats {
                location: StorageLocation::Local,
                item_count: Some(index.len() as u64),
                estimated_size_bytes: Some(size),
                last_sync_ms: index.iter().map(|e| e.created_at_ms).max(),
                error: None,
            })
        };
        gather().unwrap_or_else(|e| BackendStats::failed(StorageLocation::Local, e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::MemoryDeviceStore;
    use serde_json::json;

    fn backend() -> LocalBackend<MemoryDeviceStore> {
        LocalBackend::new(MemoryDeviceStore::new())
    }

    #[tokio::test]
    async fn store_retrieve_roundtrip() {
        let backend = backend();
        let key = CipherKey::generate();

        backend
            .store("u1", &json!({"name": "Paracetamol"}), "medicines", &key)
            .await
            .unwrap();

        let docs = backend.retrieve("u1", "medicines", &key).await.unwrap();
        assert_eq!(docs, vec![json!({"name": "Paracetamol"})]);
    }

    #[tokio::test]
    async fn retrieve_filters_by_data_type() {
        let backend = backend();
        let key = CipherKey::generate();

        backend
            .store("u1", &json!({"name": "Aspirin"}), "medicines", &key)
            .await
            .unwrap();
        backend
            .store("u1", &json!({"total": 12}), "sales", &key)
            .await
            .unwrap();

        let sales = backend.retrieve("u1", "sales", &key).await.unwrap();
        assert_eq!(sales, vec![json!({"total": 12})]);
    }

    #[tokio::test]
    async fn retrieve_unknown_owner_is_empty_success() {
        let backend = backend();
        let key = CipherKey::generate();
        let docs = backend.retrieve("nobody", "medicines", &key).await.unwrap();
        assert!(docs.is_empty());
    }

    #[tokio::test]
    async fn ciphertext_on_device_is_opaque() {
        let backend = backend();
        let key = CipherKey::generate();
        backend
            .store("u1", &json!({"name": "Codeine"}), "medicines", &key)
            .await
            .unwrap();

        for k in backend.device_store().keys().unwrap() {
            let bytes = backend.device_store().read(&k).unwrap().unwrap();
            let haystack = String::from_utf8_lossy(&bytes);
            assert!(!haystack.contains("Codeine"));
        }
    }

    #[tokio::test]
    async fn update_replaces_payload() {
        let backend = backend();
        let key = CipherKey::generate();
        let id = backend
            .store("u1", &json!({"stock": 1}), "medicines", &key)
            .await
            .unwrap();

        backend
            .update(id, &json!({"stock": 2}), &key)
            .await
            .unwrap();

        let docs = backend.retrieve("u1", "medicines", &key).await.unwrap();
        assert_eq!(docs, vec![json!({"stock": 2})]);
    }

    #[tokio::test]
    async fn update_missing_record_is_not_found() {
        let backend = backend();
        let key = CipherKey::generate();
        let result = backend.update(RecordId::new(), &json!({}), &key).await;
        assert!(matches!(result, Err(BackendError::NotFound { .. })));
    }

    #[tokio::test]
    async fn delete_removes_record_and_index_entry() {
        let backend = backend();
        let key = CipherKey::generate();
        let id = backend
            .store("u1", &json!({"a": 1}), "medicines", &key)
            .await
            .unwrap();

        backend.delete(id).await.unwrap();

        assert!(backend
            .retrieve("u1", "medicines", &key)
            .await
            .unwrap()
            .is_empty());
        let stats = backend.stats("u1").await;
        assert_eq!(stats.item_count, Some(0));

        let result = backend.delete(id).await;
        assert!(matches!(result, Err(BackendError::NotFound { .. })));
    }

    #[tokio::test]
    async fn index_count_matches_retrievable_records() {
        let backend = backend();
        let key = CipherKey::generate();

        let mut ids = Vec::new();
        for i in 0..6 {
            ids.push(
                backend
                    .store("u1", &json!({"n": i}), "medicines", &key)
                    .await
                    .unwrap(),
            );
        }
        backend.delete(ids[0]).await.unwrap();
        backend.delete(ids[3]).await.unwrap();

        let stats = backend.stats("u1").await;
        let docs = backend.retrieve("u1", "medicines", &key).await.unwrap();
        assert_eq!(stats.item_count, Some(docs.len() as u64));
        assert_eq!(docs.len(), 4);
    }

    #[tokio::test]
    async fn quota_eviction_drops_oldest_and_write_succeeds() {
        // Small enough that a handful of ~300 byte records fill it; the
        // write that trips the quota evicts the oldest tenth and retries.
        let store = MemoryDeviceStore::with_quota(4096);
        let backend = LocalBackend::new(store);
        let key = CipherKey::generate();

        let mut last_count = 0u64;
        for i in 0..200u32 {
            backend
                .store("u1", &json!({"n": i, "pad": "x".repeat(200)}), "m", &key)
                .await
                .unwrap();

            let count = backend.stats("u1").await.item_count.unwrap();
            if count <= last_count {
                // Eviction fired: the oldest record is gone, the new one
                // landed, and index/records still agree.
                let docs = backend.retrieve("u1", "m", &key).await.unwrap();
                assert!(!docs.iter().any(|d| d["n"] == 0));
                assert!(docs.iter().any(|d| d["n"] == i));
                assert_eq!(docs.len() as u64, count);
                return;
            }
            last_count = count;
        }
        panic!("quota eviction never triggered");
    }

    #[tokio::test]
    async fn stats_reports_counts_and_latest_write() {
        let backend = backend();
        let key = CipherKey::generate();
        backend
            .store("u1", &json!({"a": 1}), "medicines", &key)
            .await
            .unwrap();
        backend
            .store("u1", &json!({"b": 2}), "sales", &key)
            .await
            .unwrap();

        let stats = backend.stats("u1").await;
        assert!(stats.is_ok());
        assert_eq!(stats.item_count, Some(2));
        assert!(stats.estimated_size_bytes.unwrap() > 0);
        assert!(stats.last_sync_ms.is_some());
    }

    mod rollback {
        use super::*;
        use crate::device::{DeviceStoreError, DeviceStoreResult};
        use std::sync::atomic::{AtomicBool, Ordering};

        /// Device store whose index writes can be switched off, to
        /// exercise the record rollback path.
        struct IndexFailStore {
            inner: MemoryDeviceStore,
            fail_index_writes: AtomicBool,
        }

        impl IndexFailStore {
            fn new() -> Self {
                Self {
                    inner: MemoryDeviceStore::new(),
                    fail_index_writes: AtomicBool::new(false),
                }
            }
        }

        impl DeviceStore for IndexFailStore {
            fn read(&self, key: &str) -> DeviceStoreResult<Option<Vec<u8>>> {
                self.inner.read(key)
            }

            fn write(&self, key: &str, value: &[u8]) -> DeviceStoreResult<()> {
                if key.starts_with("mv/index_") && self.fail_index_writes.load(Ordering::SeqCst) {
                    return Err(DeviceStoreError::io("injected index write failure"));
                }
                self.inner.write(key, value)
            }

            fn delete(&self, key: &str) -> DeviceStoreResult<bool> {
                self.inner.delete(key)
            }

            fn keys(&self) -> DeviceStoreResult<Vec<String>> {
                self.inner.keys()
            }

            fn usage_bytes(&self) -> DeviceStoreResult<u64> {
                self.inner.usage_bytes()
            }
        }

        #[tokio::test]
        async fn failed_index_write_rolls_back_record() {
            let backend = LocalBackend::new(IndexFailStore::new());
            let key = CipherKey::generate();

            backend
                .device_store()
                .fail_index_writes
                .store(true, Ordering::SeqCst);
            let result = backend
                .store("u1", &json!({"orphan": true}), "medicines", &key)
                .await;
            assert!(result.is_err());

            // No record key may survive the failed store.
            let record_keys: Vec<String> = backend
                .device_store()
                .keys()
                .unwrap()
                .into_iter()
                .filter(|k| !k.starts_with("mv/index_"))
                .collect();
            assert!(record_keys.is_empty());

            backend
                .device_store()
                .fail_index_writes
                .store(false, Ordering::SeqCst);
            backend
                .store("u1", &json!({"ok": true}), "medicines", &key)
                .await
                .unwrap();
            let docs = backend.retrieve("u1", "medicines", &key).await.unwrap();
            assert_eq!(docs.len(), 1);
        }
    }
}
