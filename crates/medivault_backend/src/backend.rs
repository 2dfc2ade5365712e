//! Storage backend trait definition.

use crate::error::BackendResult;
use crate::record::{RecordId, StorageLocation};
use async_trait::async_trait;
use medivault_cipher::CipherKey;

/// The dynamic record representation at the backend boundary.
///
/// Callers with typed models convert through `serde`; the storage layer
/// itself never interprets field contents.
pub type Document = serde_json::Value;

/// A storage destination for encrypted records.
///
/// Backends persist **ciphertext only**: every `store`/`update` encrypts
/// through the cipher layer before touching storage, and every `retrieve`
/// decrypts on the way out. Backends know nothing about each other;
/// fan-out, failover, and sync live in the storage manager.
///
/// # Invariants
///
/// - No backend ever stores or returns plaintext
/// - `retrieve` returning zero items is success, not failure
/// - Backends must be `Send + Sync`; the manager shares them across
///   concurrent operations
///
/// # Implementors
///
/// - [`crate::LocalBackend`] - device-resident key-value store
/// - [`crate::RelationalBackend`] - hosted relational store
/// - [`crate::CloudFileBackend`] - remote file store behind OAuth
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// The location tag this backend writes into record metadata.
    fn location(&self) -> StorageLocation;

    /// Encrypts `value` and persists it tagged with `owner_id` and
    /// `data_type`, returning the generated record ID.
    async fn store(
        &self,
        owner_id: &str,
        value: &Document,
        data_type: &str,
        key: &CipherKey,
    ) -> BackendResult<RecordId>;

    /// Fetches and decrypts all records tagged `(owner_id, data_type)`.
    ///
    /// Ordering follows backend-native enumeration and carries no meaning.
    async fn retrieve(
        &self,
        owner_id: &str,
        data_type: &str,
        key: &CipherKey,
    ) -> BackendResult<Vec<Document>>;

    /// Re-encrypts and overwrites an existing record's payload, bumping
    /// its update timestamp.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the record does not exist in this backend.
    async fn update(&self, record_id: RecordId, value: &Document, key: &CipherKey)
        -> BackendResult<()>;

    /// Removes a record.
    ///
    /// Local and relational backends return `NotFound` for absent
    /// records; the cloud file backend treats deleting a missing file as
    /// success.
    async fn delete(&self, record_id: RecordId) -> BackendResult<()>;

    /// Best-effort usage summary for `owner_id`.
    ///
    /// Never fails: any underlying error is carried in
    /// [`BackendStats::error`] so one broken backend does not prevent
    /// displaying the others.
    async fn stats(&self, owner_id: &str) -> BackendStats;
}

/// Best-effort usage summary for one backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendStats {
    /// The backend this summary describes.
    pub location: StorageLocation,
    /// Number of records held for the user, if known.
    pub item_count: Option<u64>,
    /// Approximate stored payload size in bytes, if known.
    pub estimated_size_bytes: Option<u64>,
    /// Timestamp of the most recent record write visible to this backend,
    /// Unix milliseconds.
    pub last_sync_ms: Option<u64>,
    /// Set when the summary could not be gathered; the other fields are
    /// then unreliable.
    pub error: Option<String>,
}

impl BackendStats {
    /// An empty summary for a backend holding nothing.
    #[must_use]
    pub fn empty(location: StorageLocation) -> Self {
        Self {
            location,
            item_count: Some(0),
            estimated_size_bytes: Some(0),
            last_sync_ms: None,
            error: None,
        }
    }

    /// A summary describing a failed stats gathering attempt.
    #[must_use]
    pub fn failed(location: StorageLocation, error: impl Into<String>) -> Self {
        Self {
            location,
            item_count: None,
            estimated_size_bytes: None,
            last_sync_ms: None,
            error: Some(error.into()),
        }
    }

    /// Whether the summary was gathered successfully.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}
