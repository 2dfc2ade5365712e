//! Hosted relational storage backend.
//!
//! Records normally live as rows in a dedicated table keyed by
//! `(owner_id, data_type)`. Deployments whose schema lacks that table are
//! handled with an explicit fallback: the encrypted row is embedded in the
//! user's profile document instead, preserving the same logical contract
//! (rows remain retrievable by data type) under a different physical
//! representation.
//!
//! The backend talks to the store through the [`RelationalClient`] trait,
//! which carries an ambient authenticated session. Classified errors keep
//! the fallback decision explicit: only [`RelationalApiError::SchemaUnavailable`]
//! triggers the profile path.

use crate::backend::{BackendStats, Document, StorageBackend};
use crate::error::{BackendError, BackendResult};
use crate::record::{now_millis, EncryptedRecord, RecordId, StorageLocation};
use async_trait::async_trait;
use medivault_cipher::{CipherKey, CipherService};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

/// Errors surfaced by a [`RelationalClient`].
#[derive(Debug, Error)]
pub enum RelationalApiError {
    /// No authenticated session, or the session does not cover the row.
    #[error("not authorized: {0}")]
    Unauthorized(String),

    /// The dedicated records table is missing or unusable.
    #[error("schema unavailable: {0}")]
    SchemaUnavailable(String),

    /// The addressed row does not exist.
    #[error("row not found")]
    NotFound,

    /// Any other network or service failure.
    #[error("service error: {0}")]
    Service(String),
}

/// Encrypted rows embedded in a user's profile document when the
/// dedicated table is unavailable.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileVault {
    /// The embedded rows.
    pub records: Vec<EncryptedRecord>,
}

/// Usage numbers reported by the remote store.
#[derive(Debug, Clone, Copy, Default)]
pub struct RowStats {
    /// Number of rows for the user.
    pub row_count: u64,
    /// Total payload bytes across those rows.
    pub payload_bytes: u64,
    /// Most recent row write, Unix milliseconds.
    pub last_write_ms: Option<u64>,
}

/// Client for the hosted relational store.
///
/// Implementations wrap the actual service API; the in-crate
/// [`MemoryRelationalClient`] serves tests and offline development.
#[async_trait]
pub trait RelationalClient: Send + Sync {
    /// The user the ambient session is authenticated as, if any.
    async fn session_owner(&self) -> Option<String>;

    /// Inserts a row into the dedicated records table.
    async fn insert_record(&self, row: EncryptedRecord) -> Result<(), RelationalApiError>;

    /// Selects all rows for `(owner_id, data_type)`.
    async fn select_records(
        &self,
        owner_id: &str,
        data_type: &str,
    ) -> Result<Vec<EncryptedRecord>, RelationalApiError>;

    /// Overwrites the payload and update timestamp of one row.
    async fn update_record(
        &self,
        record_id: RecordId,
        payload: Vec<u8>,
        updated_at_ms: u64,
    ) -> Result<(), RelationalApiError>;

    /// Deletes one row.
    async fn delete_record(&self, record_id: RecordId) -> Result<(), RelationalApiError>;

    /// Reports usage numbers for the user's rows.
    async fn record_stats(&self, owner_id: &str) -> Result<RowStats, RelationalApiError>;

    /// Fetches the user's profile vault (empty if none stored yet).
    async fn fetch_profile_vault(&self, owner_id: &str)
        -> Result<ProfileVault, RelationalApiError>;

    /// Replaces the user's profile vault.
    async fn store_profile_vault(
        &self,
        owner_id: &str,
        vault: ProfileVault,
    ) -> Result<(), RelationalApiError>;
}

fn map_api_error(err: RelationalApiError, record_id: Option<RecordId>) -> BackendError {
    match err {
        RelationalApiError::Unauthorized(message) => BackendError::authentication(message),
        RelationalApiError::NotFound => match record_id {
            Some(id) => BackendError::not_found(id),
            None => BackendError::remote("row not found"),
        },
        RelationalApiError::SchemaUnavailable(message) => {
            BackendError::remote(format!("schema unavailable: {message}"))
        }
        RelationalApiError::Service(message) => BackendError::remote(message),
    }
}

/// Storage backend over the hosted relational store.
pub struct RelationalBackend<C: RelationalClient> {
    client: C,
}

impl<C: RelationalClient> RelationalBackend<C> {
    /// Creates a relational backend over the given client.
    pub fn new(client: C) -> Self {
        Self { client }
    }

    /// Returns a reference to the underlying client.
    pub fn client(&self) -> &C {
        &self.client
    }

    async fn ensure_session(&self, owner_id: &str) -> BackendResult<()> {
        match self.client.session_owner().await {
            Some(session) if session == owner_id => Ok(()),
            Some(session) => Err(BackendError::authentication(format!(
                "session user {session} does not match owner {owner_id}"
            ))),
            None => Err(BackendError::authentication("no active session")),
        }
    }

    /// Embeds a row into the profile document when the table is missing.
    async fn store_via_profile(&self, record: EncryptedRecord) -> BackendResult<()> {
        let owner_id = record.owner_id.clone();
        let mut vault = self
            .client
            .fetch_profile_vault(&owner_id)
            .await
            .map_err(|e| map_api_error(e, None))?;
        vault.records.push(record);
        self.client
            .store_profile_vault(&owner_id, vault)
            .await
            .map_err(|e| map_api_error(e, None))
    }
}

#[async_trait]
impl<C: RelationalClient> StorageBackend for RelationalBackend<C> {
    fn location(&self) -> StorageLocation {
        StorageLocation::Relational
    }

    async fn store(
        &self,
        owner_id: &str,
        value: &Document,
        data_type: &str,
        key: &CipherKey,
    ) -> BackendResult<RecordId> {
        self.ensure_session(owner_id).await?;

        let payload = CipherService::new(key).encrypt(value)?;
        let record =
            EncryptedRecord::new(owner_id, data_type, payload, StorageLocation::Relational);
        let record_id = record.id;

        match self.client.insert_record(record.clone()).await {
            Ok(()) => {
                debug!(owner = owner_id, data_type, id = %record_id, "stored relational row");
                Ok(record_id)
            }
            Err(RelationalApiError::SchemaUnavailable(reason)) => {
                warn!(
                    owner = owner_id,
                    reason = %reason,
                    "records table unavailable, embedding row in profile document"
                );
                self.store_via_profile(record).await?;
                Ok(record_id)
            }
            Err(other) => Err(map_api_error(other, None)),
        }
    }

    async fn retrieve(
        &self,
        owner_id: &str,
        data_type: &str,
        key: &CipherKey,
    ) -> BackendResult<Vec<Document>> {
        self.ensure_session(owner_id).await?;

        let rows = match self.client.select_records(owner_id, data_type).await {
            Ok(rows) => rows,
            Err(RelationalApiError::SchemaUnavailable(_)) => {
                let vault = self
                    .client
                    .fetch_profile_vault(owner_id)
                    .await
                    .map_err(|e| map_api_error(e, None))?;
                vault
                    .records
                    .into_iter()
                    .filter(|r| r.data_type == data_type)
                    .collect()
            }
            Err(other) => return Err(map_api_error(other, None)),
        };

        let service = CipherService::new(key);
        rows.iter()
            .map(|row| service.decrypt(&row.payload).map_err(BackendError::from))
            .collect()
    }

    async fn update(
        &self,
        record_id: RecordId,
        value: &Document,
        key: &CipherKey,
    ) -> BackendResult<()> {
        let payload = CipherService::new(key).encrypt(value)?;
        let updated_at_ms = now_millis();

        match self
            .client
            .update_record(record_id, payload.clone(), updated_at_ms)
            .await
        {
            Ok(()) => Ok(()),
            Err(RelationalApiError::SchemaUnavailable(_)) => {
                let owner = self
                    .client
                    .session_owner()
                    .await
                    .ok_or_else(|| BackendError::authentication("no active session"))?;
                let mut vault = self
                    .client
                    .fetch_profile_vault(&owner)
                    .await
                    .map_err(|e| map_api_error(e, None))?;
                let row = vault
                    .records
                    .iter_mut()
                    .find(|r| r.id == record_id)
                    .ok_or_else(|| BackendError::not_found(record_id))?;
                row.payload = payload;
                row.updated_at_ms = updated_at_ms;
                self.client
                    .store_profile_vault(&owner, vault)
                    .await
                    .map_err(|e| map_api_error(e, None))
            }
            Err(other) => Err(map_api_error(other, Some(record_id))),
        }
    }

    async fn delete(&self, record_id: RecordId) -> BackendResult<()> {
        match self.client.delete_record(record_id).await {
            Ok(()) => Ok(()),
            Err(RelationalApiError::SchemaUnavailable(_)) => {
                let owner = self
                    .client
                    .session_owner()
                    .await
                    .ok_or_else(|| BackendError::authentication("no active session"))?;
                let mut vault = self
                    .client
                    .fetch_profile_vault(&owner)
                    .await
                    .map_err(|e| map_api_error(e, None))?;
                let before = vault.records.len();
                vault.records.retain(|r| r.id != record_id);
                if vault.records.len() == before {
                    return Err(BackendError::not_found(record_id));
                }
                self.client
                    .store_profile_vault(&owner, vault)
                    .await
                    .map_err(|e| map_api_error(e, None))
            }
            Err(other) => Err(map_api_error(other, Some(record_id))),
        }
    }

    async fn stats(&self, owner_id: &str) -> BackendStats {
        if let Err(err) = self.ensure_session(owner_id).await {
            return BackendStats::failed(StorageLocation::Relational, err.to_string());
        }

        match self.client.record_stats(owner_id).await {
            Ok(rows) => BackendStats {
                location: StorageLocation::Relational,
                item_count: Some(rows.row_count),
                estimated_size_bytes: Some(rows.payload_bytes),
                last_sync_ms: rows.last_write_ms,
                error: None,
            },
            Err(RelationalApiError::SchemaUnavailable(_)) => {
                match self.client.fetch_profile_vault(owner_id).await {
                    Ok(vault) => BackendStats {
                        location: StorageLocation::Relational,
                        item_count: Some(vault.records.len() as u64),
                        estimated_size_bytes: Some(
                            vault.records.iter().map(|r| r.payload.len() as u64).sum(),
                        ),
                        last_sync_ms: vault.records.iter().map(|r| r.updated_at_ms).max(),
                        error: None,
                    },
                    Err(err) => {
                        BackendStats::failed(StorageLocation::Relational, err.to_string())
                    }
                }
            }
            Err(err) => BackendStats::failed(StorageLocation::Relational, err.to_string()),
        }
    }
}

pub use memory_client::MemoryRelationalClient;

mod memory_client {
    use super::*;
    use parking_lot::RwLock;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// In-memory [`RelationalClient`] with failure-injection switches.
    ///
    /// Serves unit tests and offline development the way a loopback server
    /// would: rows live in a `Vec`, profiles in a map, and the switches
    /// simulate a dropped session, a missing table, or a dead network.
    pub struct MemoryRelationalClient {
        session: RwLock<Option<String>>,
        schema_available: AtomicBool,
        online: AtomicBool,
        rows: RwLock<Vec<EncryptedRecord>>,
        profiles: RwLock<HashMap<String, ProfileVault>>,
    }

    impl MemoryRelationalClient {
        /// Creates a client with an authenticated session for `owner_id`,
        /// schema available, and the service online.
        pub fn new(owner_id: impl Into<String>) -> Self {
            Self {
                session: RwLock::new(Some(owner_id.into())),
                schema_available: AtomicBool::new(true),
                online: AtomicBool::new(true),
                rows: RwLock::new(Vec::new()),
                profiles: RwLock::new(HashMap::new()),
            }
        }

        /// Replaces the ambient session (None drops it).
        pub fn set_session(&self, owner_id: Option<String>) {
            *self.session.write() = owner_id;
        }

        /// Toggles availability of the dedicated records table.
        pub fn set_schema_available(&self, available: bool) {
            self.schema_available.store(available, Ordering::SeqCst);
        }

        /// Toggles the simulated network.
        pub fn set_online(&self, online: bool) {
            self.online.store(online, Ordering::SeqCst);
        }

        /// Number of rows in the dedicated table (not the profile).
        pub fn table_row_count(&self) -> usize {
            self.rows.read().len()
        }

        /// Number of rows embedded in `owner_id`'s profile document.
        pub fn profile_row_count(&self, owner_id: &str) -> usize {
            self.profiles
                .read()
                .get(owner_id)
                .map(|v| v.records.len())
                .unwrap_or(0)
        }

        fn check_online(&self) -> Result<(), RelationalApiError> {
            if self.online.load(Ordering::SeqCst) {
                Ok(())
            } else {
                Err(RelationalApiError::Service("connection refused".into()))
            }
        }

        fn check_session(&self) -> Result<String, RelationalApiError> {
            self.session
                .read()
                .clone()
                .ok_or_else(|| RelationalApiError::Unauthorized("no session".into()))
        }

        fn check_schema(&self) -> Result<(), RelationalApiError> {
            if self.schema_available.load(Ordering::SeqCst) {
                Ok(())
            } else {
                Err(RelationalApiError::SchemaUnavailable(
                    "relation \"vault_records\" does not exist".into(),
                ))
            }
        }
    }

    #[async_trait]
    impl RelationalClient for MemoryRelationalClient {
        async fn session_owner(&self) -> Option<String> {
            self.session.read().clone()
        }

        async fn insert_record(&self, row: EncryptedRecord) -> Result<(), RelationalApiError> {
            self.check_online()?;
            self.check_session()?;
            self.check_schema()?;
            self.rows.write().push(row);
            Ok(())
        }

        async fn select_records(
            &self,
            owner_id: &str,
            data_type: &str,
        ) -> Result<Vec<EncryptedRecord>, RelationalApiError> {
            self.check_online()?;
            self.check_session()?;
            self.check_schema()?;
            Ok(self
                .rows
                .read()
                .iter()
                .filter(|r| r.owner_id == owner_id && r.data_type == data_type)
                .cloned()
                .collect())
        }

        async fn update_record(
            &self,
            record_id: RecordId,
            payload: Vec<u8>,
            updated_at_ms: u64,
        ) -> Result<(), RelationalApiError> {
            self.check_online()?;
            self.check_session()?;
            self.check_schema()?;
            let mut rows = self.rows.write();
            let row = rows
                .iter_mut()
                .find(|r| r.id == record_id)
                .ok_or(RelationalApiError::NotFound)?;
            row.payload = payload;
            row.updated_at_ms = updated_at_ms;
            Ok(())
        }

        async fn delete_record(&self, record_id: RecordId) -> Result<(), RelationalApiError> {
            self.check_online()?;
            self.check_session()?;
            self.check_schema()?;
            let mut rows = self.rows.write();
            let before = rows.len();
            rows.retain(|r| r.id != record_id);
            if rows.len() == before {
                return Err(RelationalApiError::NotFound);
            }
            Ok(())
        }

        async fn record_stats(&self, owner_id: &str) -> Result<RowStats, RelationalApiError> {
            self.check_online()?;
            self.check_session()?;
            self.check_schema()?;
            let rows = self.rows.read();
            let mine: Vec<_> = rows.iter().filter(|r| r.owner_id == owner_id).collect();
            Ok(RowStats {
                row_count: mine.len() as u64,
                payload_bytes: mine.iter().map(|r| r.payload.len() as u64).sum(),
                last_write_ms: mine.iter().map(|r| r.updated_at_ms).max(),
            })
        }

        async fn fetch_profile_vault(
            &self,
            owner_id: &str,
        ) -> Result<ProfileVault, RelationalApiError> {
            self.check_online()?;
            self.check_session()?;
            Ok(self
                .profiles
                .read()
                .get(owner_id)
                .cloned()
                .unwrap_or_default())
        }

        async fn store_profile_vault(
            &self,
            owner_id: &str,
            vault: ProfileVault,
        ) -> Result<(), RelationalApiError> {
            self.check_online()?;
            self.check_session()?;
            self.profiles.write().insert(owner_id.to_string(), vault);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn backend() -> RelationalBackend<MemoryRelationalClient> {
        RelationalBackend::new(MemoryRelationalClient::new("u1"))
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
        assert_eq!(backend.client().table_row_count(), 1);
    }

    #[tokio::test]
    async fn session_mismatch_is_authentication_error() {
        let backend = backend();
        let key = CipherKey::generate();

        let result = backend
            .store("someone_else", &json!({}), "medicines", &key)
            .await;
        assert!(matches!(result, Err(BackendError::Authentication { .. })));
    }

    #[tokio::test]
    async fn dropped_session_is_authentication_error() {
        let backend = backend();
        let key = CipherKey::generate();
        backend.client().set_session(None);

        let result = backend.retrieve("u1", "medicines", &key).await;
        assert!(matches!(result, Err(BackendError::Authentication { .. })));
    }

    #[tokio::test]
    async fn offline_service_is_remote_error() {
        let backend = backend();
        let key = CipherKey::generate();
        backend.client().set_online(false);

        let result = backend.store("u1", &json!({}), "medicines", &key).await;
        assert!(matches!(result, Err(BackendError::Remote { .. })));
    }

    #[tokio::test]
    async fn schema_fallback_stores_into_profile() {
        let backend = backend();
        let key = CipherKey::generate();
        backend.client().set_schema_available(false);

        backend
            .store("u1", &json!({"name": "Amoxicillin"}), "medicines", &key)
            .await
            .unwrap();

        assert_eq!(backend.client().table_row_count(), 0);
        assert_eq!(backend.client().profile_row_count("u1"), 1);

        // Still retrievable by data type through the fallback read path.
        let docs = backend.retrieve("u1", "medicines", &key).await.unwrap();
        assert_eq!(docs, vec![json!({"name": "Amoxicillin"})]);

        let other = backend.retrieve("u1", "sales", &key).await.unwrap();
        assert!(other.is_empty());
    }

    #[tokio::test]
    async fn schema_fallback_update_and_delete() {
        let backend = backend();
        let key = CipherKey::generate();
        backend.client().set_schema_available(false);

        let id = backend
            .store("u1", &json!({"stock": 5}), "medicines", &key)
            .await
            .unwrap();

        backend.update(id, &json!({"stock": 7}), &key).await.unwrap();
        let docs = backend.retrieve("u1", "medicines", &key).await.unwrap();
        assert_eq!(docs, vec![json!({"stock": 7})]);

        backend.delete(id).await.unwrap();
        assert_eq!(backend.client().profile_row_count("u1"), 0);
        assert!(matches!(
            backend.delete(id).await,
            Err(BackendError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn update_missing_row_is_not_found() {
        let backend = backend();
        let key = CipherKey::generate();
        let result = backend.update(RecordId::new(), &json!({}), &key).await;
        assert!(matches!(result, Err(BackendError::NotFound { .. })));
    }

    #[tokio::test]
    async fn retrieve_succeeds_empty() {
        let backend = backend();
        let key = CipherKey::generate();
        let docs = backend.retrieve("u1", "batches", &key).await.unwrap();
        assert!(docs.is_empty());
    }

    #[tokio::test]
    async fn stats_report_rows() {
        let backend = backend();
        let key = CipherKey::generate();
        backend
            .store("u1", &json!({"a": 1}), "medicines", &key)
            .await
            .unwrap();

        let stats = backend.stats("u1").await;
        assert!(stats.is_ok());
        assert_eq!(stats.item_count, Some(1));
        assert!(stats.last_sync_ms.is_some());
    }

    #[tokio::test]
    async fn stats_fall_back_to_profile_rows() {
        let backend = backend();
        let key = CipherKey::generate();
        backend.client().set_schema_available(false);
        backend
            .store("u1", &json!({"a": 1}), "medicines", &key)
            .await
            .unwrap();

        let stats = backend.stats("u1").await;
        assert!(stats.is_ok());
        assert_eq!(stats.item_count, Some(1));
    }

    #[tokio::test]
    async fn stats_carry_error_instead_of_failing() {
        let backend = backend();
        backend.client().set_online(false);

        let stats = backend.stats("u1").await;
        assert!(!stats.is_ok());
        assert!(stats.error.is_some());
        assert_eq!(stats.item_count, None);
    }
}
