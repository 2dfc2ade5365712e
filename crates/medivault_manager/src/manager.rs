//! Multi-backend orchestration.

use crate::config::StorageConfig;
use crate::error::{ManagerError, ManagerResult};
use futures::future::join_all;
use medivault_backend::{
    BackendError, BackendStats, Document, RecordId, StorageBackend, StorageLocation,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Default ceiling for a single backend call.
///
/// A hung network call fails the attempt instead of blocking the whole
/// operation indefinitely.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Per-backend results of a fan-out write.
///
/// Entries keep the configured priority order. A partial success (some
/// backends persisted, some failed) is still a success overall; callers
/// inspect which backends actually hold the data.
#[derive(Debug)]
pub struct StoreOutcome {
    results: Vec<(StorageLocation, Result<RecordId, BackendError>)>,
}

impl StoreOutcome {
    /// All per-backend results, in configured order.
    #[must_use]
    pub fn results(&self) -> &[(StorageLocation, Result<RecordId, BackendError>)] {
        &self.results
    }

    /// Backends that persisted the record, with the generated IDs.
    pub fn succeeded(&self) -> impl Iterator<Item = (StorageLocation, RecordId)> + '_ {
        self.results
            .iter()
            .filter_map(|(location, result)| result.as_ref().ok().map(|id| (*location, *id)))
    }

    /// Backends that failed, with their errors.
    pub fn failed(&self) -> impl Iterator<Item = (StorageLocation, &BackendError)> + '_ {
        self.results
            .iter()
            .filter_map(|(location, result)| result.as_ref().err().map(|e| (*location, e)))
    }

    /// Whether some backends succeeded while others failed.
    #[must_use]
    pub fn is_partial(&self) -> bool {
        self.succeeded().next().is_some() && self.failed().next().is_some()
    }

    /// The record ID generated by one backend, if it succeeded.
    #[must_use]
    pub fn record_id(&self, location: StorageLocation) -> Option<RecordId> {
        self.succeeded()
            .find(|(l, _)| *l == location)
            .map(|(_, id)| id)
    }
}

/// Per-backend results of a sync pass.
#[derive(Debug)]
pub struct SyncReport {
    /// The backend the records were read from.
    pub source: StorageLocation,
    /// For each destination backend: the number of records copied, or the
    /// error that stopped copying into it.
    pub destinations: Vec<(StorageLocation, Result<u64, BackendError>)>,
}

/// Orchestrates a user's enabled storage backends.
///
/// Holds a [`StorageConfig`] for its lifetime and is otherwise stateless:
/// every operation builds its outcome fresh. Backends are shared
/// `Arc<dyn StorageBackend>` instances registered at construction; the
/// configuration selects which of them are enabled and in what order.
pub struct StorageManager {
    config: StorageConfig,
    backends: HashMap<StorageLocation, Arc<dyn StorageBackend>>,
    call_timeout: Duration,
}

impl StorageManager {
    /// Creates a manager from a configuration and the available backend
    /// instances.
    ///
    /// # Errors
    ///
    /// Returns [`ManagerError::BackendNotRegistered`] if the configuration
    /// enables a backend with no matching instance.
    pub fn new(
        config: StorageConfig,
        instances: Vec<Arc<dyn StorageBackend>>,
    ) -> ManagerResult<Self> {
        let mut backends = HashMap::new();
        for instance in instances {
            backends.insert(instance.location(), instance);
        }
        for location in config.backends() {
            if !backends.contains_key(location) {
                return Err(ManagerError::BackendNotRegistered(*location));
            }
        }
        Ok(Self {
            config,
            backends,
            call_timeout: DEFAULT_CALL_TIMEOUT,
        })
    }

    /// Overrides the per-backend call timeout.
    #[must_use]
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// The configuration this manager was built with.
    #[must_use]
    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    fn enabled_backends(&self) -> ManagerResult<Vec<(StorageLocation, Arc<dyn StorageBackend>)>> {
        if self.config.backends().is_empty() {
            return Err(ManagerError::NoBackendsConfigured);
        }
        self.config
            .backends()
            .iter()
            .map(|location| {
                self.backends
                    .get(location)
                    .map(|backend| (*location, Arc::clone(backend)))
                    .ok_or(ManagerError::BackendNotRegistered(*location))
            })
            .collect()
    }

    async fn call_with_timeout<T>(
        &self,
        location: StorageLocation,
        call: impl Future<Output = Result<T, BackendError>>,
    ) -> Result<T, BackendError> {
        match tokio::time::timeout(self.call_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(BackendError::remote(format!(
                "call to {location} timed out after {:?}",
                self.call_timeout
            ))),
        }
    }

    /// Writes `value` to every enabled backend.
    ///
    /// All backends are attempted concurrently and independently; the call
    /// resolves once every attempt has completed. This is best-effort
    /// fan-out, not a transaction: a partial success is reported as
    /// success with per-backend detail.
    ///
    /// # Errors
    ///
    /// Returns [`ManagerError::AllBackendsFailed`] only when every
    /// attempt failed, carrying each backend's error.
    pub async fn store_data<T: Serialize>(
        &self,
        value: &T,
        data_type: &str,
    ) -> ManagerResult<StoreOutcome> {
        let enabled = self.enabled_backends()?;
        let doc =
            serde_json::to_value(value).map_err(|e| ManagerError::InvalidRecord(e.to_string()))?;

        let attempts = enabled.iter().map(|(location, backend)| {
            let doc = &doc;
            async move {
                let result = self
                    .call_with_timeout(
                        *location,
                        backend.store(self.config.user_id(), doc, data_type, self.config.key()),
                    )
                    .await;
                (*location, result)
            }
        });
        let results: Vec<(StorageLocation, Result<RecordId, BackendError>)> =
            join_all(attempts).await;

        for (location, result) in &results {
            match result {
                Ok(id) => debug!(backend = %location, id = %id, data_type, "store succeeded"),
                Err(error) => warn!(backend = %location, %error, data_type, "store failed"),
            }
        }

        if results.iter().all(|(_, result)| result.is_err()) {
            let errors = results
                .into_iter()
                .filter_map(|(location, result)| result.err().map(|e| (location, e)))
                .collect();
            return Err(ManagerError::AllBackendsFailed { errors });
        }
        Ok(StoreOutcome { results })
    }

    /// Reads all records of `data_type` from the first backend that
    /// answers.
    ///
    /// Backends are tried strictly in configured priority order, one at a
    /// time. A backend that succeeds (even with zero records) is the sole
    /// source for this call and later backends are never attempted.
    /// Results from different backends are never merged.
    ///
    /// # Errors
    ///
    /// Returns [`ManagerError::AllBackendsFailed`] when every backend's
    /// call failed.
    pub async fn retrieve_data(&self, data_type: &str) -> ManagerResult<Vec<Document>> {
        let enabled = self.enabled_backends()?;

        let mut errors = Vec::new();
        for (location, backend) in enabled {
            match self
                .call_with_timeout(
                    location,
                    backend.retrieve(self.config.user_id(), data_type, self.config.key()),
                )
                .await
            {
                Ok(documents) => {
                    debug!(backend = %location, count = documents.len(), data_type, "retrieve served");
                    return Ok(documents);
                }
                Err(error) => {
                    warn!(backend = %location, %error, data_type, "retrieve failed, trying next backend");
                    errors.push((location, error));
                }
            }
        }
        Err(ManagerError::AllBackendsFailed { errors })
    }

    /// [`retrieve_data`](Self::retrieve_data) with conversion into a typed
    /// model.
    pub async fn retrieve_as<T: DeserializeOwned>(&self, data_type: &str) -> ManagerResult<Vec<T>> {
        self.retrieve_data(data_type)
            .await?
            .into_iter()
            .map(|doc| {
                serde_json::from_value(doc).map_err(|e| ManagerError::InvalidRecord(e.to_string()))
            })
            .collect()
    }

    /// Copies all records of `data_type` from the primary backend into
    /// every other enabled backend.
    ///
    /// The first configured backend is the source of truth. Copying is
    /// append-only with no identity or deduplication check: records carry
    /// no cross-backend identity, so running sync twice doubles the copies
    /// in non-primary backends. Callers are expected to treat this as a
    /// one-off seeding step, not a convergence protocol.
    ///
    /// # Errors
    ///
    /// Returns [`ManagerError::AllBackendsFailed`] if the primary read
    /// fails, or if every destination backend failed.
    pub async fn sync_data(&self, data_type: &str) -> ManagerResult<SyncReport> {
        let enabled = self.enabled_backends()?;
        let (source, primary) = (enabled[0].0, Arc::clone(&enabled[0].1));

        let documents = self
            .call_with_timeout(
                source,
                primary.retrieve(self.config.user_id(), data_type, self.config.key()),
            )
            .await
            .map_err(|error| ManagerError::AllBackendsFailed {
                errors: vec![(source, error)],
            })?;

        debug!(backend = %source, count = documents.len(), data_type, "syncing from primary");

        let mut destinations: Vec<(StorageLocation, Result<u64, BackendError>)> = Vec::new();
        for (location, backend) in enabled.iter().skip(1) {
            let mut copied = 0u64;
            let mut failure = None;
            for doc in &documents {
                match self
                    .call_with_timeout(
                        *location,
                        backend.store(self.config.user_id(), doc, data_type, self.config.key()),
                    )
                    .await
                {
                    Ok(_) => copied += 1,
                    Err(error) => {
                        failure = Some(error);
                        break;
                    }
                }
            }
            match failure {
                Some(error) => {
                    warn!(backend = %location, %error, copied, data_type, "sync into backend failed");
                    destinations.push((*location, Err(error)));
                }
                None => destinations.push((*location, Ok(copied))),
            }
        }

        if !destinations.is_empty() && destinations.iter().all(|(_, result)| result.is_err()) {
            let errors = destinations
                .into_iter()
                .filter_map(|(location, result)| result.err().map(|e| (location, e)))
                .collect();
            return Err(ManagerError::AllBackendsFailed { errors });
        }
        Ok(SyncReport {
            source,
            destinations,
        })
    }

    /// Gathers a usage summary from every enabled backend.
    ///
    /// A failing backend contributes an error-carrying entry instead of
    /// aborting the whole call.
    pub async fn get_storage_stats(
        &self,
    ) -> ManagerResult<BTreeMap<StorageLocation, BackendStats>> {
        let enabled = self.enabled_backends()?;

        let gathers = enabled.iter().map(|(location, backend)| async move {
            match tokio::time::timeout(self.call_timeout, backend.stats(self.config.user_id()))
                .await
            {
                Ok(stats) => (*location, stats),
                Err(_) => (
                    *location,
                    BackendStats::failed(*location, "stats call timed out"),
                ),
            }
        });
        Ok(join_all(gathers).await.into_iter().collect())
    }
}

impl std::fmt::Debug for StorageManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageManager")
            .field("user_id", &self.config.user_id())
            .field("backends", &self.config.backends())
            .field("call_timeout", &self.call_timeout)
            .finish()
    }
}
