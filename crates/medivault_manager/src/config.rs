//! Storage configuration.

use crate::error::{ManagerError, ManagerResult};
use medivault_backend::StorageLocation;
use medivault_cipher::CipherKey;

/// A user's storage choices for the lifetime of a manager.
///
/// The backend order is significant: it is the read-failover priority, and
/// the first entry is the source of truth for sync. The key lives only in
/// memory and is dropped (and zeroized) with the configuration.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    user_id: String,
    key: CipherKey,
    backends: Vec<StorageLocation>,
}

impl StorageConfig {
    /// Creates a configuration from a user id, their session key, and the
    /// ordered list of enabled backends.
    ///
    /// # Errors
    ///
    /// Returns [`ManagerError::DuplicateBackend`] if a backend appears
    /// more than once.
    pub fn new(
        user_id: impl Into<String>,
        key: CipherKey,
        backends: Vec<StorageLocation>,
    ) -> ManagerResult<Self> {
        for (i, location) in backends.iter().enumerate() {
            if backends[..i].contains(location) {
                return Err(ManagerError::DuplicateBackend(*location));
            }
        }
        Ok(Self {
            user_id: user_id.into(),
            key,
            backends,
        })
    }

    /// The owning user.
    #[must_use]
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// The session encryption key.
    #[must_use]
    pub fn key(&self) -> &CipherKey {
        &self.key
    }

    /// Enabled backends in priority order.
    #[must_use]
    pub fn backends(&self) -> &[StorageLocation] {
        &self.backends
    }

    /// The sync source of truth: the first configured backend, if any.
    #[must_use]
    pub fn primary(&self) -> Option<StorageLocation> {
        self.backends.first().copied()
    }
}
