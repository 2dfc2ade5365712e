//! Error types for storage backends.

use crate::device::DeviceStoreError;
use crate::record::RecordId;
use medivault_cipher::CipherError;
use thiserror::Error;

/// Result type for backend operations.
pub type BackendResult<T> = Result<T, BackendError>;

/// Errors that can occur during backend operations.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The backend is not authenticated, or its credentials are invalid.
    #[error("not authenticated: {message}")]
    Authentication {
        /// Description of the failure.
        message: String,
    },

    /// The requested record does not exist in this backend.
    #[error("record not found: {record_id}")]
    NotFound {
        /// The record that was not found.
        record_id: RecordId,
    },

    /// The device store rejected a write for being over its capacity
    /// quota, even after eviction.
    #[error("device storage quota exceeded: {needed_bytes} bytes needed, {quota_bytes} quota")]
    QuotaExceeded {
        /// Bytes the write would have required.
        needed_bytes: u64,
        /// The configured quota.
        quota_bytes: u64,
    },

    /// A network or remote-service failure.
    #[error("remote error: {message}")]
    Remote {
        /// Description of the failure.
        message: String,
    },

    /// Device store failure (I/O, lock contention, corruption).
    #[error("device store error: {0}")]
    Storage(String),

    /// Encryption or decryption failed.
    #[error(transparent)]
    Cipher(#[from] CipherError),

    /// Record metadata could not be encoded or decoded.
    #[error("record codec error: {0}")]
    Codec(#[from] medivault_codec::CodecError),
}

impl BackendError {
    /// Creates an authentication error.
    pub fn authentication(message: impl Into<String>) -> Self {
        Self::Authentication {
            message: message.into(),
        }
    }

    /// Creates a not-found error.
    #[must_use]
    pub fn not_found(record_id: RecordId) -> Self {
        Self::NotFound { record_id }
    }

    /// Creates a remote error.
    pub fn remote(message: impl Into<String>) -> Self {
        Self::Remote {
            message: message.into(),
        }
    }

    /// Creates a device store error.
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage(message.into())
    }
}

impl From<DeviceStoreError> for BackendError {
    fn from(err: DeviceStoreError) -> Self {
        match err {
            DeviceStoreError::QuotaExceeded {
                needed_bytes,
                quota_bytes,
            } => Self::QuotaExceeded {
                needed_bytes,
                quota_bytes,
            },
            other => Self::Storage(other.to_string()),
        }
    }
}
