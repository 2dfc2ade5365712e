//! Error types for the storage manager.

use medivault_backend::{BackendError, StorageLocation};
use thiserror::Error;

/// Result type for manager operations.
pub type ManagerResult<T> = Result<T, ManagerError>;

/// Errors that can occur in the storage manager.
#[derive(Debug, Error)]
pub enum ManagerError {
    /// The configuration enables no backends. This is a programming
    /// error, not a backend failure.
    #[error("no storage backends configured")]
    NoBackendsConfigured,

    /// The same backend appears twice in the configured order.
    #[error("backend {0} configured more than once")]
    DuplicateBackend(StorageLocation),

    /// The configuration enables a backend no instance was registered
    /// for.
    #[error("no backend instance registered for {0}")]
    BackendNotRegistered(StorageLocation),

    /// Every attempted backend failed. Carries one sub-error per backend,
    /// in configured priority order; none are dropped.
    #[error("all enabled backends failed: {}", format_failures(.errors))]
    AllBackendsFailed {
        /// Per-backend failures, in configured order.
        errors: Vec<(StorageLocation, BackendError)>,
    },

    /// A value could not be converted to or from the document form.
    #[error("invalid record value: {0}")]
    InvalidRecord(String),
}

fn format_failures(errors: &[(StorageLocation, BackendError)]) -> String {
    errors
        .iter()
        .map(|(location, error)| format!("{location}: {error}"))
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregate_display_lists_every_backend() {
        let err = ManagerError::AllBackendsFailed {
            errors: vec![
                (StorageLocation::Local, BackendError::storage("disk full")),
                (StorageLocation::Relational, BackendError::remote("503")),
            ],
        };
        let text = err.to_string();
        assert!(text.contains("local"));
        assert!(text.contains("disk full"));
        assert!(text.contains("relational"));
        assert!(text.contains("503"));
    }
}
