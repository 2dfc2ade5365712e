//! # MediVault Manager
//!
//! Multi-backend orchestration for MediVault.
//!
//! The storage manager is the entire surface the application layer sees:
//! it fans a logical write out to every backend the user enabled, reads
//! back from whichever enabled backend answers first in priority order,
//! copies records across backends on demand, and aggregates usage
//! statistics. Callers never touch per-backend ciphertext or raw keys.
//!
//! ## Consistency Model
//!
//! Deliberately weak: writes are best-effort fan-out (no cross-backend
//! transaction), reads come from exactly one backend per call (no
//! merging), and sync is append-only copying with no deduplication.
//! Partial failures are recovered whenever at least one backend succeeds
//! and surfaced in aggregate when none does.
//!
//! ## Usage
//!
//! ```
//! use std::sync::Arc;
//! use medivault_backend::{LocalBackend, MemoryDeviceStore, StorageLocation};
//! use medivault_cipher::CipherKey;
//! use medivault_manager::{StorageConfig, StorageManager};
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let config = StorageConfig::new(
//!     "user-1",
//!     CipherKey::generate(),
//!     vec![StorageLocation::Local],
//! ).unwrap();
//! let manager = StorageManager::new(
//!     config,
//!     vec![Arc::new(LocalBackend::new(MemoryDeviceStore::new()))],
//! ).unwrap();
//!
//! manager.store_data(&serde_json::json!({"name": "Paracetamol"}), "medicines")
//!     .await
//!     .unwrap();
//! let medicines = manager.retrieve_data("medicines").await.unwrap();
//! assert_eq!(medicines.len(), 1);
//! # });
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
mod manager;

pub use config::StorageConfig;
pub use error::{ManagerError, ManagerResult};
pub use manager::{StorageManager, StoreOutcome, SyncReport, DEFAULT_CALL_TIMEOUT};
