//! Command implementations.

pub mod delete;
pub mod keygen;
pub mod list;
pub mod stats;
pub mod store;

use medivault_backend::{FileDeviceStore, LocalBackend, StorageLocation};
use medivault_cipher::CipherKey;
use medivault_manager::{StorageConfig, StorageManager};
use std::path::Path;
use std::sync::Arc;

type CliResult = Result<(), Box<dyn std::error::Error>>;

/// Opens the file-backed local vault.
fn open_vault(path: &Path) -> Result<LocalBackend<FileDeviceStore>, Box<dyn std::error::Error>> {
    Ok(LocalBackend::new(FileDeviceStore::open(path)?))
}

/// Builds a manager over the local vault only.
fn open_manager(
    path: &Path,
    user: &str,
    key: &str,
) -> Result<StorageManager, Box<dyn std::error::Error>> {
    let key = CipherKey::decode(key)?;
    let config = StorageConfig::new(user, key, vec![StorageLocation::Local])?;
    let manager = StorageManager::new(config, vec![Arc::new(open_vault(path)?)])?;
    Ok(manager)
}
