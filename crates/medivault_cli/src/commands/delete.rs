//! `delete` command: delete a record by id.

use super::CliResult;
use medivault_backend::{RecordId, StorageBackend};
use std::path::Path;

pub async fn run(vault: &Path, id: &str) -> CliResult {
    let record_id: RecordId = id.parse()?;
    let backend = super::open_vault(vault)?;

    backend.delete(record_id).await?;
    println!("deleted {record_id}");
    Ok(())
}
