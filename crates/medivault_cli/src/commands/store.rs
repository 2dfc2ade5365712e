//! `store` command: encrypt and store a JSON document.

use super::CliResult;
use std::path::Path;

pub async fn run(vault: &Path, user: &str, key: &str, data_type: &str, value: &str) -> CliResult {
    let document: serde_json::Value = serde_json::from_str(value)?;
    let manager = super::open_manager(vault, user, key)?;

    tracing::debug!(user, data_type, "storing document");
    let outcome = manager.store_data(&document, data_type).await?;
    for (location, id) in outcome.succeeded() {
        println!("stored {id} in {location}");
    }
    Ok(())
}
