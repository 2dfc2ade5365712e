//! `stats` command: show storage usage.

use super::CliResult;
use std::path::Path;

pub async fn run(vault: &Path, user: &str, key: &str) -> CliResult {
    let manager = super::open_manager(vault, user, key)?;

    for (location, stats) in manager.get_storage_stats().await? {
        match stats.error {
            Some(error) => println!("{location}: unavailable ({error})"),
            None => {
                println!(
                    "{location}: {} records, ~{} bytes",
                    stats.item_count.unwrap_or(0),
                    stats.estimated_size_bytes.unwrap_or(0)
                );
                if let Some(ms) = stats.last_sync_ms {
                    println!("  last write: {ms} (unix ms)");
                }
            }
        }
    }
    Ok(())
}
