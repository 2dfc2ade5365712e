//! `list` command: decrypt and list records of one data type.

use super::CliResult;
use std::path::Path;

pub async fn run(vault: &Path, user: &str, key: &str, data_type: &str, format: &str) -> CliResult {
    let manager = super::open_manager(vault, user, key)?;
    let documents = manager.retrieve_data(data_type).await?;

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&documents)?),
        _ => {
            if documents.is_empty() {
                println!("no {data_type} records");
            }
            for (i, doc) in documents.iter().enumerate() {
                println!("{:>4}  {}", i + 1, doc);
            }
        }
    }
    Ok(())
}
