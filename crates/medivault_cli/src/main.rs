//! MediVault CLI
//!
//! Operator tools for a file-backed local vault.
//!
//! # Commands
//!
//! - `keygen` - Generate an account key and print its digest
//! - `store` - Encrypt and store a JSON document
//! - `list` - Decrypt and list records of one data type
//! - `delete` - Delete a record by id
//! - `stats` - Show storage usage

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// MediVault command-line vault tools.
#[derive(Parser)]
#[command(name = "medivault")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the local vault file
    #[arg(global = true, short = 'p', long, default_value = "medivault.vault")]
    vault: PathBuf,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a new account key and print its one-way digest
    Keygen,

    /// Encrypt a JSON document and store it in the vault
    Store {
        /// Owning user id
        #[arg(short, long)]
        user: String,

        /// Account key (base64, from keygen)
        #[arg(short, long)]
        key: String,

        /// Logical collection, e.g. medicines, sales, batches
        #[arg(short = 't', long)]
        data_type: String,

        /// The JSON document to store
        value: String,
    },

    /// Decrypt and list records of one data type
    List {
        /// Owning user id
        #[arg(short, long)]
        user: String,

        /// Account key (base64)
        #[arg(short, long)]
        key: String,

        /// Logical collection to list
        #[arg(short = 't', long)]
        data_type: String,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Delete a record by id
    Delete {
        /// The record id to delete
        id: String,
    },

    /// Show storage usage for a user
    Stats {
        /// Owning user id
        #[arg(short, long)]
        user: String,

        /// Account key (base64)
        #[arg(short, long)]
        key: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Keygen => commands::keygen::run(),
        Commands::Store {
            user,
            key,
            data_type,
            value,
        } => commands::store::run(&cli.vault, &user, &key, &data_type, &value).await,
        Commands::List {
            user,
            key,
            data_type,
            format,
        } => commands::list::run(&cli.vault, &user, &key, &data_type, &format).await,
        Commands::Delete { id } => commands::delete::run(&cli.vault, &id).await,
        Commands::Stats { user, key } => commands::stats::run(&cli.vault, &user, &key).await,
    }
}
