//! # Joe AI CLI (`joe`)
//!
//! ## Usage
//!
//! ```bash
//! joe --config ./config/joe.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `joe init` | Create the store directory, schema and collection |
//! | `joe ingest` | Chunk and embed the documents root (skipped when populated) |
//! | `joe search "<query>"` | Show the nearest chunks for a query |
//! | `joe ask "<message>"` | Answer one message in the persona's voice |
//!
//! Logs go to stderr (`RUST_LOG`, default `info`); answers go to stdout.

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use joe_ai::answer;
use joe_ai::config;
use joe_ai::ingest;
use joe_ai::search;
use joe_ai::store::sqlite::SqliteStore;
use joe_ai::store::VectorStore;

/// Joe AI: a persona-constrained retrieval-augmented chat assistant.
#[derive(Parser)]
#[command(name = "joe", version)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/joe.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the store directory and schema. Safe to run repeatedly.
    Init,

    /// Ingest the documents root into the store.
    ///
    /// Does nothing when the store already holds chunks.
    Ingest,

    /// Show the chunks closest to a query.
    ///
    /// Reads the store as it is; run `joe ingest` first.
    Search {
        query: String,
        /// Number of results (defaults to `retrieval.top_k`).
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Answer a single message.
    Ask { message: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)
        .with_context(|| format!("loading config {}", cli.config.display()))?;

    match cli.command {
        Commands::Init => {
            let store = SqliteStore::open(&cfg.store.path, &cfg.store.collection).await?;
            store
                .ensure_ready(cfg.embedding.model_id(), cfg.embedding.dims)
                .await?;
            store.close().await;
            println!("initialized");
        }
        Commands::Ingest => {
            ingest::run_ingest(&cfg).await?;
        }
        Commands::Search { query, limit } => {
            search::run_search(&cfg, &query, limit).await?;
        }
        Commands::Ask { message } => {
            answer::run_ask(&cfg, &message).await?;
        }
    }

    Ok(())
}
