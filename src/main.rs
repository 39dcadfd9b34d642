use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use clipsync_lib::bootstrap::{self, tracing::init_tracing_subscriber};
use cs_core::ports::KeyValueStorePort;
use cs_infra::{FileKeyValueStore, InMemoryKeyValueStore, IntervalWakeTrigger};
use tokio::io::BufReader;
use tracing::info;

/// Clipboard capture and multi-device sync engine.
///
/// Reads lines from stdin: plain text is captured as a copy event, lines
/// starting with `/` are commands (`/sync`, `/items`, `/upload <text>`,
/// `/delete <id>`, `/enable`, `/disable`, `/login <user>`, `/logout`,
/// `/wake`, `/quit`). Responses and notifications are printed as JSON lines.
#[derive(Debug, Parser)]
#[command(name = "clipsync", version)]
struct Cli {
    /// Path to config.toml
    #[arg(long)]
    config: Option<PathBuf>,

    /// Path to the durable storage file
    #[arg(long, conflicts_with = "ephemeral")]
    storage: Option<PathBuf>,

    /// Keep all local state in memory
    #[arg(long)]
    ephemeral: bool,

    /// Sign in as this user on startup
    #[arg(long)]
    user: Option<String>,

    /// Log to stderr only
    #[arg(long)]
    no_file_log: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_dir = if cli.no_file_log {
        None
    } else {
        cs_infra::fs::logs_dir().ok()
    };
    init_tracing_subscriber(log_dir.as_deref())?;

    let config = bootstrap::resolve_config(cli.config, cs_infra::fs::default_config_file().ok())?;

    let storage: Arc<dyn KeyValueStorePort> = if cli.ephemeral {
        Arc::new(InMemoryKeyValueStore::new())
    } else {
        let path = match cli.storage {
            Some(path) => path,
            None => cs_infra::fs::storage_file().context("Failed to resolve storage path")?,
        };
        info!(path = %path.display(), "using file storage");
        Arc::new(FileKeyValueStore::new(path))
    };

    let wired = bootstrap::wire(config, storage);
    if let Some(user) = cli.user {
        wired.cloud.sign_in(user);
    }

    bootstrap::run(
        wired,
        Arc::new(IntervalWakeTrigger),
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
    )
    .await
}
