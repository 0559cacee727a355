//! # solplay-sync
//!
//! Mirrors the SolPlay program's ledger state into a local SQLite store and
//! serves the chunk-tracking HTTP API.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use node_runtime::{NodeRuntime, SyncConfig};
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Debug, Parser)]
#[command(name = "solplay-sync", version, about = "SolPlay ledger sync service")]
struct Args {
    /// Path to a TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .with_thread_ids(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args = Args::parse();
    let config = SyncConfig::load(args.config.as_deref()).context("failed to load config")?;

    let runtime = NodeRuntime::build(config)?;
    runtime.start().await?;

    info!("Press Ctrl+C to shutdown");
    tokio::signal::ctrl_c().await?;

    runtime.shutdown().await;
    Ok(())
}
