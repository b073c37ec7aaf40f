//! Coinbase trade adapter binary.

use anyhow::{Context, Result};
use clap::Parser;
use coinbase_adapter::CoinbaseAdapter;
use config::PipelineConfig;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "coinbase_adapter", about = "Coinbase match-channel adapter")]
struct Args {
    /// Path to the pipeline config file
    #[arg(long, default_value = "dexflow.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let pipeline = PipelineConfig::load(&args.config)
        .with_context(|| format!("loading config from {}", args.config.display()))?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&pipeline.log_level).unwrap_or_default())
        .init();

    let mut adapter = CoinbaseAdapter::new(&pipeline).context("building coinbase adapter")?;
    adapter.run().await.context("coinbase adapter terminated")?;
    Ok(())
}
