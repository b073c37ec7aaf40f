//! Polygon DEX adapter binary.
//!
//! ```text
//! polygon_adapter --config dexflow.toml
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use config::PipelineConfig;
use polygon_adapter::PolygonAdapter;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "polygon_adapter", about = "Polygon DEX event adapter")]
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

    let mut adapter = PolygonAdapter::new(&pipeline).context("building polygon adapter")?;
    adapter.run().await.context("polygon adapter terminated")?;
    Ok(())
}
