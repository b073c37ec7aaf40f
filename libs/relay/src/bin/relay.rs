//! Relay service binary: one process per domain.
//!
//! ```text
//! relay --domain market-data --config dexflow.toml
//! ```

use anyhow::{bail, Context, Result};
use clap::Parser;
use codec::RelayDomain;
use config::PipelineConfig;
use relay::{ExecutionLogic, MarketDataLogic, Relay, RelayRuntimeConfig, SignalLogic};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "relay", about = "Dexflow fan-out relay")]
struct Args {
    /// Relay domain: market-data, signal, or execution
    #[arg(long)]
    domain: String,

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

    let domain = match args.domain.as_str() {
        "market-data" | "marketdata" => RelayDomain::MarketData,
        "signal" | "signals" => RelayDomain::Signal,
        "execution" => RelayDomain::Execution,
        other => bail!("unknown relay domain: {other}"),
    };
    let runtime = RelayRuntimeConfig::from_pipeline(&pipeline, domain);

    match domain {
        RelayDomain::MarketData => Relay::new(MarketDataLogic, runtime).run().await?,
        RelayDomain::Signal => Relay::new(SignalLogic, runtime).run().await?,
        RelayDomain::Execution => Relay::new(ExecutionLogic, runtime).run().await?,
    }
    Ok(())
}
