//! Arbitrage detector binary: MarketData in, Signal out.

use adapter_service::RelayConsumer;
use anyhow::{Context, Result};
use arbitrage_strategy::{Detector, DetectorParams, GasOracle, PriceOracle, SignalOutput};
use clap::Parser;
use codec::RelayDomain;
use config::PipelineConfig;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "arbitrage", about = "Cross-pool arbitrage detector")]
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

    let params = DetectorParams::from_config(&pipeline.detector)
        .map_err(|reason| anyhow::anyhow!("invalid detector config: {reason}"))?;
    let oracle = PriceOracle::from_config(&pipeline.detector);

    let gas = Arc::new(GasOracle::new(pipeline.detector.gas_units));
    gas.clone().spawn_poller(
        pipeline.polygon.http_url.clone(),
        Duration::from_secs(pipeline.detector.gas_refresh_secs),
    );

    let mut detector = Detector::new(params, oracle, gas);

    let market_data_socket = pipeline.socket_path(RelayDomain::MarketData.socket_name());
    let mut consumer = RelayConsumer::new(
        market_data_socket.to_string_lossy().to_string(),
        Duration::from_secs(pipeline.relay.idle_timeout_secs),
    );

    let signal_socket = pipeline.socket_path(RelayDomain::Signal.socket_name());
    let mut signals = SignalOutput::new(signal_socket.to_string_lossy().to_string());
    signals.connect().await.context("connecting to signal relay")?;

    info!("arbitrage detector running");
    loop {
        let frame = consumer
            .next_frame()
            .await
            .context("market data stream failed")?;
        let now_ns = types::current_timestamp_ns();
        for message in &frame.messages {
            for signal in detector.on_message(message, now_ns) {
                if let Err(e) = signals.emit(signal).await {
                    warn!("signal emission failed: {e}");
                }
            }
        }
    }
}
