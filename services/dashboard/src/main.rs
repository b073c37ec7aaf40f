//! Dashboard bridge binary: both relays in, filtered JSON WebSocket out.

use adapter_service::RelayConsumer;
use anyhow::{Context, Result};
use clap::Parser;
use codec::RelayDomain;
use config::PipelineConfig;
use dashboard_websocket::{bridge, Bridge, ClientHub};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "dashboard", about = "Dexflow dashboard WebSocket bridge")]
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

    let hub = ClientHub::new(pipeline.dashboard.client_queue_frames);
    {
        let hub = hub.clone();
        let bind_addr = pipeline.dashboard.bind_addr.clone();
        tokio::spawn(async move {
            if let Err(e) = hub.run(&bind_addr).await {
                tracing::error!("websocket server failed: {e}");
            }
        });
    }

    let idle = Duration::from_secs(pipeline.relay.idle_timeout_secs);
    let market_data = RelayConsumer::new(
        pipeline
            .socket_path(RelayDomain::MarketData.socket_name())
            .to_string_lossy()
            .to_string(),
        idle,
    );
    let signals = RelayConsumer::new(
        pipeline
            .socket_path(RelayDomain::Signal.socket_name())
            .to_string_lossy()
            .to_string(),
        idle,
    );

    let bridge = Bridge::new(
        hub,
        Duration::from_millis(pipeline.dashboard.mapping_wait_ms),
    );
    bridge::run(
        bridge,
        market_data,
        signals,
        Duration::from_secs(pipeline.dashboard.metrics_interval_secs),
    )
    .await
}
