//! # Dexflow Configuration
//!
//! Process-wide configuration for every service in the pipeline, loaded
//! from a single TOML file. Configuration errors are fatal at startup:
//! services validate eagerly and exit non-zero rather than run with a
//! partial or implausible setup.
//!
//! ```toml
//! socket_dir = "/tmp/dexflow"
//! log_level = "info"
//!
//! [polygon]
//! ws_url = "wss://polygon-mainnet.example/ws"
//! http_url = "https://polygon-mainnet.example"
//! chain_id = 137
//! pools = ["0x853ee4b2a13f8a742d64c8f088be7ba2131f670d"]
//!
//! [detector]
//! min_profit_usd = "1.00"
//! max_price_impact_bps = 500
//! ```

use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use types::UsdFixedPoint8;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("cannot parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("invalid config value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Top-level pipeline configuration shared by every service binary.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    /// Directory holding the relay Unix sockets; created mode 0700.
    #[serde(default = "defaults::socket_dir")]
    pub socket_dir: PathBuf,

    /// tracing-subscriber EnvFilter directive, e.g. "info" or "debug,relay=trace".
    #[serde(default = "defaults::log_level")]
    pub log_level: String,

    #[serde(default)]
    pub relay: RelayConfig,

    #[serde(default)]
    pub polygon: PolygonConfig,

    #[serde(default)]
    pub coinbase: CoinbaseConfig,

    #[serde(default)]
    pub detector: DetectorConfig,

    #[serde(default)]
    pub dashboard: DashboardConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RelayConfig {
    /// Bounded frames buffered per subscriber before drop-oldest kicks in.
    #[serde(default = "defaults::subscriber_queue_frames")]
    pub subscriber_queue_frames: usize,

    /// Invalid frames tolerated per source before its connection closes.
    #[serde(default = "defaults::max_source_violations")]
    pub max_source_violations: u32,

    /// Read-idle seconds after which a heartbeat is expected; 2x closes.
    #[serde(default = "defaults::idle_timeout_secs")]
    pub idle_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolygonConfig {
    #[serde(default = "defaults::polygon_ws_url")]
    pub ws_url: String,

    #[serde(default = "defaults::polygon_http_url")]
    pub http_url: String,

    #[serde(default = "defaults::chain_id")]
    pub chain_id: u32,

    /// Watched pool addresses, 0x-prefixed hex.
    #[serde(default)]
    pub pools: Vec<String>,

    /// Venue label used in canonical instrument descriptors.
    #[serde(default = "defaults::polygon_venue")]
    pub venue: String,

    /// Entries remembered by the (tx-hash, log-index) dedup window.
    #[serde(default = "defaults::dedup_window")]
    pub dedup_window: usize,

    /// Connect timeout for WS and RPC, milliseconds.
    #[serde(default = "defaults::connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CoinbaseConfig {
    #[serde(default = "defaults::coinbase_ws_url")]
    pub ws_url: String,

    /// Products subscribed on the `matches` channel, e.g. "ETH-USD".
    #[serde(default)]
    pub products: Vec<String>,

    #[serde(default = "defaults::coinbase_venue")]
    pub venue: String,

    #[serde(default = "defaults::connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DetectorConfig {
    /// Minimum net profit worth signalling, decimal USD string.
    #[serde(default = "defaults::min_profit_usd")]
    pub min_profit_usd: String,

    /// Reject candidates whose per-leg price impact exceeds this.
    #[serde(default = "defaults::max_price_impact_bps")]
    pub max_price_impact_bps: u32,

    /// Added to the fee sum in the spread prefilter.
    #[serde(default = "defaults::spread_safety_margin_bps")]
    pub spread_safety_margin_bps: u32,

    /// Profit margins above this fraction of notional are implausible.
    #[serde(default = "defaults::max_profit_margin_bps")]
    pub max_profit_margin_bps: u32,

    /// Pool state older than this is too stale to trade against.
    #[serde(default = "defaults::staleness_window_ms")]
    pub staleness_window_ms: u64,

    /// Wall-clock budget for evaluating one candidate pair.
    #[serde(default = "defaults::pair_eval_budget_ms")]
    pub pair_eval_budget_ms: u64,

    /// Gas units for a two-swap arbitrage transaction.
    #[serde(default = "defaults::gas_units")]
    pub gas_units: u64,

    /// Gas price refresh cadence, seconds.
    #[serde(default = "defaults::gas_refresh_secs")]
    pub gas_refresh_secs: u64,

    /// Descriptors of tokens pinned at $1 (stablecoins).
    #[serde(default)]
    pub stable_token_descriptors: Vec<String>,

    /// Descriptor of the chain's native/wrapped-native token, used to price
    /// gas in USD via the Trade stream.
    #[serde(default)]
    pub native_token_descriptor: String,

    /// Trade-stream feeds pricing non-stable tokens in USD.
    #[serde(default)]
    pub price_feeds: Vec<PriceFeedConfig>,
}

/// Associates an on-chain token with the Trade-stream instrument that
/// prices it in USD, e.g. `token:137:0x…` ← `coinbase:POL-USD`.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PriceFeedConfig {
    pub token: String,
    pub feed: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DashboardConfig {
    #[serde(default = "defaults::dashboard_bind")]
    pub bind_addr: String,

    /// Frames buffered per WebSocket client before drop-oldest.
    #[serde(default = "defaults::client_queue_frames")]
    pub client_queue_frames: usize,

    /// How long frames with unresolved instrument ids are buffered.
    #[serde(default = "defaults::mapping_wait_ms")]
    pub mapping_wait_ms: u64,

    /// Metrics frame cadence, seconds.
    #[serde(default = "defaults::metrics_interval_secs")]
    pub metrics_interval_secs: u64,
}

mod defaults {
    use std::path::PathBuf;

    pub fn socket_dir() -> PathBuf {
        PathBuf::from("/tmp/dexflow")
    }
    pub fn log_level() -> String {
        "info".to_string()
    }
    pub fn subscriber_queue_frames() -> usize {
        1024
    }
    pub fn max_source_violations() -> u32 {
        10
    }
    pub fn idle_timeout_secs() -> u64 {
        30
    }
    pub fn polygon_ws_url() -> String {
        "wss://polygon-rpc.com/ws".to_string()
    }
    pub fn polygon_http_url() -> String {
        "https://polygon-rpc.com".to_string()
    }
    pub fn chain_id() -> u32 {
        137
    }
    pub fn polygon_venue() -> String {
        "polygon".to_string()
    }
    pub fn dedup_window() -> usize {
        8192
    }
    pub fn connect_timeout_ms() -> u64 {
        10_000
    }
    pub fn coinbase_ws_url() -> String {
        "wss://ws-feed.exchange.coinbase.com".to_string()
    }
    pub fn coinbase_venue() -> String {
        "coinbase".to_string()
    }
    pub fn min_profit_usd() -> String {
        "1.00".to_string()
    }
    pub fn max_price_impact_bps() -> u32 {
        500
    }
    pub fn spread_safety_margin_bps() -> u32 {
        10
    }
    pub fn max_profit_margin_bps() -> u32 {
        1_000
    }
    pub fn staleness_window_ms() -> u64 {
        30_000
    }
    pub fn pair_eval_budget_ms() -> u64 {
        10
    }
    pub fn gas_units() -> u64 {
        280_000
    }
    pub fn gas_refresh_secs() -> u64 {
        15
    }
    pub fn dashboard_bind() -> String {
        "127.0.0.1:8765".to_string()
    }
    pub fn client_queue_frames() -> usize {
        1024
    }
    pub fn mapping_wait_ms() -> u64 {
        5_000
    }
    pub fn metrics_interval_secs() -> u64 {
        5
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        toml::from_str("").expect("defaults are valid")
    }
}

impl Default for PolygonConfig {
    fn default() -> Self {
        toml::from_str("").expect("defaults are valid")
    }
}

impl Default for CoinbaseConfig {
    fn default() -> Self {
        toml::from_str("").expect("defaults are valid")
    }
}

impl Default for DetectorConfig {
    fn default() -> Self {
        toml::from_str("").expect("defaults are valid")
    }
}

impl Default for DashboardConfig {
    fn default() -> Self {
        toml::from_str("").expect("defaults are valid")
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        toml::from_str("").expect("defaults are valid")
    }
}

impl PipelineConfig {
    /// Load and validate a config file. Any failure here is fatal to the
    /// calling service.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.relay.subscriber_queue_frames == 0 {
            return Err(ConfigError::Invalid {
                field: "relay.subscriber_queue_frames",
                reason: "must be at least 1".to_string(),
            });
        }
        for pool in &self.polygon.pools {
            parse_address(pool).map_err(|reason| ConfigError::Invalid {
                field: "polygon.pools",
                reason,
            })?;
        }
        self.detector.min_profit_usd().map_err(|reason| ConfigError::Invalid {
            field: "detector.min_profit_usd",
            reason,
        })?;
        if self.detector.max_profit_margin_bps == 0 {
            return Err(ConfigError::Invalid {
                field: "detector.max_profit_margin_bps",
                reason: "plausibility guard cannot be disabled".to_string(),
            });
        }
        Ok(())
    }

    /// Socket path for a relay domain under the configured directory.
    pub fn socket_path(&self, socket_name: &str) -> PathBuf {
        self.socket_dir.join(socket_name)
    }
}

impl DetectorConfig {
    pub fn min_profit_usd(&self) -> Result<UsdFixedPoint8, String> {
        UsdFixedPoint8::from_decimal_str(&self.min_profit_usd)
            .map_err(|e| format!("{}: {e}", self.min_profit_usd))
    }
}

/// Parse a 0x-prefixed 20-byte hex address.
pub fn parse_address(input: &str) -> Result<[u8; 20], String> {
    let stripped = input
        .strip_prefix("0x")
        .or_else(|| input.strip_prefix("0X"))
        .ok_or_else(|| format!("address {input} missing 0x prefix"))?;
    if stripped.len() != 40 {
        return Err(format!("address {input} is not 20 bytes"));
    }
    let mut out = [0u8; 20];
    for (i, chunk) in stripped.as_bytes().chunks(2).enumerate() {
        let hex_pair = std::str::from_utf8(chunk).map_err(|_| "invalid utf8".to_string())?;
        out[i] = u8::from_str_radix(hex_pair, 16)
            .map_err(|_| format!("address {input} contains non-hex characters"))?;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_complete_and_valid() {
        let config = PipelineConfig::default();
        assert_eq!(config.socket_dir, PathBuf::from("/tmp/dexflow"));
        assert_eq!(config.relay.subscriber_queue_frames, 1024);
        assert_eq!(config.detector.gas_units, 280_000);
        assert!(config.validate().is_ok());
        assert_eq!(
            config.detector.min_profit_usd().unwrap(),
            UsdFixedPoint8::from_dollars(1)
        );
    }

    #[test]
    fn loads_a_full_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
socket_dir = "/run/dexflow"
log_level = "debug"

[relay]
subscriber_queue_frames = 2048

[polygon]
ws_url = "wss://example/ws"
http_url = "https://example"
pools = ["0x853ee4b2a13f8a742d64c8f088be7ba2131f670d"]

[detector]
min_profit_usd = "0.50"
max_price_impact_bps = 300

[dashboard]
bind_addr = "0.0.0.0:9000"
"#
        )
        .unwrap();

        let config = PipelineConfig::load(file.path()).unwrap();
        assert_eq!(config.socket_dir, PathBuf::from("/run/dexflow"));
        assert_eq!(config.relay.subscriber_queue_frames, 2048);
        assert_eq!(config.polygon.pools.len(), 1);
        assert_eq!(
            config.detector.min_profit_usd().unwrap(),
            UsdFixedPoint8::from_cents(50)
        );
        assert_eq!(config.dashboard.bind_addr, "0.0.0.0:9000");
        assert_eq!(
            config.socket_path("marketdata.sock"),
            PathBuf::from("/run/dexflow/marketdata.sock")
        );
    }

    #[test]
    fn bad_pool_address_is_fatal() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
[polygon]
pools = ["not-an-address"]
"#
        )
        .unwrap();
        assert!(matches!(
            PipelineConfig::load(file.path()),
            Err(ConfigError::Invalid { field: "polygon.pools", .. })
        ));
    }

    #[test]
    fn bad_profit_threshold_is_fatal() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
[detector]
min_profit_usd = "lots"
"#
        )
        .unwrap();
        assert!(PipelineConfig::load(file.path()).is_err());
    }

    #[test]
    fn missing_file_is_fatal() {
        assert!(matches!(
            PipelineConfig::load(Path::new("/nonexistent/dexflow.toml")),
            Err(ConfigError::Io { .. })
        ));
    }

    #[test]
    fn address_parsing() {
        let parsed = parse_address("0x853ee4b2a13f8a742d64c8f088be7ba2131f670d").unwrap();
        assert_eq!(parsed[0], 0x85);
        assert_eq!(parsed[19], 0x0d);
        assert!(parse_address("853ee4b2").is_err());
        assert!(parse_address("0xzz3ee4b2a13f8a742d64c8f088be7ba2131f670d").is_err());
    }
}
