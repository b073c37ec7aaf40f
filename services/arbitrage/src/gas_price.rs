//! Gas cost estimation in USD
//!
//! Polls `eth_gasPrice` on a fixed cadence and prices a two-swap arbitrage
//! transaction (~280k gas with a router) in USD via the native token's
//! Trade-stream price. Until both a gas price and a native-token price
//! exist, gas cost is unknown and the detector emits nothing.

use crate::price_oracle::PriceOracle;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use types::{usd_value, UsdFixedPoint8};
use web3::transports::Http;

pub struct GasOracle {
    gas_units: u64,
    gas_price_wei: Mutex<Option<u128>>,
}

impl GasOracle {
    pub fn new(gas_units: u64) -> Self {
        Self {
            gas_units,
            gas_price_wei: Mutex::new(None),
        }
    }

    /// Record an observed network gas price.
    pub fn set_gas_price_wei(&self, wei: u128) {
        *self.gas_price_wei.lock() = Some(wei);
    }

    pub fn gas_price_wei(&self) -> Option<u128> {
        *self.gas_price_wei.lock()
    }

    /// USD cost of one arbitrage transaction at current prices.
    ///
    /// `cost_wei = gas_price · gas_units`; wei is an 18-decimal amount of
    /// the native token.
    pub fn transaction_cost_usd(&self, oracle: &PriceOracle) -> Option<UsdFixedPoint8> {
        let gas_price = (*self.gas_price_wei.lock())?;
        let native_price = oracle.native_usd_price()?;
        let cost_wei = gas_price.checked_mul(self.gas_units as u128)?;
        usd_value(cost_wei, 18, native_price)
    }

    /// Background task refreshing the gas price over HTTP RPC.
    pub fn spawn_poller(self: Arc<Self>, http_url: String, interval: Duration) {
        tokio::spawn(async move {
            let transport = match Http::new(&http_url) {
                Ok(t) => t,
                Err(e) => {
                    warn!("gas poller cannot build transport for {http_url}: {e}");
                    return;
                }
            };
            let web3 = web3::Web3::new(transport);
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                match web3.eth().gas_price().await {
                    Ok(price) => {
                        let wei = price.as_u128();
                        self.set_gas_price_wei(wei);
                        debug!(gas_price_wei = wei, "gas price refreshed");
                    }
                    Err(e) => {
                        warn!("gas price fetch failed: {e}");
                    }
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::{DetectorConfig, PriceFeedConfig};
    use codec::payloads::TradeTlv;
    use types::InstrumentId;

    fn priced_oracle() -> PriceOracle {
        let mut config = DetectorConfig::default();
        config.native_token_descriptor = "token:137:0xwpol".to_string();
        config.price_feeds = vec![PriceFeedConfig {
            token: "token:137:0xwpol".to_string(),
            feed: "coinbase:POL-USD".to_string(),
        }];
        let mut oracle = PriceOracle::from_config(&config);
        oracle.note_trade(&TradeTlv {
            instrument_id: InstrumentId::from_descriptor("coinbase:POL-USD").to_u64(),
            price: 40_000_000, // $0.40
            volume: 1,
            ts_event_ns: 1,
            side: TradeTlv::SIDE_BUY,
            price_decimals: 8,
            volume_decimals: 8,
        });
        oracle
    }

    #[test]
    fn cost_matches_hand_calculation() {
        let gas = GasOracle::new(280_000);
        let oracle = priced_oracle();

        // 100 gwei · 280k gas = 0.028 native → $0.0112 at $0.40.
        gas.set_gas_price_wei(100_000_000_000);
        assert_eq!(
            gas.transaction_cost_usd(&oracle),
            Some(UsdFixedPoint8::from_decimal_str("0.0112").unwrap())
        );
    }

    #[test]
    fn unknown_inputs_mean_unknown_cost() {
        let gas = GasOracle::new(280_000);
        let oracle = priced_oracle();
        // No gas price yet.
        assert_eq!(gas.transaction_cost_usd(&oracle), None);

        // Gas price but no native price.
        let unpriced = PriceOracle::from_config(&DetectorConfig::default());
        gas.set_gas_price_wei(100_000_000_000);
        assert_eq!(gas.transaction_cost_usd(&unpriced), None);
    }
}
