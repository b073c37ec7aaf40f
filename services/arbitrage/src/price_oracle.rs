//! USD valuation of token amounts
//!
//! Stablecoin legs are pinned at $1.00; every other token needs a live
//! Trade-stream price feed. A token with neither yields `None`, and the
//! detector emits nothing. Staying silent beats pricing an opportunity
//! off guesswork.

use codec::payloads::TradeTlv;
use config::DetectorConfig;
use std::collections::{HashMap, HashSet};
use tracing::debug;
use types::{usd_value, InstrumentId, UsdFixedPoint8};

pub struct PriceOracle {
    /// Tokens whose USD price is pinned at exactly $1.
    stables: HashSet<InstrumentId>,
    /// Trade-feed instrument → token it prices.
    feeds: HashMap<InstrumentId, InstrumentId>,
    /// Latest observed USD price per token.
    prices: HashMap<InstrumentId, UsdFixedPoint8>,
    native_token: Option<InstrumentId>,
}

impl PriceOracle {
    pub fn from_config(config: &DetectorConfig) -> Self {
        let stables = config
            .stable_token_descriptors
            .iter()
            .map(|d| InstrumentId::from_descriptor(d))
            .collect();
        let feeds = config
            .price_feeds
            .iter()
            .map(|feed| {
                (
                    InstrumentId::from_descriptor(&feed.feed),
                    InstrumentId::from_descriptor(&feed.token),
                )
            })
            .collect();
        let native_token = if config.native_token_descriptor.is_empty() {
            None
        } else {
            Some(InstrumentId::from_descriptor(&config.native_token_descriptor))
        };
        Self {
            stables,
            feeds,
            prices: HashMap::new(),
            native_token,
        }
    }

    /// Ingest a trade; only 8-decimal feeds mapped to a token are used.
    pub fn note_trade(&mut self, trade: &TradeTlv) {
        let price = trade.price;
        if trade.price_decimals != 8 || price <= 0 {
            return;
        }
        if let Some(&token) = self.feeds.get(&trade.instrument()) {
            self.prices.insert(token, UsdFixedPoint8::from_raw(price));
        }
    }

    /// USD price of one whole token, if known.
    pub fn usd_price(&self, token: InstrumentId) -> Option<UsdFixedPoint8> {
        if self.stables.contains(&token) {
            return Some(UsdFixedPoint8::ONE_DOLLAR);
        }
        self.prices.get(&token).copied()
    }

    /// USD value of a raw amount at the token's native decimals.
    pub fn usd_amount(
        &self,
        token: InstrumentId,
        amount_raw: u128,
        decimals: u8,
    ) -> Option<UsdFixedPoint8> {
        let price = self.usd_price(token)?;
        let value = usd_value(amount_raw, decimals, price);
        if value.is_none() {
            debug!(%token, amount_raw, "usd valuation overflowed, treating as unpriced");
        }
        value
    }

    /// USD price of the chain's native token (for gas conversion).
    pub fn native_usd_price(&self) -> Option<UsdFixedPoint8> {
        self.usd_price(self.native_token?)
    }

    pub fn priced_token_count(&self) -> usize {
        self.prices.len() + self.stables.len()
    }
}
