//! Opportunity detection with the full guard stack
//!
//! Every `PoolSwap`/`PoolSync` update triggers a scan of the other pools on
//! the same token pair. A candidate pair must clear, in order: freshness,
//! the integer spread prefilter (spread strictly above both fees plus a
//! safety margin), exact optimal sizing with per-leg impact limits, USD
//! pricing of the quote leg, a plausibility ceiling on profit margin, and
//! gas-inclusive profitability. Nothing is emitted when any input is
//! missing: no price, no gas estimate, no signal.

use crate::gas_price::GasOracle;
use crate::pool_book::{spread_bps, PoolBook, PoolEntry};
use crate::price_oracle::PriceOracle;
use amm::{PoolLeg, SizeSearch, SizingConfig, V2PoolMath};
use codec::payloads::{ArbitrageSignalTlv, PoolProtocol};
use codec::Message;
use config::DetectorConfig;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use types::{InstrumentId, UsdFixedPoint8};

/// Validated runtime parameters.
#[derive(Debug, Clone)]
pub struct DetectorParams {
    pub min_profit_usd: UsdFixedPoint8,
    pub max_price_impact_bps: u32,
    pub spread_safety_margin_bps: u32,
    pub max_profit_margin_bps: u32,
    pub staleness_window_ns: u64,
    pub pair_eval_budget: Duration,
}

impl DetectorParams {
    pub fn from_config(config: &DetectorConfig) -> Result<Self, String> {
        Ok(Self {
            min_profit_usd: config.min_profit_usd()?,
            max_price_impact_bps: config.max_price_impact_bps,
            spread_safety_margin_bps: config.spread_safety_margin_bps,
            max_profit_margin_bps: config.max_profit_margin_bps,
            staleness_window_ns: config.staleness_window_ms * 1_000_000,
            pair_eval_budget: Duration::from_millis(config.pair_eval_budget_ms),
        })
    }
}

pub struct Detector {
    book: PoolBook,
    oracle: PriceOracle,
    gas: Arc<GasOracle>,
    params: DetectorParams,
    search: SizeSearch,
    next_signal_id: u64,
    signals_emitted: u64,
    candidates_rejected: u64,
}

impl Detector {
    pub fn new(params: DetectorParams, oracle: PriceOracle, gas: Arc<GasOracle>) -> Self {
        Self {
            book: PoolBook::new(),
            oracle,
            gas,
            params,
            search: SizeSearch::new(SizingConfig::default()),
            next_signal_id: 1,
            signals_emitted: 0,
            candidates_rejected: 0,
        }
    }

    pub fn book(&self) -> &PoolBook {
        &self.book
    }

    /// Ingest one market-data message; returns any signals it produced.
    pub fn on_message(&mut self, message: &Message, now_ns: u64) -> Vec<ArbitrageSignalTlv> {
        if let Message::Trade(trade) = message {
            self.oracle.note_trade(trade);
            return Vec::new();
        }

        let Some(updated) = self.book.apply(message, now_ns) else {
            return Vec::new();
        };
        // Mint/burn keep the book current but do not move price; only swap
        // and sync updates open opportunities.
        if !matches!(message, Message::PoolSwap(_) | Message::PoolSync(_)) {
            return Vec::new();
        }

        self.scan(updated, now_ns)
    }

    fn scan(&mut self, updated: InstrumentId, now_ns: u64) -> Vec<ArbitrageSignalTlv> {
        let mut signals = Vec::new();
        for candidate in self.book.candidates(updated) {
            let started = Instant::now();
            match self.evaluate_pair(updated, candidate, now_ns, started) {
                Some(signal) => {
                    let net_usd = signal.net_profit_usd;
                    info!(
                        buy_pool = %signal.buy_pool(),
                        sell_pool = %signal.sell_pool(),
                        net_usd,
                        "arbitrage signal"
                    );
                    self.signals_emitted += 1;
                    signals.push(signal);
                }
                None => self.candidates_rejected += 1,
            }
            if started.elapsed() > self.params.pair_eval_budget {
                warn!(
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "pair evaluation exceeded its budget"
                );
            }
        }
        signals
    }

    fn evaluate_pair(
        &mut self,
        a_id: InstrumentId,
        b_id: InstrumentId,
        now_ns: u64,
        started: Instant,
    ) -> Option<ArbitrageSignalTlv> {
        let a = self.book.get(a_id)?.clone();
        let b = self.book.get(b_id)?.clone();

        // Freshness guard: signals must never rest on stale pool state.
        for entry in [&a, &b] {
            if now_ns.saturating_sub(entry.last_update_ns) > self.params.staleness_window_ns {
                debug!(pool = %entry.pool_id, "candidate rejected: stale state");
                return None;
            }
        }

        // Price both pools as quote-per-base in pool A's orientation.
        let base = a.token0_id;
        let quote = a.token1_id;
        let price_a = a.price_ratio()?;
        let price_b = oriented_price(&b, base, quote)?;

        // Spread prefilter: must strictly exceed both fees plus margin.
        let spread = spread_bps(price_a, price_b)?;
        let fee_floor = a.fee_bps() + b.fee_bps() + self.params.spread_safety_margin_bps;
        if spread <= fee_floor {
            debug!(spread, fee_floor, "candidate rejected: spread within fees");
            return None;
        }

        // Base token is cheaper where quote-per-base is lower: buy there.
        let a_cheaper = {
            let lhs = price_a.0.full_mul(price_b.1);
            let rhs = price_b.0.full_mul(price_a.1);
            lhs < rhs
        };
        let (buy, sell) = if a_cheaper { (&a, &b) } else { (&b, &a) };

        let buy_leg = oriented_leg(buy, quote)?;
        let sell_leg = oriented_leg(sell, base)?;

        let swap = match self.search.find_optimal(&buy_leg, &sell_leg) {
            Ok(Some(swap)) => swap,
            Ok(None) => return None,
            Err(e) => {
                debug!("sizing failed: {e}");
                return None;
            }
        };

        if swap.buy_impact_bps > self.params.max_price_impact_bps
            || swap.sell_impact_bps > self.params.max_price_impact_bps
        {
            debug!(
                buy_impact = swap.buy_impact_bps,
                sell_impact = swap.sell_impact_bps,
                "candidate rejected: price impact beyond guard"
            );
            return None;
        }

        if started.elapsed() > self.params.pair_eval_budget {
            warn!("candidate abandoned: evaluation budget exhausted");
            return None;
        }

        // USD valuation of the quote leg. Quote decimals follow the buy
        // pool's orientation.
        let quote_decimals = if buy.token1_id == quote {
            buy.token1_decimals
        } else {
            buy.token0_decimals
        };
        let gross_usd = self.oracle.usd_amount(quote, swap.profit, quote_decimals)?;
        let notional_usd = self
            .oracle
            .usd_amount(quote, swap.amount_in, quote_decimals)?;

        // Plausibility guard: a margin past the ceiling means stale state
        // or a decoding error upstream, not free money.
        if notional_usd.raw_value() <= 0 {
            return None;
        }
        let margin_bps = (gross_usd.raw_value() as i128 * 10_000)
            / notional_usd.raw_value() as i128;
        if margin_bps > self.params.max_profit_margin_bps as i128 {
            warn!(
                margin_bps,
                ceiling = self.params.max_profit_margin_bps,
                "candidate rejected: implausible profit margin"
            );
            return None;
        }

        // Gas-inclusive profitability. No gas estimate → no signal.
        let gas_usd = self.gas.transaction_cost_usd(&self.oracle)?;
        if gross_usd <= gas_usd {
            debug!(
                gross = %gross_usd,
                gas = %gas_usd,
                "candidate rejected: gas exceeds gross profit"
            );
            return None;
        }
        let net_usd = gross_usd.checked_sub(gas_usd)?;
        if net_usd.raw_value() <= 0 || net_usd < self.params.min_profit_usd {
            debug!(net = %net_usd, "candidate rejected: below profit threshold");
            return None;
        }

        // Confidence: the fraction of gross surviving gas, in bps.
        let confidence_bps = ((net_usd.raw_value() as i128 * 10_000)
            / gross_usd.raw_value() as i128)
            .clamp(0, 10_000) as u16;

        let signal_id = self.next_signal_id;
        self.next_signal_id += 1;

        Some(ArbitrageSignalTlv {
            optimal_input: swap.amount_in,
            expected_output: swap.amount_out,
            buy_pool_id: buy.pool_id.to_u64(),
            sell_pool_id: sell.pool_id.to_u64(),
            signal_id,
            expected_profit_usd: gross_usd.raw_value(),
            gas_cost_usd: gas_usd.raw_value(),
            net_profit_usd: net_usd.raw_value(),
            confidence_bps,
            input_decimals: quote_decimals,
            output_decimals: quote_decimals,
        })
    }
}

/// Price of `base` in `quote` units for a pool whose internal orientation
/// may be flipped relative to the caller's.
fn oriented_price(
    entry: &PoolEntry,
    base: InstrumentId,
    quote: InstrumentId,
) -> Option<(ethers_core::types::U256, ethers_core::types::U256)> {
    let (n, d) = entry.price_ratio()?;
    if entry.token0_id == base && entry.token1_id == quote {
        Some((n, d))
    } else if entry.token0_id == quote && entry.token1_id == base {
        Some((d, n))
    } else {
        None
    }
}

/// A swap leg oriented by its input token.
fn oriented_leg(entry: &PoolEntry, input_token: InstrumentId) -> Option<PoolLeg> {
    let input_is_token0 = if input_token == entry.token0_id {
        true
    } else if input_token == entry.token1_id {
        false
    } else {
        return None;
    };

    match entry.protocol {
        PoolProtocol::V2 => {
            let (reserve_in, reserve_out) = if input_is_token0 {
                (entry.reserve0, entry.reserve1)
            } else {
                (entry.reserve1, entry.reserve0)
            };
            V2PoolMath::new(reserve_in, reserve_out, entry.fee_bps())
                .ok()
                .map(PoolLeg::V2)
        }
        PoolProtocol::V3 => entry.v3.as_ref().map(|pool| PoolLeg::V3 {
            pool: pool.clone(),
            // Selling token0 pushes the price down.
            zero_for_one: input_is_token0,
        }),
    }
}
