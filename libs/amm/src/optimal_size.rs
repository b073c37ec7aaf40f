//! Optimal position sizing for two-leg arbitrage
//!
//! Finds the input size maximizing `P(x) = sell.quote(buy.quote(x)) − x`.
//! For a V2↔V2 pair the curve is smooth and single-peaked, so a discrete
//! binary search with a derivative probe converges in well under the
//! iteration cap. Any V3 leg makes the curve piecewise-smooth at tick
//! crossings, so those pairs use fixed-rate numerical gradient ascent with
//! clamping instead.

use crate::v2::V2PoolMath;
use crate::v3::V3PoolMath;
use crate::AmmResult;

/// Iteration cap shared by both search strategies.
const MAX_ITERATIONS: u32 = 50;

/// One leg of the arbitrage loop, oriented in its swap direction.
#[derive(Debug, Clone)]
pub enum PoolLeg {
    V2(V2PoolMath),
    V3 {
        pool: V3PoolMath,
        zero_for_one: bool,
    },
}

impl PoolLeg {
    pub fn quote(&self, amount_in: u128) -> AmmResult<u128> {
        match self {
            PoolLeg::V2(pool) => pool.quote(amount_in),
            PoolLeg::V3 { pool, zero_for_one } => {
                Ok(pool.quote(amount_in, *zero_for_one)?.amount_out)
            }
        }
    }

    pub fn price_impact_bps(&self, amount_in: u128) -> AmmResult<u32> {
        match self {
            PoolLeg::V2(pool) => pool.price_impact_bps(amount_in),
            PoolLeg::V3 { pool, zero_for_one } => {
                let quote = pool.quote(amount_in, *zero_for_one)?;
                pool.price_impact_bps(&quote)
            }
        }
    }

    pub fn is_v2(&self) -> bool {
        matches!(self, PoolLeg::V2(_))
    }

    /// Largest input the sizing search will consider against this leg:
    /// 1% of the oriented input reserve for V2, a liquidity-depth proxy
    /// for V3.
    fn input_bound(&self) -> AmmResult<u128> {
        match self {
            PoolLeg::V2(pool) => Ok(pool.reserve_in / 100),
            PoolLeg::V3 { pool, .. } => Ok(pool.depth_proxy_token1()? / 10),
        }
    }

    /// Largest output the search may ask of this leg, mapped back to an
    /// input bound on the first leg by the caller.
    fn output_bound(&self) -> AmmResult<u128> {
        match self {
            PoolLeg::V2(pool) => Ok(pool.reserve_out / 100),
            PoolLeg::V3 { pool, .. } => Ok(pool.depth_proxy_token1()? / 10),
        }
    }
}

/// Search parameters.
#[derive(Debug, Clone)]
pub struct SizingConfig {
    /// Smallest input worth evaluating (quote-token raw units)
    pub min_trade: u128,
    /// Gradient magnitude below which ascent terminates (profit units)
    pub gradient_epsilon: u128,
}

impl Default for SizingConfig {
    fn default() -> Self {
        Self {
            min_trade: 1,
            gradient_epsilon: 1,
        }
    }
}

/// A sized opportunity: the input maximizing profit and its expectations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptimalSwap {
    /// Input to the buy leg, quote-token raw units
    pub amount_in: u128,
    /// Output of the sell leg for that input
    pub amount_out: u128,
    /// `amount_out − amount_in`; positive by construction
    pub profit: u128,
    pub buy_impact_bps: u32,
    pub sell_impact_bps: u32,
}

/// Two-leg optimal-size search.
pub struct SizeSearch {
    config: SizingConfig,
}

impl SizeSearch {
    pub fn new(config: SizingConfig) -> Self {
        Self { config }
    }

    /// Find the profit-maximizing input for buy-then-sell across the legs.
    ///
    /// Returns `Ok(None)` when no input in bounds turns a profit.
    pub fn find_optimal(&self, buy: &PoolLeg, sell: &PoolLeg) -> AmmResult<Option<OptimalSwap>> {
        let low = self.config.min_trade.max(1);
        let high = buy.input_bound()?.min(sell.output_bound()?);
        if high <= low {
            return Ok(None);
        }

        let best = if buy.is_v2() && sell.is_v2() {
            self.binary_search(buy, sell, low, high)?
        } else {
            self.gradient_ascent(buy, sell, low, high)?
        };

        let Some((amount_in, amount_out)) = best else {
            return Ok(None);
        };
        let profit = amount_out - amount_in;

        Ok(Some(OptimalSwap {
            amount_in,
            amount_out,
            profit,
            buy_impact_bps: buy.price_impact_bps(amount_in)?,
            sell_impact_bps: sell.price_impact_bps(buy.quote(amount_in)?)?,
        }))
    }

    fn profit_at(
        buy: &PoolLeg,
        sell: &PoolLeg,
        amount_in: u128,
    ) -> AmmResult<(u128, i128)> {
        let intermediate = buy.quote(amount_in)?;
        let amount_out = sell.quote(intermediate)?;
        let profit = amount_out as i128 - amount_in as i128;
        Ok((amount_out, profit))
    }

    /// Discrete binary search on the smooth single-peaked V2↔V2 curve.
    ///
    /// At each midpoint a slightly larger probe decides which half holds
    /// the peak; ties keep the earlier (lower) input.
    fn binary_search(
        &self,
        buy: &PoolLeg,
        sell: &PoolLeg,
        mut low: u128,
        mut high: u128,
    ) -> AmmResult<Option<(u128, u128)>> {
        let mut best: Option<(u128, u128, i128)> = None;

        for _ in 0..MAX_ITERATIONS {
            if high - low < 1 {
                break;
            }
            let mid = low + (high - low) / 2;
            let (out_mid, profit_mid) = Self::profit_at(buy, sell, mid)?;

            if profit_mid > best.map(|(_, _, p)| p).unwrap_or(0) {
                best = Some((mid, out_mid, profit_mid));
            } else if let Some((best_in, _, best_profit)) = best {
                if profit_mid == best_profit && mid < best_in {
                    best = Some((mid, out_mid, profit_mid));
                }
            }

            let probe = mid + (mid / 1000).max(1);
            let (_, profit_probe) = Self::profit_at(buy, sell, probe.min(high))?;
            if profit_probe > profit_mid {
                low = mid + 1;
            } else {
                high = mid;
            }
        }

        Ok(best.filter(|(_, _, p)| *p > 0).map(|(i, o, _)| (i, o)))
    }

    /// Fixed-rate gradient ascent for curves with tick-crossing kinks.
    fn gradient_ascent(
        &self,
        buy: &PoolLeg,
        sell: &PoolLeg,
        low: u128,
        high: u128,
    ) -> AmmResult<Option<(u128, u128)>> {
        let span = high - low;
        let step = (span / MAX_ITERATIONS as u128).max(1);
        let mut x = low + span / 10;
        let mut best: Option<(u128, u128, i128)> = None;

        for _ in 0..MAX_ITERATIONS {
            let (out_x, profit_x) = Self::profit_at(buy, sell, x)?;
            if profit_x > best.map(|(_, _, p)| p).unwrap_or(0) {
                best = Some((x, out_x, profit_x));
            }

            let h = (x / 1000).max(1);
            let probe = (x + h).min(high);
            if probe == x {
                break;
            }
            let (_, profit_probe) = Self::profit_at(buy, sell, probe)?;
            let gradient = profit_probe - profit_x;

            if gradient.unsigned_abs() < self.config.gradient_epsilon {
                break;
            }
            x = if gradient > 0 {
                x.saturating_add(step).min(high)
            } else {
                x.saturating_sub(step).max(low)
            };
        }

        Ok(best.filter(|(_, _, p)| *p > 0).map(|(i, o, _)| (i, o)))
    }
}

/// Convenience: a search with default parameters.
impl Default for SizeSearch {
    fn default() -> Self {
        Self::new(SizingConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tick_math::q96;
    use ethers_core::types::U256;

    /// Buy pool prices token at 2.0 (cheap base), sell pool at ~2.1.
    fn profitable_v2_pair() -> (PoolLeg, PoolLeg) {
        // Buy leg: quote in, base out.
        let buy = PoolLeg::V2(V2PoolMath::new(10_000_000_000, 20_000_000_000, 30).unwrap());
        // Sell leg: base in, quote out, at a better price.
        let sell = PoolLeg::V2(V2PoolMath::new(19_000_000_000, 10_500_000_000, 30).unwrap());
        (buy, sell)
    }

    #[test]
    fn finds_profit_between_mispriced_v2_pools() {
        let (buy, sell) = profitable_v2_pair();
        let result = SizeSearch::default().find_optimal(&buy, &sell).unwrap();
        let swap = result.expect("pair is mispriced enough to profit");

        assert!(swap.profit > 0);
        assert!(swap.amount_out > swap.amount_in);
        // Bounded to 1% of the constraining reserves.
        assert!(swap.amount_in <= 100_000_000);
        assert!(swap.buy_impact_bps < 10_000);
    }

    #[test]
    fn optimum_beats_nearby_sizes() {
        let (buy, sell) = profitable_v2_pair();
        let swap = SizeSearch::default()
            .find_optimal(&buy, &sell)
            .unwrap()
            .unwrap();

        for other in [swap.amount_in / 2, swap.amount_in * 2] {
            let intermediate = buy.quote(other).unwrap();
            let out = sell.quote(intermediate).unwrap();
            let profit = out as i128 - other as i128;
            assert!(
                profit <= swap.profit as i128,
                "size {other} beat the optimum"
            );
        }
    }

    #[test]
    fn balanced_pools_yield_nothing() {
        // Identical prices: fees guarantee a loss at every size.
        let buy = PoolLeg::V2(V2PoolMath::new(10_000_000_000, 20_000_000_000, 30).unwrap());
        let sell = PoolLeg::V2(V2PoolMath::new(20_000_000_000, 10_000_000_000, 30).unwrap());
        assert!(SizeSearch::default().find_optimal(&buy, &sell).unwrap().is_none());
    }

    #[test]
    fn v3_leg_uses_gradient_ascent_and_profits() {
        // V2 pool sells the base cheap; the V3 pool (price 1.0 in
        // sqrt-space, deep liquidity) buys it back at par.
        let buy = PoolLeg::V2(V2PoolMath::new(10u128.pow(21), 11 * 10u128.pow(20), 30).unwrap());

        let liquidity = 10u128.pow(24);
        let mut v3 = V3PoolMath::new(q96(), liquidity, 0, 3000, 60).unwrap();
        v3.set_tick(-887_220, liquidity as i128);
        v3.set_tick(887_220, -(liquidity as i128));
        let sell = PoolLeg::V3 {
            pool: v3,
            zero_for_one: true,
        };

        let result = SizeSearch::default().find_optimal(&buy, &sell).unwrap();
        let swap = result.expect("10% discount beats the two fees");
        assert!(swap.profit > 0);
    }

    #[test]
    fn empty_bound_range_is_none() {
        let buy = PoolLeg::V2(V2PoolMath::new(50, 50, 30).unwrap());
        let sell = PoolLeg::V2(V2PoolMath::new(50, 50, 30).unwrap());
        // 1% of 50 rounds to 0: nothing to search.
        assert!(SizeSearch::default().find_optimal(&buy, &sell).unwrap().is_none());
    }

    #[test]
    fn v3_quote_sanity_for_leg_interface() {
        let liquidity = 10u128.pow(24);
        let mut v3 = V3PoolMath::new(q96(), liquidity, 0, 3000, 60).unwrap();
        v3.set_tick(-887_220, liquidity as i128);
        v3.set_tick(887_220, -(liquidity as i128));
        let leg = PoolLeg::V3 {
            pool: v3,
            zero_for_one: false,
        };
        let out = leg.quote(10u128.pow(18)).unwrap();
        assert!(out > 0);
        assert!(U256::from(out) < U256::from(10u128.pow(18)));
    }
}
