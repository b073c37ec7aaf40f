//! Uniswap V3 concentrated-liquidity swap simulation
//!
//! Traverses initialized ticks exactly like the reference contract: each
//! step consumes input up to the next tick boundary via the closed-form
//! swap-step math, applies the crossed tick's `liquidity_net`, and repeats
//! until the input is exhausted or the crossing cap is hit.

use crate::tick_math::{
    amount1_delta, compute_swap_step, max_sqrt_ratio, min_sqrt_ratio, sqrt_ratio_at_tick,
    MAX_TICK, MIN_TICK,
};
use crate::{AmmError, AmmResult};
use ethers_core::types::{U256, U512};
use std::collections::BTreeMap;

/// A pathological pool could carry thousands of initialized ticks; a single
/// quote never walks more than this many.
pub const MAX_TICKS_CROSSED: u32 = 10;

/// Live V3 pool state sufficient to quote a swap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct V3PoolMath {
    /// Current sqrt price, Q64.96
    pub sqrt_price_x96: U256,
    /// Liquidity active at the current tick
    pub liquidity: u128,
    /// Current tick
    pub tick: i32,
    /// Fee in pips (hundredths of a basis point; 3000 = 0.30%)
    pub fee_pips: u32,
    pub tick_spacing: i32,
    /// Initialized ticks → signed liquidity change when crossing upward
    pub ticks: BTreeMap<i32, i128>,
}

/// Result of a simulated swap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct V3Quote {
    pub amount_out: u128,
    pub amount_in_consumed: u128,
    pub sqrt_price_after: U256,
    pub tick_after: i32,
    pub liquidity_after: u128,
    pub ticks_crossed: u32,
}

impl V3PoolMath {
    pub fn new(
        sqrt_price_x96: U256,
        liquidity: u128,
        tick: i32,
        fee_pips: u32,
        tick_spacing: i32,
    ) -> AmmResult<Self> {
        if !(MIN_TICK..=MAX_TICK).contains(&tick) {
            return Err(AmmError::TickOutOfBounds(tick));
        }
        Ok(Self {
            sqrt_price_x96,
            liquidity,
            tick,
            fee_pips,
            tick_spacing,
            ticks: BTreeMap::new(),
        })
    }

    /// Record an initialized tick's net liquidity (from mint/burn events).
    pub fn set_tick(&mut self, tick: i32, liquidity_net: i128) {
        if liquidity_net == 0 {
            self.ticks.remove(&tick);
        } else {
            self.ticks.insert(tick, liquidity_net);
        }
    }

    /// Add a position's liquidity over [tick_lower, tick_upper].
    pub fn apply_mint(&mut self, tick_lower: i32, tick_upper: i32, liquidity: u128) {
        let delta = liquidity as i128;
        *self.ticks.entry(tick_lower).or_insert(0) += delta;
        *self.ticks.entry(tick_upper).or_insert(0) -= delta;
        self.prune_tick(tick_lower);
        self.prune_tick(tick_upper);
        if self.tick >= tick_lower && self.tick < tick_upper {
            self.liquidity = self.liquidity.saturating_add(liquidity);
        }
    }

    /// Remove a position's liquidity over [tick_lower, tick_upper].
    pub fn apply_burn(&mut self, tick_lower: i32, tick_upper: i32, liquidity: u128) {
        let delta = liquidity as i128;
        *self.ticks.entry(tick_lower).or_insert(0) -= delta;
        *self.ticks.entry(tick_upper).or_insert(0) += delta;
        self.prune_tick(tick_lower);
        self.prune_tick(tick_upper);
        if self.tick >= tick_lower && self.tick < tick_upper {
            self.liquidity = self.liquidity.saturating_sub(liquidity);
        }
    }

    fn prune_tick(&mut self, tick: i32) {
        if self.ticks.get(&tick) == Some(&0) {
            self.ticks.remove(&tick);
        }
    }

    /// Next initialized tick in the swap direction, if any.
    fn next_initialized_tick(&self, tick: i32, zero_for_one: bool) -> Option<i32> {
        if zero_for_one {
            self.ticks.range(..=tick).next_back().map(|(t, _)| *t)
        } else {
            self.ticks.range(tick + 1..).next().map(|(t, _)| *t)
        }
    }

    /// Simulate an exact-input swap.
    ///
    /// `zero_for_one` sells token0 for token1 (price moves down).
    pub fn quote(&self, amount_in: u128, zero_for_one: bool) -> AmmResult<V3Quote> {
        if amount_in == 0 {
            return Ok(V3Quote {
                amount_out: 0,
                amount_in_consumed: 0,
                sqrt_price_after: self.sqrt_price_x96,
                tick_after: self.tick,
                liquidity_after: self.liquidity,
                ticks_crossed: 0,
            });
        }
        if self.liquidity == 0 && self.ticks.is_empty() {
            return Err(AmmError::ZeroLiquidity);
        }

        let price_floor = min_sqrt_ratio() + U256::one();
        let price_ceiling = max_sqrt_ratio() - U256::one();

        let mut sqrt_price = self.sqrt_price_x96;
        let mut liquidity = self.liquidity;
        let mut tick = self.tick;
        let mut amount_remaining = U256::from(amount_in);
        let mut amount_out = U256::zero();
        let mut ticks_crossed = 0u32;

        while !amount_remaining.is_zero() && ticks_crossed < MAX_TICKS_CROSSED {
            let next_tick = self.next_initialized_tick(tick, zero_for_one);

            let boundary = match next_tick {
                Some(t) => sqrt_ratio_at_tick(t)?,
                None => {
                    if zero_for_one {
                        price_floor
                    } else {
                        price_ceiling
                    }
                }
            };
            // Clamp so a boundary beyond the usable range never overshoots.
            let target = if zero_for_one {
                boundary.max(price_floor)
            } else {
                boundary.min(price_ceiling)
            };

            if target == sqrt_price {
                // Already pinned to this boundary; cross it or stop.
                match next_tick {
                    Some(t) => {
                        liquidity = apply_liquidity_net(
                            liquidity,
                            self.ticks[&t],
                            zero_for_one,
                        )?;
                        tick = if zero_for_one { t - 1 } else { t };
                        ticks_crossed += 1;
                        continue;
                    }
                    None => break,
                }
            }

            if liquidity == 0 {
                // No active liquidity in this range: the price jumps to the
                // boundary without filling anything.
                match next_tick {
                    Some(t) => {
                        sqrt_price = target;
                        liquidity =
                            apply_liquidity_net(liquidity, self.ticks[&t], zero_for_one)?;
                        tick = if zero_for_one { t - 1 } else { t };
                        ticks_crossed += 1;
                        continue;
                    }
                    None => break,
                }
            }

            let (sqrt_next, step_in, step_out, step_fee) = compute_swap_step(
                sqrt_price,
                target,
                liquidity,
                amount_remaining,
                self.fee_pips,
            )?;

            let consumed = step_in + step_fee;
            amount_remaining = amount_remaining.saturating_sub(consumed);
            amount_out += step_out;
            sqrt_price = sqrt_next;

            if sqrt_next == target {
                match next_tick {
                    Some(t) if boundary == target => {
                        liquidity =
                            apply_liquidity_net(liquidity, self.ticks[&t], zero_for_one)?;
                        tick = if zero_for_one { t - 1 } else { t };
                        ticks_crossed += 1;
                    }
                    _ => break,
                }
            } else {
                // Finished inside the current range.
                break;
            }
        }

        let amount_in_u256 = U256::from(amount_in);
        let consumed = amount_in_u256 - amount_remaining;
        Ok(V3Quote {
            amount_out: to_u128(amount_out)?,
            amount_in_consumed: to_u128(consumed)?,
            sqrt_price_after: sqrt_price,
            tick_after: tick,
            liquidity_after: liquidity,
            ticks_crossed,
        })
    }

    /// Price impact of a swap in basis points, from the squared sqrt-price
    /// ratio before and after.
    pub fn price_impact_bps(&self, quote: &V3Quote) -> AmmResult<u32> {
        let before = self.sqrt_price_x96.full_mul(self.sqrt_price_x96);
        let after = quote.sqrt_price_after.full_mul(quote.sqrt_price_after);
        if before.is_zero() {
            return Err(AmmError::ZeroLiquidity);
        }
        let diff = if before >= after {
            before - after
        } else {
            after - before
        };
        // Squared prices fit well inside 2^320, so the scaled numerator
        // stays inside U512.
        let scaled = diff * U512::from(10_000u64) / before;
        let bps = U256::try_from(scaled).map_err(|_| AmmError::Overflow("v3 impact"))?;
        Ok(bps.low_u32().min(10_000))
    }

    /// The token1 value of the active range's liquidity, used as a depth
    /// proxy when bounding arbitrage size against a V3 pool.
    pub fn depth_proxy_token1(&self) -> AmmResult<u128> {
        if self.liquidity == 0 {
            return Ok(0);
        }
        let lower = min_sqrt_ratio().max(self.sqrt_price_x96 / U256::from(2u64));
        let amount = amount1_delta(lower, self.sqrt_price_x96, self.liquidity, false)?;
        to_u128(amount)
    }
}

fn apply_liquidity_net(liquidity: u128, net: i128, zero_for_one: bool) -> AmmResult<u128> {
    // Crossing downward applies the negated net.
    let signed = if zero_for_one { -net } else { net };
    let result = (liquidity as i128).checked_add(signed);
    match result {
        Some(v) if v >= 0 => Ok(v as u128),
        _ => Err(AmmError::Overflow("liquidity_net application")),
    }
}

fn to_u128(value: U256) -> AmmResult<u128> {
    if value > U256::from(u128::MAX) {
        Err(AmmError::Overflow("u128 narrowing"))
    } else {
        Ok(value.as_u128())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tick_math::q96;

    /// Pool at price 1.0 with a single wide full-range-ish position.
    fn simple_pool(liquidity: u128) -> V3PoolMath {
        let mut pool = V3PoolMath::new(q96(), liquidity, 0, 3000, 60).unwrap();
        pool.set_tick(-887_220, liquidity as i128);
        pool.set_tick(887_220, -(liquidity as i128));
        pool
    }

    #[test]
    fn zero_input_is_zero_output() {
        let pool = simple_pool(10u128.pow(21));
        let quote = pool.quote(0, true).unwrap();
        assert_eq!(quote.amount_out, 0);
        assert_eq!(quote.sqrt_price_after, pool.sqrt_price_x96);
    }

    #[test]
    fn small_swap_near_price_one_returns_almost_input_less_fee() {
        let pool = simple_pool(10u128.pow(24));
        let amount_in = 10u128.pow(18);
        let quote = pool.quote(amount_in, true).unwrap();

        // Price 1.0, 0.3% fee, deep liquidity: output ≈ 0.997 of input.
        let expected = amount_in * 997 / 1000;
        let tolerance = amount_in / 1000;
        assert!(quote.amount_out > expected - tolerance);
        assert!(quote.amount_out < expected + tolerance);
        assert_eq!(quote.ticks_crossed, 0);
        assert!(quote.sqrt_price_after < pool.sqrt_price_x96);
    }

    #[test]
    fn swap_direction_moves_price_correctly() {
        let pool = simple_pool(10u128.pow(24));
        let down = pool.quote(10u128.pow(20), true).unwrap();
        let up = pool.quote(10u128.pow(20), false).unwrap();
        assert!(down.sqrt_price_after < pool.sqrt_price_x96);
        assert!(up.sqrt_price_after > pool.sqrt_price_x96);
    }

    #[test]
    fn crossing_a_tick_applies_liquidity_net() {
        let base = 10u128.pow(20);
        let extra = 5 * 10u128.pow(19);
        let mut pool = V3PoolMath::new(q96(), base + extra, 0, 3000, 60).unwrap();
        // Outer full-range position.
        pool.set_tick(-887_220, base as i128);
        pool.set_tick(887_220, -(base as i128));
        // Concentrated position just below the current price: its lower
        // bound at tick -120 sheds `extra` when crossed downward.
        pool.set_tick(-120, extra as i128);
        pool.set_tick(120, -(extra as i128));

        // Large enough to push the price through tick -120.
        let quote = pool.quote(10u128.pow(19), true).unwrap();
        assert!(quote.ticks_crossed >= 1, "crossed {}", quote.ticks_crossed);
        assert_eq!(quote.liquidity_after, base);
        assert!(quote.tick_after < -120);
    }

    #[test]
    fn traversal_is_capped() {
        let unit = 10u128.pow(15);
        let mut pool = V3PoolMath::new(q96(), unit, 0, 3000, 1).unwrap();
        // A dense ladder of tiny positions below the price.
        for i in 1..=100i32 {
            pool.set_tick(-i, 1);
        }
        pool.set_tick(-101, unit as i128);

        let quote = pool.quote(u64::MAX as u128, true).unwrap();
        assert!(quote.ticks_crossed <= MAX_TICKS_CROSSED);
    }

    #[test]
    fn no_liquidity_anywhere_is_an_error() {
        let pool = V3PoolMath::new(q96(), 0, 0, 3000, 60).unwrap();
        assert_eq!(pool.quote(1_000, true), Err(AmmError::ZeroLiquidity));
    }

    #[test]
    fn mint_and_burn_track_active_liquidity() {
        let mut pool = V3PoolMath::new(q96(), 0, 0, 3000, 60).unwrap();
        pool.apply_mint(-60, 60, 1_000_000);
        assert_eq!(pool.liquidity, 1_000_000);
        // Position not spanning the current tick leaves active liquidity alone.
        pool.apply_mint(120, 180, 500_000);
        assert_eq!(pool.liquidity, 1_000_000);
        pool.apply_burn(-60, 60, 400_000);
        assert_eq!(pool.liquidity, 600_000);
    }

    #[test]
    fn price_impact_grows_with_size() {
        let pool = simple_pool(10u128.pow(22));
        let small = pool.quote(10u128.pow(16), true).unwrap();
        let large = pool.quote(10u128.pow(20), true).unwrap();
        assert!(
            pool.price_impact_bps(&small).unwrap() <= pool.price_impact_bps(&large).unwrap()
        );
    }
}
