//! Uniswap V2 constant-product math, bit-exact to the reference contract
//!
//! All intermediates are 256-bit; integer division truncates exactly like
//! the contract's `uint256` arithmetic.

use crate::{AmmError, AmmResult};
use ethers_core::types::{U256, U512};

const FEE_DENOMINATOR: u64 = 10_000;

/// Reserves oriented for one swap direction plus the pool fee.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct V2PoolMath {
    pub reserve_in: u128,
    pub reserve_out: u128,
    /// Fee in basis points (30 = 0.30%)
    pub fee_bps: u32,
}

impl V2PoolMath {
    pub fn new(reserve_in: u128, reserve_out: u128, fee_bps: u32) -> AmmResult<Self> {
        if reserve_in == 0 || reserve_out == 0 {
            return Err(AmmError::ZeroReserves);
        }
        Ok(Self {
            reserve_in,
            reserve_out,
            fee_bps,
        })
    }

    /// Swap this pool's direction: the returned math quotes out→in.
    pub fn reversed(&self) -> Self {
        Self {
            reserve_in: self.reserve_out,
            reserve_out: self.reserve_in,
            fee_bps: self.fee_bps,
        }
    }

    /// Exact output for a given input:
    ///
    /// ```text
    /// amount_in_with_fee = amount_in * (10000 − fee)
    /// output = (amount_in_with_fee * R_out) / (R_in * 10000 + amount_in_with_fee)
    /// ```
    pub fn quote(&self, amount_in: u128) -> AmmResult<u128> {
        if amount_in == 0 {
            return Ok(0);
        }
        let amount_in_with_fee =
            U256::from(amount_in) * U256::from(FEE_DENOMINATOR - self.fee_bps as u64);
        let numerator = amount_in_with_fee.full_mul(U256::from(self.reserve_out));
        let denominator = U512::from(
            U256::from(self.reserve_in) * U256::from(FEE_DENOMINATOR) + amount_in_with_fee,
        );
        let out = numerator / denominator;
        u256_from_u512(out)
            .and_then(|v| if v > U256::from(u128::MAX) { None } else { Some(v.as_u128()) })
            .ok_or(AmmError::Overflow("v2 quote"))
    }

    /// Required input for a desired output, rounded up so the input always
    /// suffices. Errors when the output would drain the reserve.
    pub fn quote_input(&self, amount_out: u128) -> AmmResult<u128> {
        if amount_out == 0 {
            return Ok(0);
        }
        if amount_out >= self.reserve_out {
            return Err(AmmError::InputTooLarge);
        }
        let numerator = (U256::from(self.reserve_in) * U256::from(FEE_DENOMINATOR))
            .full_mul(U256::from(amount_out));
        let denominator = U512::from(
            U256::from(self.reserve_out - amount_out)
                * U256::from(FEE_DENOMINATOR - self.fee_bps as u64),
        );
        let input = numerator / denominator + U512::one();
        u256_from_u512(input)
            .and_then(|v| if v > U256::from(u128::MAX) { None } else { Some(v.as_u128()) })
            .ok_or(AmmError::Overflow("v2 quote_input"))
    }

    /// Price impact of a swap in basis points, from pre/post reserve ratios.
    ///
    /// The fee is excluded so the figure isolates the curvature cost, the
    /// same way the original detector measured it.
    pub fn price_impact_bps(&self, amount_in: u128) -> AmmResult<u32> {
        if amount_in == 0 {
            return Ok(0);
        }
        let no_fee = Self {
            fee_bps: 0,
            ..*self
        };
        let amount_out = no_fee.quote(amount_in)?;

        // impact = 1 − ((R_out − out)·R_in) / ((R_in + in)·R_out)
        let new_in = U256::from(self.reserve_in) + U256::from(amount_in);
        let new_out = U256::from(self.reserve_out - amount_out);
        let before = U256::from(self.reserve_out).full_mul(new_in);
        let after = new_out.full_mul(U256::from(self.reserve_in));
        let diff = before - after;
        let impact = diff * U512::from(FEE_DENOMINATOR) / before;
        u256_from_u512(impact)
            .map(|v| v.low_u32())
            .ok_or(AmmError::Overflow("v2 price impact"))
    }
}

pub(crate) fn u256_from_u512(value: U512) -> Option<U256> {
    U256::try_from(value).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_quote_vector() {
        // Reserves (1e12, 2e12), fee 30 bps, input 1e9:
        // (997_000_000 * 2e12) / (1e12 * 10000 + 997_000_000) = 1_993_012_003
        let pool = V2PoolMath::new(1_000_000_000_000, 2_000_000_000_000, 30).unwrap();
        assert_eq!(pool.quote(1_000_000_000).unwrap(), 1_993_012_003);
    }

    #[test]
    fn zero_input_yields_zero_output() {
        let pool = V2PoolMath::new(10u128.pow(18), 10u128.pow(18), 30).unwrap();
        assert_eq!(pool.quote(0).unwrap(), 0);
    }

    #[test]
    fn quote_is_strictly_increasing_and_concave() {
        let pool = V2PoolMath::new(10u128.pow(12), 2 * 10u128.pow(12), 30).unwrap();
        let step = 10u128.pow(9);
        let mut prev_out = 0u128;
        let mut prev_gain = u128::MAX;
        for i in 1..=100u128 {
            let out = pool.quote(i * step).unwrap();
            assert!(out > prev_out, "not increasing at step {i}");
            let gain = out - prev_out;
            assert!(gain <= prev_gain, "not concave at step {i}");
            prev_out = out;
            prev_gain = gain;
        }
    }

    #[test]
    fn input_equal_to_reserve_stays_below_opposing_reserve() {
        let pool = V2PoolMath::new(10u128.pow(18), 3 * 10u128.pow(18), 30).unwrap();
        let out = pool.quote(pool.reserve_in).unwrap();
        assert!(out < pool.reserve_out);
    }

    #[test]
    fn quote_input_covers_quote() {
        let pool = V2PoolMath::new(5 * 10u128.pow(12), 7 * 10u128.pow(12), 30).unwrap();
        let out = pool.quote(10u128.pow(10)).unwrap();
        let needed = pool.quote_input(out).unwrap();
        // The rounded-up input must buy at least the requested output.
        assert!(pool.quote(needed).unwrap() >= out);
        assert!(needed <= 10u128.pow(10) + 10u128.pow(7));
    }

    #[test]
    fn quote_input_rejects_reserve_drain() {
        let pool = V2PoolMath::new(10u128.pow(12), 10u128.pow(12), 30).unwrap();
        assert_eq!(
            pool.quote_input(pool.reserve_out),
            Err(AmmError::InputTooLarge)
        );
    }

    #[test]
    fn empty_reserves_are_rejected() {
        assert_eq!(V2PoolMath::new(0, 1, 30), Err(AmmError::ZeroReserves));
        assert_eq!(V2PoolMath::new(1, 0, 30), Err(AmmError::ZeroReserves));
    }

    #[test]
    fn price_impact_grows_with_size() {
        let pool = V2PoolMath::new(10u128.pow(15), 10u128.pow(15), 30).unwrap();
        let small = pool.price_impact_bps(10u128.pow(11)).unwrap();
        let large = pool.price_impact_bps(10u128.pow(14)).unwrap();
        assert!(small < large);
        // A 10% trade moves the price several hundred bps.
        assert!(large > 500, "impact {large}");
    }
}
