//! Q64.96 square-root-price primitives for concentrated liquidity
//!
//! Faithful reproduction of the reference AMM contract's fixed-point
//! arithmetic: tick → sqrt-price conversion, token-amount deltas over a
//! price range, and next-price-from-input, each with the contract's exact
//! rounding direction. All intermediates use 512-bit multiplication before
//! division so nothing truncates early.

use crate::{AmmError, AmmResult};
use ethers_core::types::{U256, U512};

/// Lowest usable tick (price ≈ 2^-128).
pub const MIN_TICK: i32 = -887_272;
/// Highest usable tick.
pub const MAX_TICK: i32 = 887_272;

/// One in Q64.96.
pub fn q96() -> U256 {
    U256::one() << 96
}

/// sqrt(1.0001^MIN_TICK) in Q64.96.
pub fn min_sqrt_ratio() -> U256 {
    U256::from(4_295_128_739u64)
}

/// sqrt(1.0001^MAX_TICK) in Q64.96.
pub fn max_sqrt_ratio() -> U256 {
    U256::from_dec_str("1461446703485210103287273052203988822378723970342")
        .expect("constant parses")
}

/// floor(a * b / denominator) with a 512-bit intermediate product.
pub fn mul_div(a: U256, b: U256, denominator: U256) -> AmmResult<U256> {
    if denominator.is_zero() {
        return Err(AmmError::Overflow("mul_div by zero"));
    }
    let result = a.full_mul(b) / U512::from(denominator);
    U256::try_from(result).map_err(|_| AmmError::Overflow("mul_div"))
}

/// ceil(a * b / denominator).
pub fn mul_div_rounding_up(a: U256, b: U256, denominator: U256) -> AmmResult<U256> {
    if denominator.is_zero() {
        return Err(AmmError::Overflow("mul_div by zero"));
    }
    let product = a.full_mul(b);
    let denominator512 = U512::from(denominator);
    let mut result = product / denominator512;
    if product % denominator512 != U512::zero() {
        result += U512::one();
    }
    U256::try_from(result).map_err(|_| AmmError::Overflow("mul_div_rounding_up"))
}

fn div_rounding_up(numerator: U256, denominator: U256) -> U256 {
    let quotient = numerator / denominator;
    if numerator % denominator != U256::zero() {
        quotient + U256::one()
    } else {
        quotient
    }
}

/// sqrt(1.0001^tick) in Q64.96 fixed point.
///
/// Binary decomposition over precomputed Q128.128 factors, exactly as the
/// reference contract computes it; the result is the canonical value for
/// every tick in range.
pub fn sqrt_ratio_at_tick(tick: i32) -> AmmResult<U256> {
    if !(MIN_TICK..=MAX_TICK).contains(&tick) {
        return Err(AmmError::TickOutOfBounds(tick));
    }
    let abs_tick = tick.unsigned_abs();

    const FACTORS: [(u32, &str); 20] = [
        (0x1, "fffcb933bd6fad37aa2d162d1a594001"),
        (0x2, "fff97272373d413259a46990580e213a"),
        (0x4, "fff2e50f5f656932ef12357cf3c7fdcc"),
        (0x8, "ffe5caca7e10e4e61c3624eaa0941cd0"),
        (0x10, "ffcb9843d60f6159c9db58835c926644"),
        (0x20, "ff973b41fa98c081472e6896dfb254c0"),
        (0x40, "ff2ea16466c96a3843ec78b326b52861"),
        (0x80, "fe5dee046a99a2a811c461f1969c3053"),
        (0x100, "fcbe86c7900a88aedcffc83b479aa3a4"),
        (0x200, "f987a7253ac413176f2b074cf7815e54"),
        (0x400, "f3392b0822b70005940c7a398e4b70f3"),
        (0x800, "e7159475a2c29b7443b29c7fa6e889d9"),
        (0x1000, "d097f3bdfd2022b8845ad8f792aa5825"),
        (0x2000, "a9f746462d870fdf8a65dc1f90e061e5"),
        (0x4000, "70d869a156d2a1b890bb3df62baf32f7"),
        (0x8000, "31be135f97d08fd981231505542fcfa6"),
        (0x10000, "9aa508b5b7a84e1c677de54f3e99bc9"),
        (0x20000, "5d6af8dedb81196699c329225ee604"),
        (0x40000, "2216e584f5fa1ea926041bedfe98"),
        (0x80000, "48a170391f7dc42444e8fa2"),
    ];

    let mut ratio = if abs_tick & 0x1 != 0 {
        U256::from_str_radix(FACTORS[0].1, 16).expect("constant parses")
    } else {
        U256::one() << 128
    };

    for &(bit, factor) in &FACTORS[1..] {
        if abs_tick & bit != 0 {
            let factor = U256::from_str_radix(factor, 16).expect("constant parses");
            ratio = U256::try_from(ratio.full_mul(factor) >> 128)
                .map_err(|_| AmmError::Overflow("sqrt_ratio_at_tick"))?;
        }
    }

    if tick > 0 {
        ratio = U256::MAX / ratio;
    }

    // Q128.128 → Q64.96, rounding up.
    let shifted = ratio >> 32;
    let remainder = ratio & ((U256::one() << 32) - U256::one());
    Ok(if remainder.is_zero() {
        shifted
    } else {
        shifted + U256::one()
    })
}

/// Token0 owed over the price range [sqrt_a, sqrt_b] at `liquidity`.
///
/// `amount0 = L · 2^96 · (sqrt_b − sqrt_a) / (sqrt_b · sqrt_a)`
pub fn amount0_delta(
    sqrt_a: U256,
    sqrt_b: U256,
    liquidity: u128,
    round_up: bool,
) -> AmmResult<U256> {
    let (lower, upper) = if sqrt_a <= sqrt_b {
        (sqrt_a, sqrt_b)
    } else {
        (sqrt_b, sqrt_a)
    };
    if lower.is_zero() {
        return Err(AmmError::Overflow("amount0_delta zero price"));
    }
    let numerator1 = U256::from(liquidity) << 96;
    let numerator2 = upper - lower;

    if round_up {
        let intermediate = mul_div_rounding_up(numerator1, numerator2, upper)?;
        Ok(div_rounding_up(intermediate, lower))
    } else {
        Ok(mul_div(numerator1, numerator2, upper)? / lower)
    }
}

/// Token1 owed over the price range [sqrt_a, sqrt_b] at `liquidity`.
///
/// `amount1 = L · (sqrt_b − sqrt_a) / 2^96`
pub fn amount1_delta(
    sqrt_a: U256,
    sqrt_b: U256,
    liquidity: u128,
    round_up: bool,
) -> AmmResult<U256> {
    let (lower, upper) = if sqrt_a <= sqrt_b {
        (sqrt_a, sqrt_b)
    } else {
        (sqrt_b, sqrt_a)
    };
    if round_up {
        mul_div_rounding_up(U256::from(liquidity), upper - lower, q96())
    } else {
        mul_div(U256::from(liquidity), upper - lower, q96())
    }
}

/// Next sqrt price after spending `amount_in` of the input token.
///
/// Selling token0 pushes the price down; selling token1 pushes it up. The
/// result rounds in the pool's favor, matching the contract.
pub fn next_sqrt_price_from_input(
    sqrt_price: U256,
    liquidity: u128,
    amount_in: U256,
    zero_for_one: bool,
) -> AmmResult<U256> {
    if liquidity == 0 {
        return Err(AmmError::ZeroLiquidity);
    }
    if amount_in.is_zero() {
        return Ok(sqrt_price);
    }
    let numerator1 = U256::from(liquidity) << 96;

    if zero_for_one {
        // price = L·2^96·sqrtP / (L·2^96 + in·sqrtP), rounded up
        let product = amount_in.full_mul(sqrt_price);
        let denominator = U512::from(numerator1) + product;
        let numerator = numerator1.full_mul(sqrt_price);
        let mut next = numerator / denominator;
        if numerator % denominator != U512::zero() {
            next += U512::one();
        }
        U256::try_from(next).map_err(|_| AmmError::Overflow("next price down"))
    } else {
        // price = sqrtP + in·2^96 / L, rounded down
        let quotient = mul_div(amount_in, q96(), U256::from(liquidity))?;
        sqrt_price
            .checked_add(quotient)
            .ok_or(AmmError::Overflow("next price up"))
    }
}

/// One step of a swap toward `sqrt_target`, consuming at most
/// `amount_remaining` (exact input, fee-inclusive).
///
/// Returns `(sqrt_next, amount_in, amount_out, fee_amount)` where
/// `amount_in` excludes the fee.
pub fn compute_swap_step(
    sqrt_current: U256,
    sqrt_target: U256,
    liquidity: u128,
    amount_remaining: U256,
    fee_pips: u32,
) -> AmmResult<(U256, U256, U256, U256)> {
    let zero_for_one = sqrt_current >= sqrt_target;
    let fee_denominator = U256::from(1_000_000u64);
    let fee = U256::from(fee_pips);

    let amount_remaining_less_fee =
        mul_div(amount_remaining, fee_denominator - fee, fee_denominator)?;

    let amount_in_to_target = if zero_for_one {
        amount0_delta(sqrt_target, sqrt_current, liquidity, true)?
    } else {
        amount1_delta(sqrt_current, sqrt_target, liquidity, true)?
    };

    let (sqrt_next, amount_in) = if amount_remaining_less_fee >= amount_in_to_target {
        (sqrt_target, amount_in_to_target)
    } else {
        let next = next_sqrt_price_from_input(
            sqrt_current,
            liquidity,
            amount_remaining_less_fee,
            zero_for_one,
        )?;
        let consumed = if zero_for_one {
            amount0_delta(next, sqrt_current, liquidity, true)?
        } else {
            amount1_delta(sqrt_current, next, liquidity, true)?
        };
        (next, consumed)
    };

    let amount_out = if zero_for_one {
        amount1_delta(sqrt_next, sqrt_current, liquidity, false)?
    } else {
        amount0_delta(sqrt_next, sqrt_current, liquidity, false)?
    };

    let fee_amount = if sqrt_next != sqrt_target {
        // Partial step: everything not consumed as principal is fee.
        amount_remaining - amount_in
    } else {
        mul_div_rounding_up(amount_in, fee, fee_denominator - fee)?
    };

    Ok((sqrt_next, amount_in, amount_out, fee_amount))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sqrt_ratio_at_known_ticks() {
        assert_eq!(sqrt_ratio_at_tick(0).unwrap(), q96());
        assert_eq!(sqrt_ratio_at_tick(MIN_TICK).unwrap(), min_sqrt_ratio());
        assert_eq!(sqrt_ratio_at_tick(MAX_TICK).unwrap(), max_sqrt_ratio());
        assert!(sqrt_ratio_at_tick(MAX_TICK + 1).is_err());
        assert!(sqrt_ratio_at_tick(MIN_TICK - 1).is_err());
    }

    #[test]
    fn sqrt_ratio_is_monotonic() {
        let mut prev = sqrt_ratio_at_tick(-100).unwrap();
        for tick in -99..=100 {
            let current = sqrt_ratio_at_tick(tick).unwrap();
            assert!(current > prev, "not monotonic at tick {tick}");
            prev = current;
        }
    }

    #[test]
    fn one_tick_is_roughly_a_basis_point_of_price() {
        // sqrt(1.0001) ≈ 1.00005; price moves ~1.0001x per tick.
        let at_zero = sqrt_ratio_at_tick(0).unwrap();
        let at_one = sqrt_ratio_at_tick(1).unwrap();
        let diff = at_one - at_zero;
        // 0.005% of 2^96, within tight tolerance.
        let expected = q96() / U256::from(20_000u64);
        assert!(diff > expected * U256::from(99u64) / U256::from(100u64));
        assert!(diff < expected * U256::from(101u64) / U256::from(100u64));
    }

    #[test]
    fn amount_deltas_are_symmetric_in_argument_order() {
        let a = sqrt_ratio_at_tick(-60).unwrap();
        let b = sqrt_ratio_at_tick(60).unwrap();
        let liquidity = 1_000_000_000_000u128;
        assert_eq!(
            amount0_delta(a, b, liquidity, false).unwrap(),
            amount0_delta(b, a, liquidity, false).unwrap()
        );
        assert_eq!(
            amount1_delta(a, b, liquidity, true).unwrap(),
            amount1_delta(b, a, liquidity, true).unwrap()
        );
    }

    #[test]
    fn rounding_up_never_rounds_down() {
        let a = sqrt_ratio_at_tick(-10).unwrap();
        let b = sqrt_ratio_at_tick(35).unwrap();
        let liquidity = 123_456_789_012u128;
        assert!(
            amount0_delta(a, b, liquidity, true).unwrap()
                >= amount0_delta(a, b, liquidity, false).unwrap()
        );
        assert!(
            amount1_delta(a, b, liquidity, true).unwrap()
                >= amount1_delta(a, b, liquidity, false).unwrap()
        );
    }

    #[test]
    fn next_price_moves_in_swap_direction() {
        let price = q96();
        let liquidity = 10u128.pow(18);
        let down =
            next_sqrt_price_from_input(price, liquidity, U256::from(10u128.pow(12)), true)
                .unwrap();
        let up =
            next_sqrt_price_from_input(price, liquidity, U256::from(10u128.pow(12)), false)
                .unwrap();
        assert!(down < price);
        assert!(up > price);
    }

    #[test]
    fn swap_step_within_range_conserves_input() {
        let current = q96();
        let target = sqrt_ratio_at_tick(-600).unwrap();
        let liquidity = 10u128.pow(21);
        let amount_remaining = U256::from(10u128.pow(15));

        let (next, amount_in, amount_out, fee) =
            compute_swap_step(current, target, liquidity, amount_remaining, 3000).unwrap();

        // Stayed inside the range and consumed the full input.
        assert!(next > target && next < current);
        assert_eq!(amount_in + fee, amount_remaining);
        assert!(amount_out > U256::zero());
    }

    #[test]
    fn swap_step_stops_at_boundary() {
        let current = q96();
        let target = sqrt_ratio_at_tick(-60).unwrap();
        let liquidity = 10u128.pow(12);
        // Far more input than the range can absorb.
        let amount_remaining = U256::from(10u128.pow(30));

        let (next, amount_in, _, fee) =
            compute_swap_step(current, target, liquidity, amount_remaining, 3000).unwrap();

        assert_eq!(next, target);
        assert!(amount_in + fee < amount_remaining);
    }
}
