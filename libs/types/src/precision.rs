//! Precision-preserving conversion between token decimal scales
//!
//! This module is the sole authority for moving token amounts between their
//! native decimal scale and any other fixed-point scale. All arithmetic is
//! integer-only; widening conversions are exact and narrowing conversions
//! round toward zero, with a checked variant that rejects remainder loss.
//!
//! ## Precision by asset
//!
//! - WETH / DAI / most ERC-20: 18 decimals
//! - USDC / USDT: 6 decimals
//! - WBTC: 8 decimals
//! - USD prices inside signals: 8 decimals (`UsdFixedPoint8`)

use crate::fixed_point::UsdFixedPoint8;
use crate::MAX_TOKEN_DECIMALS;
use ethers_core::types::U256;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum PrecisionError {
    #[error("decimals {0} exceeds the supported maximum of {max}", max = MAX_TOKEN_DECIMALS)]
    DecimalsOutOfRange(u8),

    #[error("conversion overflows 128 bits: {context}")]
    Overflow { context: &'static str },

    #[error("narrowing from {from} to {to} decimals loses a nonzero remainder")]
    RemainderLoss { from: u8, to: u8 },
}

/// A token amount at its native decimal scale.
///
/// The raw value is signed so burn/deficit deltas can be represented; wire
/// payload amounts are unsigned and validated at decode time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TokenAmount {
    pub raw: i128,
    pub decimals: u8,
}

impl TokenAmount {
    pub fn new(raw: i128, decimals: u8) -> Result<Self, PrecisionError> {
        if decimals > MAX_TOKEN_DECIMALS {
            return Err(PrecisionError::DecimalsOutOfRange(decimals));
        }
        Ok(Self { raw, decimals })
    }

    pub const ZERO: Self = Self { raw: 0, decimals: 0 };

    /// Rescale to a different decimal count, rounding toward zero.
    pub fn rescaled(self, decimals: u8) -> Result<Self, PrecisionError> {
        Ok(Self {
            raw: rescale(self.raw, self.decimals, decimals)?,
            decimals,
        })
    }

    /// Rescale, failing if the conversion would lose a nonzero remainder.
    pub fn rescaled_exact(self, decimals: u8) -> Result<Self, PrecisionError> {
        Ok(Self {
            raw: rescale_exact(self.raw, self.decimals, decimals)?,
            decimals,
        })
    }
}

fn pow10_i128(exp: u8) -> Result<i128, PrecisionError> {
    10i128
        .checked_pow(exp as u32)
        .ok_or(PrecisionError::Overflow { context: "10^decimals" })
}

/// Rescale `raw` from `from_decimals` to `to_decimals`.
///
/// Widening multiplies exactly; narrowing divides with truncation toward
/// zero. Callers needing different rounding adjust by one ulp explicitly.
pub fn rescale(raw: i128, from_decimals: u8, to_decimals: u8) -> Result<i128, PrecisionError> {
    if from_decimals > MAX_TOKEN_DECIMALS {
        return Err(PrecisionError::DecimalsOutOfRange(from_decimals));
    }
    if to_decimals > MAX_TOKEN_DECIMALS {
        return Err(PrecisionError::DecimalsOutOfRange(to_decimals));
    }
    if from_decimals == to_decimals {
        return Ok(raw);
    }
    if to_decimals > from_decimals {
        let factor = pow10_i128(to_decimals - from_decimals)?;
        raw.checked_mul(factor)
            .ok_or(PrecisionError::Overflow { context: "widening rescale" })
    } else {
        let factor = pow10_i128(from_decimals - to_decimals)?;
        // i128 division truncates toward zero.
        Ok(raw / factor)
    }
}

/// Rescale, rejecting any conversion that drops a nonzero remainder.
pub fn rescale_exact(raw: i128, from_decimals: u8, to_decimals: u8) -> Result<i128, PrecisionError> {
    if to_decimals >= from_decimals {
        return rescale(raw, from_decimals, to_decimals);
    }
    let factor = pow10_i128(from_decimals - to_decimals)?;
    if raw % factor != 0 {
        return Err(PrecisionError::RemainderLoss {
            from: from_decimals,
            to: to_decimals,
        });
    }
    Ok(raw / factor)
}

/// Value a raw token amount in USD at an 8-decimal fixed-point price.
///
/// `usd = amount_raw * price_q8 / 10^decimals`, computed in 256-bit
/// intermediates and truncated toward zero. Returns `None` when the result
/// exceeds the `i64` range of [`UsdFixedPoint8`] or the price is negative.
pub fn usd_value(amount_raw: u128, decimals: u8, price: UsdFixedPoint8) -> Option<UsdFixedPoint8> {
    if decimals > MAX_TOKEN_DECIMALS || price.raw_value() < 0 {
        return None;
    }
    let scale = U256::from(10u8).pow(U256::from(decimals));
    let product = U256::from(amount_raw).checked_mul(U256::from(price.raw_value() as u64))?;
    let value = product / scale;
    if value > U256::from(i64::MAX as u64) {
        return None;
    }
    Some(UsdFixedPoint8::from_raw(value.as_u64() as i64))
}
