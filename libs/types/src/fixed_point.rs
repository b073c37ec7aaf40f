//! Fixed-point arithmetic types for precise financial calculations
//!
//! All values are stored as scaled integers with compile-time decimal scaling.
//! Checked arithmetic is used wherever overflow is reachable; the panicking
//! operator impls exist only for constant-fee arithmetic where overflow is
//! mathematically impossible.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Sub};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum FixedPointError {
    #[error("invalid decimal string: {input}")]
    InvalidDecimal { input: String },

    #[error("value overflows the fixed-point range")]
    Overflow,

    #[error("value underflows the fixed-point range")]
    Underflow,
}

/// Fixed-point USD value with 8 decimal places of precision.
///
/// Scale factor: 100,000,000 (10^8).
///
/// - $1.00 = `UsdFixedPoint8(100_000_000)`
/// - $0.01 = `UsdFixedPoint8(1_000_000)`
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct UsdFixedPoint8(pub i64);

impl UsdFixedPoint8 {
    /// Scale factor for 8 decimal places.
    pub const SCALE: i64 = 100_000_000;

    pub const ZERO: Self = Self(0);
    pub const ONE_CENT: Self = Self(1_000_000);
    pub const ONE_DOLLAR: Self = Self(100_000_000);

    /// Parse from a decimal string with exact scaling.
    ///
    /// This is the primary constructor for values arriving from config files
    /// and external feeds.
    pub fn from_decimal_str(s: &str) -> Result<Self, FixedPointError> {
        use std::str::FromStr;

        let decimal = Decimal::from_str(s).map_err(|_| FixedPointError::InvalidDecimal {
            input: s.to_string(),
        })?;
        let scaled = decimal * Decimal::from(Self::SCALE);
        match scaled.to_i64() {
            Some(value) => Ok(Self(value)),
            None if decimal.is_sign_positive() => Err(FixedPointError::Overflow),
            None => Err(FixedPointError::Underflow),
        }
    }

    /// Construct from the raw scaled integer.
    #[inline]
    pub const fn from_raw(raw: i64) -> Self {
        Self(raw)
    }

    /// Construct from whole dollars.
    #[inline]
    pub const fn from_dollars(dollars: i64) -> Self {
        Self(dollars * Self::SCALE)
    }

    /// Construct from whole cents.
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Self(cents * 1_000_000)
    }

    /// The raw scaled integer value.
    #[inline]
    pub const fn raw_value(self) -> i64 {
        self.0
    }

    pub fn checked_add(self, rhs: Self) -> Option<Self> {
        self.0.checked_add(rhs.0).map(Self)
    }

    pub fn checked_sub(self, rhs: Self) -> Option<Self> {
        self.0.checked_sub(rhs.0).map(Self)
    }

    pub fn checked_mul_quantity(self, qty: i64) -> Option<Self> {
        self.0.checked_mul(qty).map(Self)
    }

    pub fn saturating_add(self, rhs: Self) -> Self {
        Self(self.0.saturating_add(rhs.0))
    }

    pub fn saturating_sub(self, rhs: Self) -> Self {
        Self(self.0.saturating_sub(rhs.0))
    }

    pub fn abs(self) -> Self {
        Self(self.0.abs())
    }

    pub fn is_positive(self) -> bool {
        self.0 > 0
    }

    /// Render as an exact decimal string, e.g. `"2000.5"`.
    ///
    /// Trailing fractional zeros are trimmed; integral values render without
    /// a fractional part. This never loses information.
    pub fn to_decimal_string(self) -> String {
        let negative = self.0 < 0;
        let magnitude = self.0.unsigned_abs();
        let whole = magnitude / Self::SCALE as u64;
        let frac = magnitude % Self::SCALE as u64;
        let sign = if negative { "-" } else { "" };
        if frac == 0 {
            format!("{sign}{whole}")
        } else {
            let frac_str = format!("{frac:08}");
            format!("{sign}{whole}.{}", frac_str.trim_end_matches('0'))
        }
    }
}

impl fmt::Display for UsdFixedPoint8 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${}", self.to_decimal_string())
    }
}

impl Add for UsdFixedPoint8 {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl Sub for UsdFixedPoint8 {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self(self.0 - rhs.0)
    }
}
