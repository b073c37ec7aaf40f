//! # AMM Math Engine
//!
//! Exact output calculation for the two pool families the pipeline trades
//! against, plus optimal-size search for the arbitrage detector.
//!
//! - **V2 constant product** (`x·y = k`): bit-exact reproduction of the
//!   reference contract's integer arithmetic in 256-bit intermediates
//! - **V3 concentrated liquidity**: Q64.96 square-root-price math with tick
//!   traversal, liquidity-net application at crossed ticks, and exact
//!   per-step rounding, as the reference AMM contract computes it
//! - **Optimal sizing**: bounded-iteration binary search for the smooth
//!   V2↔V2 profit curve, fixed-rate numerical gradient ascent for the
//!   piecewise-smooth curves that involve a V3 leg
//!
//! Everything is integer arithmetic. No floating point appears anywhere in
//! this crate; quantities are `u128` raw token amounts at native decimals
//! and prices are Q64.96 fixed point in `U256`.

pub mod optimal_size;
pub mod tick_math;
pub mod v2;
pub mod v3;

pub use optimal_size::{OptimalSwap, PoolLeg, SizingConfig, SizeSearch};
pub use v2::V2PoolMath;
pub use v3::{V3PoolMath, V3Quote};

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AmmError {
    #[error("pool has no reserves")]
    ZeroReserves,

    #[error("pool has no active liquidity")]
    ZeroLiquidity,

    #[error("arithmetic overflow in {0}")]
    Overflow(&'static str),

    #[error("tick {0} outside the valid range")]
    TickOutOfBounds(i32),

    #[error("input amount exceeds what the pool can absorb")]
    InputTooLarge,
}

pub type AmmResult<T> = Result<T, AmmError>;
