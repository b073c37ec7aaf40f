//! # Dexflow Type System
//!
//! Unified type definitions shared by every stage of the pipeline.
//!
//! ## Design Philosophy
//!
//! - **No Precision Loss**: every financial value is a scaled integer with an
//!   explicit decimals field; floating point never appears on the financial path
//! - **Type Safety**: distinct types prevent mixing incompatible scales or domains
//! - **Deterministic Identity**: instrument ids are stable hashes of canonical
//!   descriptors, identical on any host, forever
//! - **Explicit Ownership**: registries are owned by each process; no
//!   module-level singletons
//!
//! ## Quick Start
//!
//! ```rust
//! use types::{InstrumentId, TokenAmount, UsdFixedPoint8};
//!
//! let pool = InstrumentId::from_descriptor(
//!     "quickswap:137:0x853ee4b2a13f8a742d64c8f088be7ba2131f670d:0x7ceb23fd6bc0add59e62ac25578270cff1b9f619:0x2791bca1f2de4661ed88a30c99a7a9449aa84174",
//! );
//! let one_weth = TokenAmount::new(1_000_000_000_000_000_000, 18).unwrap();
//! let price = UsdFixedPoint8::from_decimal_str("2000.50").unwrap();
//! ```

pub mod fixed_point;
pub mod instrument;
pub mod precision;

pub use fixed_point::UsdFixedPoint8;
pub use instrument::{InstrumentId, InstrumentRegistry};
pub use precision::{rescale, rescale_exact, usd_value, PrecisionError, TokenAmount};

use std::time::{SystemTime, UNIX_EPOCH};

/// Maximum decimals any token amount may carry.
pub const MAX_TOKEN_DECIMALS: u8 = 30;

/// Nanoseconds since the Unix epoch.
pub type TsNanos = u64;

/// Current wall-clock time in nanoseconds since the Unix epoch.
pub fn current_timestamp_ns() -> TsNanos {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamp_is_nanoseconds() {
        let ts = current_timestamp_ns();
        // Any plausible wall clock after 2020 exceeds 1.5e18 ns.
        assert!(ts > 1_500_000_000_000_000_000);
    }
}
