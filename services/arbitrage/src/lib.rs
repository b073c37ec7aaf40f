//! # Arbitrage Strategy
//!
//! Maintains a live [`PoolBook`] from the MarketData stream and, on every
//! pool update, hunts for profitable buy-pool/sell-pool pairs over the same
//! token pair. Sizing uses the exact AMM engine; every candidate passes the
//! full guard stack (spread above fees, freshness, per-leg impact,
//! positive net after gas, plausible margin) before a signal is emitted.
//! Opportunities are ephemeral: nothing is remembered between evaluations.

pub mod detector;
pub mod gas_price;
pub mod pool_book;
pub mod price_oracle;
pub mod signal_output;

pub use detector::{Detector, DetectorParams};
pub use gas_price::GasOracle;
pub use pool_book::{PoolBook, PoolEntry};
pub use price_oracle::PriceOracle;
pub use signal_output::SignalOutput;
