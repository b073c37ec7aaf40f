//! # Coinbase Trade Adapter
//!
//! Subscribes to the public `matches` channel and turns fills into `Trade`
//! messages on the MarketData relay at 8-decimal fixed point. Centralized
//! exchange trades feed the USD price oracle; they are not on the hot
//! arbitrage path, so this adapter favors simplicity over latency.

pub mod adapter;

pub use adapter::CoinbaseAdapter;
