//! # Polygon DEX Adapter
//!
//! Owns one WebSocket connection to a Polygon RPC node and turns raw
//! Uniswap V2/V3 log events into typed TLV messages on the MarketData
//! relay.
//!
//! Connection lifecycle:
//!
//! 1. Connect, `eth_subscribe("logs")` for the Swap/Sync/Mint/Burn
//!    signatures of the watched pool set
//! 2. Snapshot every pool over HTTP RPC and emit `PoolState` before any
//!    incremental event for that pool
//! 3. Stream events: dedup on (tx-hash, log-index), decode, emit with
//!    monotonic sequencing
//! 4. On disconnect: exponential backoff, resubscribe, re-snapshot, and
//!    announce a `SourceReset` with the new sequence base

pub mod abi;
pub mod adapter;
pub mod constants;
pub mod snapshot;

pub use adapter::PolygonAdapter;
