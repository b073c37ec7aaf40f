//! # Dashboard Bridge
//!
//! Subscribes to the MarketData and Signal relays and serves a filtered
//! JSON WebSocket stream to dashboards. This is the only component in the
//! pipeline permitted to render internal fixed-point values as
//! human-readable decimal strings; everything upstream stays integer.
//!
//! Frames referencing instruments whose mapping has not yet arrived are
//! buffered for a bounded window and dropped if the mapping never shows.
//! Per-client backpressure is the relay's drop-oldest policy.

pub mod bridge;
pub mod convert;
pub mod server;

pub use bridge::Bridge;
pub use convert::{arbitrage_json, format_fixed, trade_json};
pub use server::{ClientHub, OutboundFrame};
