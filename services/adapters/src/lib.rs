//! # Adapter Substrate
//!
//! Shared machinery for every venue adapter and relay consumer:
//!
//! - [`RelayOutput`]: a reconnecting Unix-socket writer carrying finished
//!   frames to a relay
//! - [`RelayConsumer`]: a reconnecting framed reader for subscribers
//! - [`DedupWindow`]: bounded LRU guaranteeing at-most-once emission per
//!   upstream event
//! - [`SequenceAllocator`]: per-(source, domain) monotonic sequencing with
//!   reset announcements
//! - [`ExponentialBackoff`]: shared retry pacing for transient failures
//!
//! An adapter owns one upstream connection and plugs into the relay through
//! the capability set `{ start, stop, subscribe, state_snapshot }`.

pub mod backoff;
pub mod dedup;
pub mod error;
pub mod relay_consumer;
pub mod relay_output;
pub mod sequence;

pub use backoff::ExponentialBackoff;
pub use dedup::DedupWindow;
pub use error::{AdapterError, AdapterResult};
pub use relay_consumer::RelayConsumer;
pub use relay_output::RelayOutput;
pub use sequence::SequenceAllocator;

use async_trait::async_trait;
use types::InstrumentId;

/// Capability set every adapter satisfies to plug into the relay.
#[async_trait]
pub trait Adapter: Send + Sync {
    /// Connect upstream and run until stopped; resolves only on fatal error.
    async fn start(&mut self) -> AdapterResult<()>;

    /// Stop the upstream connection and flush state.
    async fn stop(&mut self) -> AdapterResult<()>;

    /// Narrow the watched instrument set.
    async fn subscribe(&mut self, ids: Vec<InstrumentId>) -> AdapterResult<()>;

    /// Re-emit full state snapshots for everything watched.
    async fn state_snapshot(&mut self) -> AdapterResult<()>;
}
