//! # Relay Engine
//!
//! ## Purpose
//!
//! Single-domain fan-out over a Unix domain socket: one writer per
//! (domain, source), an unbounded set of subscribers, bounded per-subscriber
//! queues with drop-oldest backpressure, and an atomic bootstrap replay of
//! instrument mappings and latest pool states for every new subscriber.
//!
//! ## Architecture Role
//!
//! ```text
//! Adapter ──► [Relay<MarketDataLogic>] ──► Detector
//!                                      ──► Dashboard
//!                                      ──► Archiver
//! Detector ──► [Relay<SignalLogic>]    ──► Dashboard
//! ```
//!
//! One relay process per domain; a message cannot cross domains without
//! being regenerated by a component.
//!
//! ## Observable contract
//!
//! - Frames from a single source are never reordered
//! - Sequence numbers pass through unchanged
//! - Invalid frames (bad magic, bad CRC, bad size) are dropped and counted;
//!   a source exceeding the violation threshold is disconnected
//! - Subscriber overflow drops the oldest frames, never blocks the writer

pub mod engine;
pub mod queue;
pub mod replay;

pub use engine::{Relay, RelayError, RelayRuntimeConfig};
pub use queue::FrameQueue;
pub use replay::ReplayCache;

use codec::{MessageHeader, RelayDomain};

/// Domain-specific relay behavior.
///
/// The engine is generic over this trait; each domain supplies its routing
/// identity and may tighten the forwarding filter. The default filter is
/// a single byte comparison, which is right for every current domain.
pub trait RelayLogic: Send + Sync + 'static {
    /// The domain this relay serves.
    fn domain(&self) -> RelayDomain;

    /// Whether a validated frame should fan out to subscribers.
    fn should_forward(&self, header: &MessageHeader) -> bool {
        header.domain == self.domain() as u8
    }
}

/// Market data relay: pool events, trades, instrument mappings.
pub struct MarketDataLogic;

impl RelayLogic for MarketDataLogic {
    fn domain(&self) -> RelayDomain {
        RelayDomain::MarketData
    }
}

/// Signal relay: arbitrage signals from strategy processes.
pub struct SignalLogic;

impl RelayLogic for SignalLogic {
    fn domain(&self) -> RelayDomain {
        RelayDomain::Signal
    }
}

/// Execution relay: reserved; carries nothing today but keeps the socket
/// contract stable for future order routers.
pub struct ExecutionLogic;

impl RelayLogic for ExecutionLogic {
    fn domain(&self) -> RelayDomain {
        RelayDomain::Execution
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_filter_is_domain_equality() {
        let logic = MarketDataLogic;
        let mut header = MessageHeader::new(RelayDomain::MarketData, 1, 0, 0);
        assert!(logic.should_forward(&header));

        header.domain = RelayDomain::Signal as u8;
        assert!(!logic.should_forward(&header));

        assert!(SignalLogic.should_forward(&header));
        assert!(!ExecutionLogic.should_forward(&header));
    }
}
