//! Relay → JSON bridging with mapping resolution
//!
//! Builds the id → descriptor table from `InstrumentMapping` messages. A
//! trade or signal whose descriptors are not yet known buffers for a
//! bounded window and is dropped if the mapping never arrives; showing a
//! raw hash to a human is worse than showing nothing.

use crate::convert::{arbitrage_json, metrics_json, trade_json};
use crate::server::{ClientHub, OutboundFrame};
use codec::payloads::{ArbitrageSignalTlv, TradeTlv};
use codec::Message;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use types::{InstrumentId, InstrumentRegistry};

/// Upper bound on frames waiting for a mapping; beyond this the oldest is
/// dropped early, mirroring the queue policy everywhere else.
const MAX_PENDING: usize = 1024;

#[derive(Debug)]
enum Pending {
    Trade(TradeTlv),
    Signal(ArbitrageSignalTlv),
}

struct PendingEntry {
    deadline_ns: u64,
    payload: Pending,
}

pub struct Bridge {
    registry: InstrumentRegistry,
    hub: Arc<ClientHub>,
    pending: VecDeque<PendingEntry>,
    mapping_wait_ns: u64,
    trades_seen: u64,
    signals_seen: u64,
    frames_expired: u64,
}

impl Bridge {
    pub fn new(hub: Arc<ClientHub>, mapping_wait: Duration) -> Self {
        Self {
            registry: InstrumentRegistry::new(),
            hub,
            pending: VecDeque::new(),
            mapping_wait_ns: mapping_wait.as_nanos() as u64,
            trades_seen: 0,
            signals_seen: 0,
            frames_expired: 0,
        }
    }

    /// Ingest one message from either relay.
    pub fn on_message(&mut self, message: &Message, now_ns: u64) {
        match message {
            Message::InstrumentMapping {
                instrument_id,
                descriptor,
            } => {
                if self.registry.insert_mapping(*instrument_id, descriptor) {
                    debug!(%instrument_id, descriptor, "mapping learned");
                }
                self.flush_pending(now_ns);
            }
            Message::Trade(trade) => {
                self.trades_seen += 1;
                match self.render_trade(trade) {
                    Some(frame) => self.hub.broadcast(&frame),
                    None => self.buffer(Pending::Trade(*trade), now_ns),
                }
            }
            Message::ArbitrageSignal(signal) => {
                self.signals_seen += 1;
                match self.render_signal(signal) {
                    Some(frame) => self.hub.broadcast(&frame),
                    None => self.buffer(Pending::Signal(*signal), now_ns),
                }
            }
            // Pool events update no dashboard surface directly; signals
            // referencing pools we never learned resolve (or expire) above.
            _ => {}
        }
    }

    /// Drop expired entries, render newly resolvable ones.
    pub fn sweep(&mut self, now_ns: u64) {
        self.flush_pending(now_ns);
    }

    /// Periodic metrics frame for all clients.
    pub fn emit_metrics(&mut self, trades_per_second: u64) {
        let json = metrics_json(
            trades_per_second,
            self.hub.active_connections(),
            self.signals_seen,
            self.hub.total_dropped() + self.frames_expired,
        );
        self.hub.broadcast(&OutboundFrame {
            instrument: None,
            json: json.to_string(),
        });
    }

    pub fn trades_seen(&self) -> u64 {
        self.trades_seen
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    fn buffer(&mut self, payload: Pending, now_ns: u64) {
        if self.pending.len() == MAX_PENDING {
            self.pending.pop_front();
            self.frames_expired += 1;
        }
        self.pending.push_back(PendingEntry {
            deadline_ns: now_ns + self.mapping_wait_ns,
            payload,
        });
    }

    fn flush_pending(&mut self, now_ns: u64) {
        let mut keep = VecDeque::with_capacity(self.pending.len());
        while let Some(entry) = self.pending.pop_front() {
            let rendered = match &entry.payload {
                Pending::Trade(trade) => self.render_trade(trade),
                Pending::Signal(signal) => self.render_signal(signal),
            };
            match rendered {
                Some(frame) => self.hub.broadcast(&frame),
                None if entry.deadline_ns <= now_ns => {
                    self.frames_expired += 1;
                    debug!("pending frame expired without a mapping");
                }
                None => keep.push_back(entry),
            }
        }
        self.pending = keep;
    }

    fn render_trade(&self, trade: &TradeTlv) -> Option<OutboundFrame> {
        let descriptor = self.registry.descriptor(trade.instrument())?;
        Some(OutboundFrame {
            json: trade_json(&descriptor, trade).to_string(),
            instrument: Some(descriptor),
        })
    }

    fn render_signal(&self, signal: &ArbitrageSignalTlv) -> Option<OutboundFrame> {
        let buy = self.registry.descriptor(signal.buy_pool())?;
        let sell = self.registry.descriptor(signal.sell_pool())?;
        Some(OutboundFrame {
            instrument: None,
            json: arbitrage_json(&buy, &sell, signal).to_string(),
        })
    }
}

/// Drive the bridge from both relays plus timers; the single consumer task
/// owns all mutable state.
pub async fn run(
    mut bridge: Bridge,
    mut market_data: adapter_service::RelayConsumer,
    mut signals: adapter_service::RelayConsumer,
    metrics_interval: Duration,
) -> anyhow::Result<()> {
    let mut metrics_ticker = tokio::time::interval(metrics_interval);
    let mut sweep_ticker = tokio::time::interval(Duration::from_millis(500));
    let mut trades_at_last_tick = 0u64;
    info!("dashboard bridge running");

    loop {
        tokio::select! {
            frame = market_data.next_frame() => {
                let frame = frame?;
                let now_ns = types::current_timestamp_ns();
                for message in &frame.messages {
                    bridge.on_message(message, now_ns);
                }
            }
            frame = signals.next_frame() => {
                let frame = frame?;
                let now_ns = types::current_timestamp_ns();
                for message in &frame.messages {
                    bridge.on_message(message, now_ns);
                }
            }
            _ = sweep_ticker.tick() => {
                bridge.sweep(types::current_timestamp_ns());
            }
            _ = metrics_ticker.tick() => {
                let trades = bridge.trades_seen();
                let rate = (trades - trades_at_last_tick)
                    / metrics_interval.as_secs().max(1);
                trades_at_last_tick = trades;
                bridge.emit_metrics(rate);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zerocopy::FromZeroes;

    fn hub() -> Arc<ClientHub> {
        ClientHub::new(64)
    }

    fn mapping(descriptor: &str) -> Message {
        Message::InstrumentMapping {
            instrument_id: InstrumentId::from_descriptor(descriptor),
            descriptor: descriptor.to_string(),
        }
    }

    fn trade(descriptor: &str) -> Message {
        Message::Trade(TradeTlv {
            instrument_id: InstrumentId::from_descriptor(descriptor).to_u64(),
            price: 100_000_000,
            volume: 200_000_000,
            ts_event_ns: 1,
            side: TradeTlv::SIDE_BUY,
            price_decimals: 8,
            volume_decimals: 8,
        })
    }

    #[tokio::test]
    async fn unmapped_trades_buffer_until_the_mapping_arrives() {
        let mut bridge = Bridge::new(hub(), Duration::from_secs(5));

        bridge.on_message(&trade("coinbase:ETH-USD"), 1_000);
        assert_eq!(bridge.pending_len(), 1);

        bridge.on_message(&mapping("coinbase:ETH-USD"), 2_000);
        assert_eq!(bridge.pending_len(), 0);
    }

    #[tokio::test]
    async fn unmapped_frames_expire_after_the_window() {
        let mut bridge = Bridge::new(hub(), Duration::from_millis(1));

        bridge.on_message(&trade("coinbase:ETH-USD"), 1_000);
        assert_eq!(bridge.pending_len(), 1);

        // Well past the deadline with no mapping: dropped, not rendered.
        bridge.sweep(1_000 + 10_000_000);
        assert_eq!(bridge.pending_len(), 0);
    }

    #[tokio::test]
    async fn mapped_trades_render_immediately() {
        let mut bridge = Bridge::new(hub(), Duration::from_secs(5));
        bridge.on_message(&mapping("coinbase:ETH-USD"), 500);
        bridge.on_message(&trade("coinbase:ETH-USD"), 1_000);
        assert_eq!(bridge.pending_len(), 0);
        assert_eq!(bridge.trades_seen(), 1);
    }

    #[tokio::test]
    async fn signals_need_both_pool_mappings() {
        let mut bridge = Bridge::new(hub(), Duration::from_secs(5));

        let mut signal = ArbitrageSignalTlv::new_zeroed();
        signal.buy_pool_id = InstrumentId::from_descriptor("pool-a").to_u64();
        signal.sell_pool_id = InstrumentId::from_descriptor("pool-b").to_u64();
        bridge.on_message(&Message::ArbitrageSignal(signal), 1_000);
        assert_eq!(bridge.pending_len(), 1);

        bridge.on_message(&mapping("pool-a"), 2_000);
        assert_eq!(bridge.pending_len(), 1, "one mapping is not enough");

        bridge.on_message(&mapping("pool-b"), 3_000);
        assert_eq!(bridge.pending_len(), 0);
    }

    #[tokio::test]
    async fn pending_buffer_is_bounded() {
        let mut bridge = Bridge::new(hub(), Duration::from_secs(500));
        for i in 0..(MAX_PENDING + 10) {
            bridge.on_message(&trade(&format!("inst-{i}")), 1_000);
        }
        assert_eq!(bridge.pending_len(), MAX_PENDING);
    }
}
