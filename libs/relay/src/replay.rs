//! Bootstrap replay cache
//!
//! The relay remembers every `InstrumentMapping` frame and the most recent
//! `PoolState` frame per pool. A new subscriber receives the whole cache
//! (mappings first, then states) before its first live frame, so the
//! mapping-before-data invariant holds from the subscriber's first byte.
//!
//! Frames are cached verbatim: the relay never fabricates frames or
//! rewrites sequence numbers, so replayed frames carry their original
//! producer headers.

use bytes::Bytes;
use codec::{decode_tlv, parse_tlvs, Message, MessageHeader};
use std::collections::HashMap;
use types::InstrumentId;

#[derive(Debug, Default)]
pub struct ReplayCache {
    mappings: HashMap<InstrumentId, Bytes>,
    pool_states: HashMap<InstrumentId, Bytes>,
}

impl ReplayCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inspect a validated frame and cache it if it is replay-worthy.
    ///
    /// Only frames consisting entirely of mappings and/or pool states are
    /// cached; replaying a frame that also carried incremental events would
    /// break at-most-once delivery for those events.
    pub fn note_frame(&mut self, frame: &Bytes) {
        let payload = &frame[MessageHeader::SIZE..];
        let Ok(tlvs) = parse_tlvs(payload) else {
            return;
        };

        let mut mappings = Vec::new();
        let mut states = Vec::new();
        for raw in tlvs {
            match decode_tlv(raw) {
                Ok(Message::InstrumentMapping { instrument_id, .. }) => {
                    mappings.push(instrument_id)
                }
                Ok(Message::PoolState(state)) => states.push(state.pool()),
                Ok(Message::Heartbeat(_)) => {}
                _ => return,
            }
        }

        for id in mappings {
            self.mappings.insert(id, frame.clone());
        }
        for id in states {
            self.pool_states.insert(id, frame.clone());
        }
    }

    /// Frames to enqueue for a fresh subscriber, mappings before states.
    pub fn replay_frames(&self) -> Vec<Bytes> {
        let mut frames = Vec::with_capacity(self.mappings.len() + self.pool_states.len());
        frames.extend(self.mappings.values().cloned());
        frames.extend(self.pool_states.values().cloned());
        frames
    }

    pub fn mapping_count(&self) -> usize {
        self.mappings.len()
    }

    pub fn state_count(&self) -> usize {
        self.pool_states.len()
    }
}
