//! TLV type registry and payload-section parsing
//!
//! Payloads are a sequence of TLV entries: 2-byte type, 2-byte length (both
//! little-endian), then `length` body bytes. Unknown types are preserved as
//! raw entries so readers can skip them; types at or above
//! [`EXPERIMENTAL_TLV_MIN`] are experimental/demo traffic and must never
//! influence financial state.
//!
//! Type numbers are organized by relay domain, mirroring the header's
//! routing byte:
//! - 1–19: MarketData
//! - 20–39: Signal
//! - 40–59: Execution (reserved)
//! - 100–119: System
//! - ≥ 0xFF00: experimental

use crate::error::{ProtocolError, ProtocolResult};
use crate::header::RelayDomain;
use num_enum::TryFromPrimitive;

/// First experimental TLV type. Everything at or above this value is decoded
/// only as an opaque blob.
pub const EXPERIMENTAL_TLV_MIN: u16 = 0xFF00;

/// Registry of every TLV type this repository produces or consumes.
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive)]
pub enum TlvType {
    // ── MarketData domain (1-19) ────────────────────────────────────────
    /// id ↔ descriptor association; replayed to every new subscriber
    InstrumentMapping = 1,
    /// Individual trade: price, size, side at 8-decimal fixed point
    Trade = 2,
    /// DEX swap with amounts at native token decimals, V3 price/tick after
    PoolSwap = 3,
    /// V2 reserve synchronization (full reserves)
    PoolSync = 4,
    /// Liquidity added (V3 carries the tick range)
    PoolMint = 5,
    /// Liquidity removed (V3 carries the tick range)
    PoolBurn = 6,
    /// Full pool snapshot, emitted on subscribe and reconnect
    PoolState = 7,
    /// Sequence restart announcement, once per source restart
    SourceReset = 8,

    // ── Signal domain (20-39) ───────────────────────────────────────────
    /// Profitable-after-gas arbitrage opportunity
    ArbitrageSignal = 20,

    // ── System domain (100-119) ─────────────────────────────────────────
    /// Liveness beacon; expected within the idle timeout on quiet streams
    Heartbeat = 100,
}

/// Payload size validation constraint for a TLV type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlvSizeConstraint {
    Fixed(usize),
    Bounded { min: usize, max: usize },
    Variable,
}

impl TlvType {
    pub fn name(&self) -> &'static str {
        match self {
            TlvType::InstrumentMapping => "InstrumentMapping",
            TlvType::Trade => "Trade",
            TlvType::PoolSwap => "PoolSwap",
            TlvType::PoolSync => "PoolSync",
            TlvType::PoolMint => "PoolMint",
            TlvType::PoolBurn => "PoolBurn",
            TlvType::PoolState => "PoolState",
            TlvType::SourceReset => "SourceReset",
            TlvType::ArbitrageSignal => "ArbitrageSignal",
            TlvType::Heartbeat => "Heartbeat",
        }
    }

    /// The relay domain this type routes through.
    pub fn relay_domain(&self) -> RelayDomain {
        match *self as u16 {
            1..=19 => RelayDomain::MarketData,
            20..=39 => RelayDomain::Signal,
            40..=59 => RelayDomain::Execution,
            _ => RelayDomain::MarketData,
        }
    }

    pub fn size_constraint(&self) -> TlvSizeConstraint {
        use crate::payloads::*;
        use std::mem::size_of;
        match self {
            // 8-byte id plus a descriptor of at least one byte.
            TlvType::InstrumentMapping => TlvSizeConstraint::Bounded { min: 9, max: 1024 },
            TlvType::Trade => TlvSizeConstraint::Fixed(size_of::<TradeTlv>()),
            TlvType::PoolSwap => TlvSizeConstraint::Fixed(size_of::<PoolSwapTlv>()),
            TlvType::PoolSync => TlvSizeConstraint::Fixed(size_of::<PoolSyncTlv>()),
            TlvType::PoolMint => TlvSizeConstraint::Fixed(size_of::<PoolMintTlv>()),
            TlvType::PoolBurn => TlvSizeConstraint::Fixed(size_of::<PoolBurnTlv>()),
            TlvType::PoolState => TlvSizeConstraint::Fixed(size_of::<PoolStateTlv>()),
            TlvType::SourceReset => TlvSizeConstraint::Fixed(size_of::<SourceResetTlv>()),
            TlvType::ArbitrageSignal => {
                TlvSizeConstraint::Fixed(size_of::<ArbitrageSignalTlv>())
            }
            TlvType::Heartbeat => TlvSizeConstraint::Fixed(size_of::<HeartbeatTlv>()),
        }
    }

    pub fn validate_size(&self, payload_size: usize) -> ProtocolResult<()> {
        let ok = match self.size_constraint() {
            TlvSizeConstraint::Fixed(expected) => payload_size == expected,
            TlvSizeConstraint::Bounded { min, max } => {
                payload_size >= min && payload_size <= max
            }
            TlvSizeConstraint::Variable => true,
        };
        if ok {
            Ok(())
        } else {
            let expected = match self.size_constraint() {
                TlvSizeConstraint::Fixed(e) => e,
                TlvSizeConstraint::Bounded { min, .. } => min,
                TlvSizeConstraint::Variable => 0,
            };
            Err(ProtocolError::PayloadSizeMismatch {
                tlv_type: *self as u16,
                expected,
                got: payload_size,
            })
        }
    }
}

/// A raw TLV entry borrowed from a payload buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawTlv<'a> {
    pub tlv_type: u16,
    pub payload: &'a [u8],
}

impl RawTlv<'_> {
    pub fn is_experimental(&self) -> bool {
        self.tlv_type >= EXPERIMENTAL_TLV_MIN
    }
}

/// Walk the TLV section of a payload, yielding every entry.
///
/// Unknown types are yielded as-is; truncation anywhere is an error for the
/// whole payload (a frame that lies about lengths cannot be trusted at all).
pub fn parse_tlvs(payload: &[u8]) -> ProtocolResult<Vec<RawTlv<'_>>> {
    let mut entries = Vec::new();
    let mut offset = 0;

    while offset < payload.len() {
        if payload.len() - offset < 4 {
            return Err(ProtocolError::TruncatedTlv {
                offset,
                need: 4,
                have: payload.len() - offset,
            });
        }
        let tlv_type = u16::from_le_bytes([payload[offset], payload[offset + 1]]);
        let length = u16::from_le_bytes([payload[offset + 2], payload[offset + 3]]) as usize;
        let body_start = offset + 4;

        if payload.len() - body_start < length {
            return Err(ProtocolError::TruncatedTlv {
                offset,
                need: length,
                have: payload.len() - body_start,
            });
        }

        entries.push(RawTlv {
            tlv_type,
            payload: &payload[body_start..body_start + length],
        });
        offset = body_start + length;
    }

    Ok(entries)
}

/// Append one TLV entry to an output buffer.
pub fn write_tlv(out: &mut Vec<u8>, tlv_type: u16, body: &[u8]) -> ProtocolResult<()> {
    if body.len() > crate::MAX_TLV_PAYLOAD_SIZE {
        return Err(ProtocolError::PayloadTooLarge {
            size: body.len(),
            max: crate::MAX_TLV_PAYLOAD_SIZE,
        });
    }
    out.extend_from_slice(&tlv_type.to_le_bytes());
    out.extend_from_slice(&(body.len() as u16).to_le_bytes());
    out.extend_from_slice(body);
    Ok(())
}
