//! Typed message sum-type and frame construction
//!
//! [`Message`] replaces loosely-typed dictionaries with one variant per TLV
//! kind plus an [`Message::Unknown`] catch-all carrying raw bytes, so
//! readers stay forward compatible without ever interpreting types they do
//! not understand. Encoding is deterministic: the same messages produce the
//! same bytes, bit for bit.

use crate::error::{ProtocolError, ProtocolResult};
use crate::header::{MessageHeader, RelayDomain};
use crate::payloads::*;
use crate::tlv::{parse_tlvs, write_tlv, RawTlv, TlvType, EXPERIMENTAL_TLV_MIN};
use types::InstrumentId;
use zerocopy::{AsBytes, FromBytes, FromZeroes};

/// Every message kind that crosses a relay.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    InstrumentMapping {
        instrument_id: InstrumentId,
        descriptor: String,
    },
    Trade(TradeTlv),
    PoolSwap(PoolSwapTlv),
    PoolSync(PoolSyncTlv),
    PoolMint(PoolMintTlv),
    PoolBurn(PoolBurnTlv),
    PoolState(PoolStateTlv),
    SourceReset(SourceResetTlv),
    ArbitrageSignal(ArbitrageSignalTlv),
    Heartbeat(HeartbeatTlv),
    /// Any type this reader does not understand, including all experimental
    /// types (≥ 0xFF00). Carried opaquely; never financial input.
    Unknown { tlv_type: u16, payload: Vec<u8> },
}

impl Message {
    /// Wire type number for this message.
    pub fn tlv_type(&self) -> u16 {
        match self {
            Message::InstrumentMapping { .. } => TlvType::InstrumentMapping as u16,
            Message::Trade(_) => TlvType::Trade as u16,
            Message::PoolSwap(_) => TlvType::PoolSwap as u16,
            Message::PoolSync(_) => TlvType::PoolSync as u16,
            Message::PoolMint(_) => TlvType::PoolMint as u16,
            Message::PoolBurn(_) => TlvType::PoolBurn as u16,
            Message::PoolState(_) => TlvType::PoolState as u16,
            Message::SourceReset(_) => TlvType::SourceReset as u16,
            Message::ArbitrageSignal(_) => TlvType::ArbitrageSignal as u16,
            Message::Heartbeat(_) => TlvType::Heartbeat as u16,
            Message::Unknown { tlv_type, .. } => *tlv_type,
        }
    }

    /// Serialize this message's TLV body.
    pub fn encode_body(&self) -> Vec<u8> {
        match self {
            Message::InstrumentMapping {
                instrument_id,
                descriptor,
            } => {
                let mut body = Vec::with_capacity(8 + descriptor.len());
                body.extend_from_slice(&instrument_id.to_u64().to_le_bytes());
                body.extend_from_slice(descriptor.as_bytes());
                body
            }
            Message::Trade(t) => t.as_bytes().to_vec(),
            Message::PoolSwap(t) => t.as_bytes().to_vec(),
            Message::PoolSync(t) => t.as_bytes().to_vec(),
            Message::PoolMint(t) => t.as_bytes().to_vec(),
            Message::PoolBurn(t) => t.as_bytes().to_vec(),
            Message::PoolState(t) => t.as_bytes().to_vec(),
            Message::SourceReset(t) => t.as_bytes().to_vec(),
            Message::ArbitrageSignal(t) => t.as_bytes().to_vec(),
            Message::Heartbeat(t) => t.as_bytes().to_vec(),
            Message::Unknown { payload, .. } => payload.clone(),
        }
    }

    /// The instrument id a market-data message references, if any. Drives
    /// the mapping-before-data invariant checks downstream.
    pub fn referenced_pool(&self) -> Option<InstrumentId> {
        match self {
            Message::Trade(t) => Some(t.instrument()),
            Message::PoolSwap(t) => Some(t.pool()),
            Message::PoolSync(t) => Some(t.pool()),
            Message::PoolMint(t) => Some(t.pool()),
            Message::PoolBurn(t) => Some(t.pool()),
            Message::PoolState(t) => Some(t.pool()),
            _ => None,
        }
    }
}

fn decode_fixed<T: FromBytes + Copy>(
    kind: &'static str,
    tlv_type: u16,
    payload: &[u8],
) -> ProtocolResult<T> {
    let expected = std::mem::size_of::<T>();
    if payload.len() != expected {
        return Err(ProtocolError::PayloadSizeMismatch {
            tlv_type,
            expected,
            got: payload.len(),
        });
    }
    T::read_from(payload).ok_or(ProtocolError::MalformedPayload {
        kind,
        reason: "zerocopy read failed",
    })
}

/// Decode a single raw TLV entry into a typed message.
///
/// Unknown and experimental types decode as [`Message::Unknown`]; known
/// types with wrong sizes are protocol errors.
pub fn decode_tlv(raw: RawTlv<'_>) -> ProtocolResult<Message> {
    if raw.tlv_type >= EXPERIMENTAL_TLV_MIN {
        return Ok(Message::Unknown {
            tlv_type: raw.tlv_type,
            payload: raw.payload.to_vec(),
        });
    }

    let Ok(tlv_type) = TlvType::try_from(raw.tlv_type) else {
        return Ok(Message::Unknown {
            tlv_type: raw.tlv_type,
            payload: raw.payload.to_vec(),
        });
    };

    let t = raw.tlv_type;
    let p = raw.payload;
    match tlv_type {
        TlvType::InstrumentMapping => {
            tlv_type.validate_size(p.len())?;
            let mut id_bytes = [0u8; 8];
            id_bytes.copy_from_slice(&p[..8]);
            let descriptor = std::str::from_utf8(&p[8..])
                .map_err(|_| ProtocolError::MalformedPayload {
                    kind: "InstrumentMapping",
                    reason: "descriptor is not valid UTF-8",
                })?
                .to_string();
            Ok(Message::InstrumentMapping {
                instrument_id: InstrumentId::from_u64(u64::from_le_bytes(id_bytes)),
                descriptor,
            })
        }
        TlvType::Trade => {
            let trade: TradeTlv = decode_fixed("Trade", t, p)?;
            if trade.price_decimals > types::MAX_TOKEN_DECIMALS
                || trade.volume_decimals > types::MAX_TOKEN_DECIMALS
            {
                return Err(ProtocolError::MalformedPayload {
                    kind: "Trade",
                    reason: "decimals out of range",
                });
            }
            Ok(Message::Trade(trade))
        }
        TlvType::PoolSwap => {
            let swap: PoolSwapTlv = decode_fixed("PoolSwap", t, p)?;
            if swap.amount_in_decimals > types::MAX_TOKEN_DECIMALS
                || swap.amount_out_decimals > types::MAX_TOKEN_DECIMALS
            {
                return Err(ProtocolError::MalformedPayload {
                    kind: "PoolSwap",
                    reason: "decimals out of range",
                });
            }
            Ok(Message::PoolSwap(swap))
        }
        TlvType::PoolSync => Ok(Message::PoolSync(decode_fixed("PoolSync", t, p)?)),
        TlvType::PoolMint => Ok(Message::PoolMint(decode_fixed("PoolMint", t, p)?)),
        TlvType::PoolBurn => Ok(Message::PoolBurn(decode_fixed("PoolBurn", t, p)?)),
        TlvType::PoolState => {
            let state: PoolStateTlv = decode_fixed("PoolState", t, p)?;
            if !state.is_structurally_valid() {
                return Err(ProtocolError::InvariantViolation {
                    kind: "PoolState",
                    reason: "empty V2 reserves or unknown V3 fee tier",
                });
            }
            Ok(Message::PoolState(state))
        }
        TlvType::SourceReset => Ok(Message::SourceReset(decode_fixed("SourceReset", t, p)?)),
        TlvType::ArbitrageSignal => {
            Ok(Message::ArbitrageSignal(decode_fixed("ArbitrageSignal", t, p)?))
        }
        TlvType::Heartbeat => Ok(Message::Heartbeat(decode_fixed("Heartbeat", t, p)?)),
    }
}

/// Decode a complete validated frame into its header and typed messages.
///
/// The frame must already have passed [`crate::header::parse_header`];
/// this re-validates for callers holding raw bytes from storage.
pub fn decode_frame(frame: &[u8]) -> ProtocolResult<(MessageHeader, Vec<Message>)> {
    let header = crate::header::parse_header(frame)?;
    let payload =
        &frame[MessageHeader::SIZE..MessageHeader::SIZE + header.payload_size as usize];
    let messages = parse_tlvs(payload)?
        .into_iter()
        .map(decode_tlv)
        .collect::<ProtocolResult<Vec<_>>>()?;
    Ok((header, messages))
}

/// Builder for complete frames: header, TLV payload, and checksum.
///
/// ```rust
/// use codec::{Message, RelayDomain, SourceType, TlvMessageBuilder};
/// use codec::payloads::SourceResetTlv;
///
/// let frame = TlvMessageBuilder::new(RelayDomain::MarketData, SourceType::PolygonAdapter as u8)
///     .with_sequence(1)
///     .with_timestamp(1_700_000_000_000_000_000)
///     .add(&Message::SourceReset(SourceResetTlv { new_sequence: 1 }))
///     .build()
///     .unwrap();
/// assert_eq!(&frame[..4], &0xDEADBEEFu32.to_le_bytes());
/// ```
pub struct TlvMessageBuilder {
    header: MessageHeader,
    payload: Vec<u8>,
    error: Option<ProtocolError>,
}

impl TlvMessageBuilder {
    pub fn new(domain: RelayDomain, source: u8) -> Self {
        Self {
            header: MessageHeader::new(domain, source, 0, types::current_timestamp_ns()),
            payload: Vec::new(),
            error: None,
        }
    }

    pub fn with_sequence(mut self, sequence: u64) -> Self {
        self.header.sequence = sequence;
        self
    }

    pub fn with_timestamp(mut self, ts_ns: u64) -> Self {
        self.header.ts_ns = ts_ns;
        self
    }

    pub fn add(mut self, message: &Message) -> Self {
        if self.error.is_none() {
            let body = message.encode_body();
            if let Err(e) = write_tlv(&mut self.payload, message.tlv_type(), &body) {
                self.error = Some(e);
            }
        }
        self
    }

    pub fn build(mut self) -> ProtocolResult<Vec<u8>> {
        if let Some(e) = self.error {
            return Err(e);
        }
        if self.payload.len() > crate::MAX_MESSAGE_SIZE - MessageHeader::SIZE {
            return Err(ProtocolError::PayloadTooLarge {
                size: self.payload.len(),
                max: crate::MAX_MESSAGE_SIZE - MessageHeader::SIZE,
            });
        }
        self.header.payload_size = self.payload.len() as u32;

        let mut frame = Vec::with_capacity(MessageHeader::SIZE + self.payload.len());
        frame.extend_from_slice(self.header.as_bytes());
        frame.extend_from_slice(&self.payload);

        let checksum =
            MessageHeader::compute_checksum(&frame[..MessageHeader::SIZE], &self.payload);
        frame[28..32].copy_from_slice(&checksum.to_le_bytes());
        Ok(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::SourceType;

    fn sample_trade() -> TradeTlv {
        TradeTlv {
            instrument_id: InstrumentId::from_descriptor("coinbase:ETH-USD").to_u64(),
            price: 200_000_000_000,
            volume: 50_000_000,
            ts_event_ns: 1_700_000_000_000_000_000,
            side: TradeTlv::SIDE_SELL,
            price_decimals: 8,
            volume_decimals: 8,
        }
    }

    #[test]
    fn frame_round_trip() {
        let trade = Message::Trade(sample_trade());
        let mapping = Message::InstrumentMapping {
            instrument_id: InstrumentId::from_descriptor("coinbase:ETH-USD"),
            descriptor: "coinbase:ETH-USD".to_string(),
        };

        let frame =
            TlvMessageBuilder::new(RelayDomain::MarketData, SourceType::CoinbaseAdapter as u8)
                .with_sequence(7)
                .with_timestamp(123_456_789)
                .add(&mapping)
                .add(&trade)
                .build()
                .unwrap();

        let (header, messages) = decode_frame(&frame).unwrap();
        assert_eq!(header.sequence, 7);
        assert_eq!(header.ts_ns, 123_456_789);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0], mapping);
        assert_eq!(messages[1], trade);
    }

    #[test]
    fn encoding_is_deterministic() {
        let build = || {
            TlvMessageBuilder::new(RelayDomain::MarketData, 1)
                .with_sequence(3)
                .with_timestamp(42)
                .add(&Message::Trade(sample_trade()))
                .build()
                .unwrap()
        };
        assert_eq!(build(), build());
    }

    #[test]
    fn unknown_types_are_preserved_not_interpreted() {
        let unknown = Message::Unknown {
            tlv_type: 0x00F3,
            payload: vec![1, 2, 3, 4],
        };
        let frame = TlvMessageBuilder::new(RelayDomain::MarketData, 1)
            .add(&unknown)
            .build()
            .unwrap();
        let (_, messages) = decode_frame(&frame).unwrap();
        assert_eq!(messages[0], unknown);
    }

    #[test]
    fn experimental_types_never_decode_as_financial() {
        // An experimental TLV that happens to contain a valid Trade body must
        // still come back as Unknown.
        let body = sample_trade().as_bytes().to_vec();
        let frame = TlvMessageBuilder::new(RelayDomain::MarketData, 1)
            .add(&Message::Unknown {
                tlv_type: 0xFF02,
                payload: body.clone(),
            })
            .build()
            .unwrap();
        let (_, messages) = decode_frame(&frame).unwrap();
        assert_eq!(
            messages[0],
            Message::Unknown {
                tlv_type: 0xFF02,
                payload: body
            }
        );
    }

    #[test]
    fn invalid_pool_state_is_refused() {
        let mut state = PoolStateTlv::new_zeroed();
        state.protocol = PoolProtocol::V2 as u8;
        // reserve0 == 0 violates the V2 invariant.
        state.reserve1 = 10;
        let frame = TlvMessageBuilder::new(RelayDomain::MarketData, 1)
            .add(&Message::PoolState(state))
            .build()
            .unwrap();
        assert!(matches!(
            decode_frame(&frame),
            Err(ProtocolError::InvariantViolation { kind: "PoolState", .. })
        ));
    }

    #[test]
    fn out_of_range_decimals_are_refused() {
        let mut trade = sample_trade();
        trade.price_decimals = 31;
        let frame = TlvMessageBuilder::new(RelayDomain::MarketData, 1)
            .add(&Message::Trade(trade))
            .build()
            .unwrap();
        assert!(matches!(
            decode_frame(&frame),
            Err(ProtocolError::MalformedPayload { kind: "Trade", .. })
        ));
    }

    #[test]
    fn mapping_descriptor_must_be_utf8() {
        let mut body = 42u64.to_le_bytes().to_vec();
        body.extend_from_slice(&[0xFF, 0xFE]);
        let frame = TlvMessageBuilder::new(RelayDomain::MarketData, 1)
            .add(&Message::Unknown {
                tlv_type: TlvType::InstrumentMapping as u16,
                payload: body,
            })
            .build()
            .unwrap();
        assert!(matches!(
            decode_frame(&frame),
            Err(ProtocolError::MalformedPayload {
                kind: "InstrumentMapping",
                ..
            })
        ));
    }
}
