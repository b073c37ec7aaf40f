//! Message header: 32 bytes, identical for every message on every relay
//!
//! Field ordering is chosen so the `repr(C)` layout is exactly 32 bytes with
//! zero padding; do not reorder without re-checking the layout test.
//!
//! ```text
//! ┌─────────────────┬─────────────────────────────────────┐
//! │ MessageHeader   │ TLV payload                         │
//! │ (32 bytes)      │ (payload_size bytes)                │
//! └─────────────────┴─────────────────────────────────────┘
//! ```
//!
//! | Offset | Size | Field        |
//! |--------|------|--------------|
//! | 0      | 4    | magic        |
//! | 4      | 1    | domain       |
//! | 5      | 1    | source       |
//! | 6      | 2    | reserved = 0 |
//! | 8      | 8    | sequence     |
//! | 16     | 8    | ts_ns        |
//! | 24     | 4    | payload_size |
//! | 28     | 4    | checksum     |

use crate::error::{ProtocolError, ProtocolResult};
use num_enum::TryFromPrimitive;
use zerocopy::{AsBytes, FromBytes, FromZeroes};

/// Protocol magic; rejects frame-shifted reads.
pub const MESSAGE_MAGIC: u32 = 0xDEADBEEF;

/// Relay domain a message routes through.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive)]
pub enum RelayDomain {
    MarketData = 1,
    Signal = 2,
    Execution = 3,
}

impl RelayDomain {
    /// Socket file name for this domain under the configured socket directory.
    pub fn socket_name(&self) -> &'static str {
        match self {
            RelayDomain::MarketData => "marketdata.sock",
            RelayDomain::Signal => "signals.sock",
            RelayDomain::Execution => "execution.sock",
        }
    }
}

/// Well-known source ids. The wire field is an opaque byte; this enum only
/// names the producers this repository ships.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive)]
pub enum SourceType {
    PolygonAdapter = 1,
    CoinbaseAdapter = 2,
    ArbitrageDetector = 3,
    DashboardBridge = 4,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, AsBytes, FromBytes, FromZeroes)]
pub struct MessageHeader {
    pub magic: u32,
    pub domain: u8,
    pub source: u8,
    pub reserved: u16,
    pub sequence: u64,
    pub ts_ns: u64,
    pub payload_size: u32,
    pub checksum: u32,
}

impl MessageHeader {
    pub const SIZE: usize = 32;

    /// Byte offset of the checksum field, zeroed during CRC computation.
    const CHECKSUM_OFFSET: usize = 28;

    pub fn new(domain: RelayDomain, source: u8, sequence: u64, ts_ns: u64) -> Self {
        Self {
            magic: MESSAGE_MAGIC,
            domain: domain as u8,
            source,
            reserved: 0,
            sequence,
            ts_ns,
            payload_size: 0,
            checksum: 0,
        }
    }

    pub fn relay_domain(&self) -> ProtocolResult<RelayDomain> {
        RelayDomain::try_from(self.domain).map_err(|_| ProtocolError::InvalidDomain(self.domain))
    }

    /// CRC32 over the header with the checksum field zeroed, then the payload.
    pub fn compute_checksum(header_bytes: &[u8], payload: &[u8]) -> u32 {
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&header_bytes[..Self::CHECKSUM_OFFSET]);
        hasher.update(&[0u8; 4]);
        hasher.update(payload);
        hasher.finalize()
    }

    /// Verify the checksum of a complete frame (header + payload).
    pub fn verify_checksum(&self, frame: &[u8]) -> bool {
        if frame.len() < Self::SIZE {
            return false;
        }
        Self::compute_checksum(&frame[..Self::SIZE], &frame[Self::SIZE..]) == self.checksum
    }

    pub fn age_ns(&self, now_ns: u64) -> u64 {
        now_ns.saturating_sub(self.ts_ns)
    }
}

/// Parse and fully validate a frame header: size, magic, payload bound, CRC.
///
/// `data` must contain the complete frame (header and payload) for the CRC
/// to be checkable.
pub fn parse_header(data: &[u8]) -> ProtocolResult<MessageHeader> {
    let header = parse_header_unchecked(data)?;

    let declared = header.payload_size as usize;
    if declared > crate::MAX_MESSAGE_SIZE - MessageHeader::SIZE {
        return Err(ProtocolError::PayloadTooLarge {
            size: declared,
            max: crate::MAX_MESSAGE_SIZE - MessageHeader::SIZE,
        });
    }
    if data.len() < MessageHeader::SIZE + declared {
        return Err(ProtocolError::PayloadOverrun {
            declared,
            available: data.len() - MessageHeader::SIZE,
        });
    }

    let frame = &data[..MessageHeader::SIZE + declared];
    if !header.verify_checksum(frame) {
        return Err(ProtocolError::ChecksumMismatch {
            expected: header.checksum,
            calculated: MessageHeader::compute_checksum(
                &frame[..MessageHeader::SIZE],
                &frame[MessageHeader::SIZE..],
            ),
        });
    }

    Ok(header)
}

/// Parse the header without CRC validation.
///
/// Used to learn `payload_size` before the payload has been read off the
/// socket; the full frame must still pass [`parse_header`] afterwards.
pub fn parse_header_unchecked(data: &[u8]) -> ProtocolResult<MessageHeader> {
    if data.len() < MessageHeader::SIZE {
        return Err(ProtocolError::MessageTooSmall {
            need: MessageHeader::SIZE,
            got: data.len(),
            context: "MessageHeader",
        });
    }

    let header = MessageHeader::read_from(&data[..MessageHeader::SIZE]).ok_or(
        ProtocolError::MessageTooSmall {
            need: MessageHeader::SIZE,
            got: data.len(),
            context: "MessageHeader read_from",
        },
    )?;

    if header.magic != MESSAGE_MAGIC {
        return Err(ProtocolError::InvalidMagic {
            expected: MESSAGE_MAGIC,
            got: header.magic,
        });
    }

    header.relay_domain()?;
    Ok(header)
}
