//! # Dexflow Protocol Codec
//!
//! ## Purpose
//!
//! Encoding and decoding rules for every message that crosses a relay:
//! - 32-byte message header with magic, domain routing, sequencing, and
//!   CRC32 integrity
//! - Self-describing TLV payload format (2-byte type, 2-byte length,
//!   little-endian) with forward-compatible unknown-type handling
//! - Typed [`Message`] sum-type replacing loosely-typed dictionaries
//! - Zero-copy payload structs for the fixed-size message kinds
//!
//! ## Architecture Role
//!
//! ```text
//! libs/types → [codec] → relay / adapters / strategies
//!     ↑           ↓              ↓
//! Pure Data   Wire Rules     Transport
//! Structures  Validation     Unix sockets
//! ```
//!
//! ## What this crate does NOT contain
//!
//! - Socket management or connection handling (lives in `relay` and the
//!   service crates)
//! - Business interpretation of messages (lives in the strategies)
//!
//! ## Integrity contract
//!
//! Readers reject frames with a wrong magic, a failed CRC, or a
//! `payload_size` extending past the buffer. Unknown TLV types are skipped
//! and surfaced as [`Message::Unknown`]; types at or above
//! [`EXPERIMENTAL_TLV_MIN`] are experimental traffic and must never
//! influence financial state.

pub mod error;
pub mod header;
pub mod message;
pub mod payloads;
pub mod sequence;
pub mod tlv;

pub use error::{ProtocolError, ProtocolResult};
pub use header::{
    parse_header, parse_header_unchecked, MessageHeader, RelayDomain, SourceType, MESSAGE_MAGIC,
};
pub use message::{decode_frame, decode_tlv, Message, TlvMessageBuilder};
pub use payloads::{
    ArbitrageSignalTlv, HeartbeatTlv, PoolBurnTlv, PoolMintTlv, PoolProtocol, PoolStateTlv,
    PoolSwapTlv, PoolSyncTlv, SourceResetTlv, TradeTlv,
};
pub use sequence::{SequenceCheck, SequenceTracker};
pub use tlv::{parse_tlvs, RawTlv, TlvSizeConstraint, TlvType, EXPERIMENTAL_TLV_MIN};

/// Maximum total message size accepted on any relay (1 MiB).
pub const MAX_MESSAGE_SIZE: usize = 1_048_576;

/// Maximum TLV payload size per entry (64 KiB).
pub const MAX_TLV_PAYLOAD_SIZE: usize = 65_535;
