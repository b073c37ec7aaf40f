//! Protocol error taxonomy
//!
//! Recoverable wire-level failures are typed so callers can count, drop, and
//! escalate per source without string matching.

use thiserror::Error;

pub type ProtocolResult<T> = Result<T, ProtocolError>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("message too small: need {need} bytes, got {got} ({context})")]
    MessageTooSmall {
        need: usize,
        got: usize,
        context: &'static str,
    },

    #[error("invalid magic: expected {expected:#010x}, got {got:#010x}")]
    InvalidMagic { expected: u32, got: u32 },

    #[error("checksum mismatch: header says {expected:#010x}, calculated {calculated:#010x}")]
    ChecksumMismatch { expected: u32, calculated: u32 },

    #[error("payload size {size} exceeds maximum {max}")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("payload size {declared} extends past buffer of {available} bytes")]
    PayloadOverrun { declared: usize, available: usize },

    #[error("truncated TLV at offset {offset}: need {need} more bytes, have {have}")]
    TruncatedTlv {
        offset: usize,
        need: usize,
        have: usize,
    },

    #[error("TLV type {tlv_type:#06x} payload size mismatch: expected {expected}, got {got}")]
    PayloadSizeMismatch {
        tlv_type: u16,
        expected: usize,
        got: usize,
    },

    #[error("invalid relay domain {0}")]
    InvalidDomain(u8),

    #[error("malformed {kind} payload: {reason}")]
    MalformedPayload {
        kind: &'static str,
        reason: &'static str,
    },

    #[error("invariant violation in {kind}: {reason}")]
    InvariantViolation {
        kind: &'static str,
        reason: &'static str,
    },
}
