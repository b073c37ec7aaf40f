//! Adapter error taxonomy
//!
//! Mirrors the pipeline-wide policy: transient errors are retried with
//! backoff and never propagate; parse failures drop the single event;
//! configuration problems are fatal at startup.

use thiserror::Error;

pub type AdapterResult<T> = Result<T, AdapterError>;

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("connection to {endpoint} failed: {reason}")]
    ConnectionFailed { endpoint: String, reason: String },

    #[error("connection to {endpoint} timed out after {timeout_ms}ms")]
    ConnectionTimeout { endpoint: String, timeout_ms: u64 },

    #[error("event decode failed: {reason}")]
    DecodeError { reason: String },

    #[error("rpc call {call} failed: {reason}")]
    RpcError { call: &'static str, reason: String },

    #[error("protocol error: {0}")]
    Protocol(#[from] codec::ProtocolError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration: {reason}")]
    Config { reason: String },
}

impl AdapterError {
    /// Whether retry-with-backoff is the right response.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AdapterError::ConnectionFailed { .. }
                | AdapterError::ConnectionTimeout { .. }
                | AdapterError::RpcError { .. }
                | AdapterError::Io(_)
        )
    }
}
