//! Relay consumer: a reconnecting framed reader for subscribers
//!
//! Reads length-delimited frames off a relay socket, validates them fully
//! (magic, size bound, CRC), and yields typed messages. A broken or idle
//! connection reconnects with backoff; the relay replays mappings and pool
//! states on every fresh subscription, so consumers rebuild their view
//! transparently.

use crate::backoff::ExponentialBackoff;
use crate::error::{AdapterError, AdapterResult};
use codec::{decode_frame, parse_header_unchecked, Message, MessageHeader};
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::net::UnixStream;
use tokio::time::timeout;
use tracing::{debug, info, warn};

pub struct RelayConsumer {
    socket_path: String,
    stream: Option<UnixStream>,
    idle_timeout: Duration,
    invalid_frames: u64,
}

/// One validated frame: its header and decoded messages.
#[derive(Debug, Clone)]
pub struct ConsumedFrame {
    pub header: MessageHeader,
    pub messages: Vec<Message>,
}

impl RelayConsumer {
    pub fn new(socket_path: impl Into<String>, idle_timeout: Duration) -> Self {
        Self {
            socket_path: socket_path.into(),
            stream: None,
            idle_timeout,
            invalid_frames: 0,
        }
    }

    pub async fn connect(&mut self) -> AdapterResult<()> {
        let mut backoff = ExponentialBackoff::default();
        loop {
            match UnixStream::connect(&self.socket_path).await {
                Ok(stream) => {
                    info!(socket = %self.socket_path, "subscribed to relay");
                    self.stream = Some(stream);
                    return Ok(());
                }
                Err(e) => {
                    let delay = backoff.next_delay();
                    warn!(
                        socket = %self.socket_path,
                        "relay subscribe failed ({e}), retrying in {delay:?}"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// Next validated frame; reconnects internally on EOF, error, or idle
    /// expiry, so this only returns `Err` for unrecoverable local faults.
    pub async fn next_frame(&mut self) -> AdapterResult<ConsumedFrame> {
        loop {
            if self.stream.is_none() {
                self.connect().await?;
            }

            match self.read_one().await {
                Ok(Some(frame)) => match decode_frame(&frame) {
                    Ok((header, messages)) => {
                        return Ok(ConsumedFrame { header, messages });
                    }
                    Err(e) => {
                        self.invalid_frames += 1;
                        warn!(
                            socket = %self.socket_path,
                            total = self.invalid_frames,
                            "dropping invalid frame from relay: {e}"
                        );
                        continue;
                    }
                },
                Ok(None) => {
                    debug!(socket = %self.socket_path, "relay closed the stream, resubscribing");
                    self.stream = None;
                }
                Err(e) => {
                    debug!(socket = %self.socket_path, "relay read error ({e}), resubscribing");
                    self.stream = None;
                }
            }
        }
    }

    async fn read_one(&mut self) -> AdapterResult<Option<Vec<u8>>> {
        let stream = self.stream.as_mut().ok_or_else(|| AdapterError::ConnectionFailed {
            endpoint: self.socket_path.clone(),
            reason: "not connected".to_string(),
        })?;

        let mut header_buf = [0u8; MessageHeader::SIZE];
        match timeout(self.idle_timeout * 2, stream.read_exact(&mut header_buf)).await {
            Err(_) => {
                return Err(AdapterError::ConnectionTimeout {
                    endpoint: self.socket_path.clone(),
                    timeout_ms: (self.idle_timeout * 2).as_millis() as u64,
                });
            }
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Ok(Err(e)) => return Err(AdapterError::Io(e)),
            Ok(Ok(_)) => {}
        }

        let header = parse_header_unchecked(&header_buf)?;
        let payload_size = header.payload_size as usize;
        if payload_size > codec::MAX_MESSAGE_SIZE - MessageHeader::SIZE {
            return Err(AdapterError::Protocol(codec::ProtocolError::PayloadTooLarge {
                size: payload_size,
                max: codec::MAX_MESSAGE_SIZE - MessageHeader::SIZE,
            }));
        }

        let mut frame = vec![0u8; MessageHeader::SIZE + payload_size];
        frame[..MessageHeader::SIZE].copy_from_slice(&header_buf);
        timeout(self.idle_timeout, stream.read_exact(&mut frame[MessageHeader::SIZE..]))
            .await
            .map_err(|_| AdapterError::ConnectionTimeout {
                endpoint: self.socket_path.clone(),
                timeout_ms: self.idle_timeout.as_millis() as u64,
            })?
            .map_err(AdapterError::Io)?;
        Ok(Some(frame))
    }

    pub fn invalid_frames(&self) -> u64 {
        self.invalid_frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codec::payloads::HeartbeatTlv;
    use codec::{RelayDomain, TlvMessageBuilder};
    use tokio::io::AsyncWriteExt;
    use tokio::net::UnixListener;

    #[tokio::test]
    async fn consumes_valid_frames_and_skips_corrupt_ones() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("md.sock");
        let listener = UnixListener::bind(&path).unwrap();

        let good = TlvMessageBuilder::new(RelayDomain::MarketData, 1)
            .with_sequence(3)
            .add(&Message::Heartbeat(HeartbeatTlv { ts_ns: 9 }))
            .build()
            .unwrap();
        let mut corrupt = good.clone();
        let last = corrupt.len() - 1;
        corrupt[last] ^= 0xFF;

        let good_clone = good.clone();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            stream.write_all(&corrupt).await.unwrap();
            stream.write_all(&good_clone).await.unwrap();
            // Keep the connection open long enough for the reader.
            tokio::time::sleep(Duration::from_millis(500)).await;
        });

        let mut consumer =
            RelayConsumer::new(path.to_string_lossy().to_string(), Duration::from_secs(5));
        let frame = consumer.next_frame().await.unwrap();
        assert_eq!(frame.header.sequence, 3);
        assert_eq!(frame.messages, vec![Message::Heartbeat(HeartbeatTlv { ts_ns: 9 })]);
        assert_eq!(consumer.invalid_frames(), 1);
    }
}
