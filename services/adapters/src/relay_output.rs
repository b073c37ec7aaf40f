//! Relay output: a reconnecting Unix-socket writer for finished frames
//!
//! Producers build complete frames (header, TLVs, checksum) and hand the
//! bytes here. Transient socket failures trigger exponential-backoff
//! reconnection; the caller is told when a reconnect happened so it can
//! emit a `SourceReset` and re-snapshot per the adapter contract.

use crate::backoff::ExponentialBackoff;
use crate::error::{AdapterError, AdapterResult};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::UnixStream;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

const MAX_CONNECT_ATTEMPTS: u32 = 10;

pub struct RelayOutput {
    socket_path: String,
    stream: Mutex<Option<UnixStream>>,
    frames_sent: Mutex<u64>,
    backoff_base: Duration,
    backoff_max: Duration,
    max_attempts: u32,
}

impl RelayOutput {
    pub fn new(socket_path: impl Into<String>) -> Self {
        Self::with_backoff(
            socket_path,
            Duration::from_millis(100),
            Duration::from_secs(30),
            MAX_CONNECT_ATTEMPTS,
        )
    }

    pub fn with_backoff(
        socket_path: impl Into<String>,
        base: Duration,
        max: Duration,
        max_attempts: u32,
    ) -> Self {
        Self {
            socket_path: socket_path.into(),
            stream: Mutex::new(None),
            frames_sent: Mutex::new(0),
            backoff_base: base,
            backoff_max: max,
            max_attempts,
        }
    }

    /// Connect with exponential backoff, up to the attempt cap.
    pub async fn connect(&self) -> AdapterResult<()> {
        let mut backoff = ExponentialBackoff::new(self.backoff_base, self.backoff_max);
        loop {
            eprintln!("DEBUG connecting to {:?}", self.socket_path);
            match UnixStream::connect(&self.socket_path).await {
                Ok(stream) => {
                    info!(socket = %self.socket_path, "connected to relay");
                    *self.stream.lock().await = Some(stream);
                    return Ok(());
                }
                Err(e) if backoff.attempt() + 1 < self.max_attempts => {
                    let delay = backoff.next_delay();
                    warn!(
                        socket = %self.socket_path,
                        attempt = backoff.attempt(),
                        "relay connect failed ({e}), retrying in {delay:?}"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    return Err(AdapterError::ConnectionFailed {
                        endpoint: self.socket_path.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }
    }

    /// Send one finished frame, reconnecting once on write failure.
    ///
    /// Returns `true` when the frame went out on a fresh connection, which
    /// obligates the caller to announce a `SourceReset`.
    pub async fn send_frame(&self, frame: &[u8]) -> AdapterResult<bool> {
        let mut reconnected = false;
        let mut guard = self.stream.lock().await;
        if guard.is_none() {
            drop(guard);
            self.connect().await?;
            reconnected = true;
            guard = self.stream.lock().await;
        }

        let stream = guard.as_mut().ok_or_else(|| AdapterError::ConnectionFailed {
            endpoint: self.socket_path.clone(),
            reason: "no stream after connect".to_string(),
        })?;

        if let Err(e) = stream.write_all(frame).await {
            warn!(socket = %self.socket_path, "relay write failed ({e}), reconnecting");
            *guard = None;
            drop(guard);
            self.connect().await?;
            reconnected = true;

            let mut guard = self.stream.lock().await;
            let stream = guard.as_mut().ok_or_else(|| AdapterError::ConnectionFailed {
                endpoint: self.socket_path.clone(),
                reason: "no stream after reconnect".to_string(),
            })?;
            stream.write_all(frame).await.map_err(AdapterError::Io)?;
        }

        let mut sent = self.frames_sent.lock().await;
        *sent += 1;
        if *sent <= 5 || *sent % 10_000 == 0 {
            debug!(socket = %self.socket_path, frames = *sent, "relay output progress");
        }
        Ok(reconnected)
    }

    pub async fn frames_sent(&self) -> u64 {
        *self.frames_sent.lock().await
    }

    pub async fn is_connected(&self) -> bool {
        self.stream.lock().await.is_some()
    }

    /// Close the connection; the next send reconnects.
    pub async fn disconnect(&self) {
        *self.stream.lock().await = None;
    }

    /// Give the health monitor a handle to poke.
    pub fn socket_path(&self) -> &str {
        &self.socket_path
    }

    /// Background task re-establishing the connection if it drops while the
    /// producer is idle.
    pub fn spawn_health_monitor(self: std::sync::Arc<Self>, interval: Duration) {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                if !self.is_connected().await {
                    if let Err(e) = self.connect().await {
                        warn!(socket = %self.socket_path, "health reconnect failed: {e}");
                    }
                }
            }
        });
    }
}
