//! WebSocket client hub
//!
//! Accepts dashboard clients on `/stream`, tracks their subscription
//! filters, and fans rendered JSON frames out through bounded per-client
//! queues with the relay's drop-oldest policy, so a stalled browser tab
//! can never back-pressure the pipeline.

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use parking_lot::RwLock;
use relay::FrameQueue;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::{accept_hdr_async, tungstenite::Message as WsMessage};
use tracing::{debug, info, warn};

/// A frame ready for fan-out, tagged for subscription filtering.
#[derive(Debug, Clone)]
pub struct OutboundFrame {
    /// Instrument descriptor the frame concerns; `None` passes every filter
    /// (signals, metrics).
    pub instrument: Option<String>,
    pub json: String,
}

struct Client {
    queue: Arc<FrameQueue>,
    /// `None` until the client sends a subscribe command, meaning
    /// "everything" for a dashboard that just wants the firehose.
    subscriptions: Arc<RwLock<Option<HashSet<String>>>>,
}

pub struct ClientHub {
    clients: RwLock<HashMap<u64, Client>>,
    next_id: AtomicU64,
    queue_frames: usize,
    total_dropped: AtomicU64,
}

impl ClientHub {
    pub fn new(queue_frames: usize) -> Arc<Self> {
        Arc::new(Self {
            clients: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            queue_frames,
            total_dropped: AtomicU64::new(0),
        })
    }

    pub fn active_connections(&self) -> usize {
        self.clients.read().len()
    }

    /// Frames evicted across all clients since startup.
    pub fn total_dropped(&self) -> u64 {
        let live: u64 = self
            .clients
            .read()
            .values()
            .map(|c| c.queue.dropped())
            .sum();
        self.total_dropped.load(Ordering::Relaxed) + live
    }

    /// Fan a frame out to every client whose filter admits it.
    pub fn broadcast(&self, frame: &OutboundFrame) {
        let clients = self.clients.read();
        for client in clients.values() {
            let admitted = match (&frame.instrument, &*client.subscriptions.read()) {
                (_, None) => true,
                (None, Some(_)) => true,
                (Some(instrument), Some(set)) => set.contains(instrument),
            };
            if admitted {
                client.queue.push(Bytes::from(frame.json.clone()));
            }
        }
    }

    /// Serve WebSocket clients forever.
    pub async fn run(self: Arc<Self>, bind_addr: &str) -> anyhow::Result<()> {
        let listener = TcpListener::bind(bind_addr).await?;
        info!(addr = bind_addr, "dashboard websocket listening");
        loop {
            let (stream, peer) = listener.accept().await?;
            let hub = self.clone();
            tokio::spawn(async move {
                if let Err(e) = hub.handle_client(stream).await {
                    debug!(%peer, "client session ended: {e}");
                }
            });
        }
    }

    async fn handle_client(self: Arc<Self>, stream: TcpStream) -> anyhow::Result<()> {
        // Clients connect to ws://<host>:<port>/stream; anything else 404s.
        let ws = accept_hdr_async(stream, |request: &Request, response: Response| {
            if request.uri().path() == "/stream" {
                Ok(response)
            } else {
                let mut rejection = ErrorResponse::new(Some("not found".to_string()));
                *rejection.status_mut() = StatusCode::NOT_FOUND;
                Err(rejection)
            }
        })
        .await?;
        let (mut sink, mut source) = ws.split();

        let client_id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let queue = Arc::new(FrameQueue::new(self.queue_frames));
        let subscriptions: Arc<RwLock<Option<HashSet<String>>>> = Arc::new(RwLock::new(None));
        self.clients.write().insert(
            client_id,
            Client {
                queue: queue.clone(),
                subscriptions: subscriptions.clone(),
            },
        );
        info!(client_id, "dashboard client connected");

        let write_queue = queue.clone();
        let writer = tokio::spawn(async move {
            while let Some(frame) = write_queue.pop().await {
                let text = String::from_utf8_lossy(&frame).into_owned();
                if sink.send(WsMessage::Text(text)).await.is_err() {
                    break;
                }
            }
        });

        // Read loop: subscription updates and pings.
        while let Some(message) = source.next().await {
            match message {
                Ok(WsMessage::Text(text)) => {
                    self.handle_command(&text, &subscriptions, &queue);
                }
                Ok(WsMessage::Close(_)) | Err(_) => break,
                Ok(_) => {}
            }
        }

        // Cleanup, preserving the drop count for metrics continuity.
        if let Some(client) = self.clients.write().remove(&client_id) {
            self.total_dropped
                .fetch_add(client.queue.dropped(), Ordering::Relaxed);
        }
        queue.close();
        writer.abort();
        info!(client_id, "dashboard client disconnected");
        Ok(())
    }

    fn handle_command(
        &self,
        text: &str,
        subscriptions: &Arc<RwLock<Option<HashSet<String>>>>,
        queue: &Arc<FrameQueue>,
    ) {
        let Ok(value) = serde_json::from_str::<serde_json::Value>(text) else {
            warn!("unparseable client command ignored");
            return;
        };
        match value.get("type").and_then(|t| t.as_str()) {
            Some("subscribe") => {
                let set: HashSet<String> = value
                    .get("instruments")
                    .and_then(|i| i.as_array())
                    .map(|items| {
                        items
                            .iter()
                            .filter_map(|v| v.as_str().map(str::to_string))
                            .collect()
                    })
                    .unwrap_or_default();
                debug!(instruments = set.len(), "client subscription updated");
                *subscriptions.write() = Some(set);
            }
            Some("ping") => {
                queue.push(Bytes::from_static(b"{\"msg_type\":\"pong\"}"));
            }
            other => {
                debug!(?other, "unknown client command ignored");
            }
        }
    }
}
