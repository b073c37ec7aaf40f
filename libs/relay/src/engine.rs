//! Generic relay engine
//!
//! Owns the Unix socket listener and the connection lifecycle. The replay
//! cache, subscriber table, and sequence tracking live behind one
//! short-lived lock so that subscriber registration and
//! frame fan-out are mutually atomic: a subscriber observes the complete
//! replay, then the live stream, with nothing lost or reordered in between.
//! No await happens while that lock is held.

use crate::queue::FrameQueue;
use crate::replay::ReplayCache;
use crate::RelayLogic;
use bytes::Bytes;
use codec::{
    parse_header, parse_header_unchecked, Message, MessageHeader, SequenceCheck,
    SequenceTracker,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{UnixListener, UnixStream};
use tokio::time::timeout;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("relay setup failed: {0}")]
    Setup(String),

    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),
}

/// Runtime parameters, usually derived from [`config::PipelineConfig`].
#[derive(Debug, Clone)]
pub struct RelayRuntimeConfig {
    pub socket_path: PathBuf,
    pub subscriber_queue_frames: usize,
    pub max_source_violations: u32,
    pub idle_timeout: Duration,
}

impl RelayRuntimeConfig {
    pub fn from_pipeline(
        pipeline: &config::PipelineConfig,
        domain: codec::RelayDomain,
    ) -> Self {
        Self {
            socket_path: pipeline.socket_path(domain.socket_name()),
            subscriber_queue_frames: pipeline.relay.subscriber_queue_frames,
            max_source_violations: pipeline.relay.max_source_violations,
            idle_timeout: Duration::from_secs(pipeline.relay.idle_timeout_secs),
        }
    }
}

/// Everything that must change atomically with respect to fan-out.
struct Shared {
    cache: ReplayCache,
    subscribers: HashMap<u64, Arc<FrameQueue>>,
    sequences: SequenceTracker,
}

#[derive(Debug, Default)]
struct RelayMetrics {
    frames_in: AtomicU64,
    frames_forwarded: AtomicU64,
    invalid_frames: AtomicU64,
    connections: AtomicU64,
}

pub struct Relay<T: RelayLogic> {
    logic: Arc<T>,
    config: RelayRuntimeConfig,
    shared: Arc<Mutex<Shared>>,
    /// source byte → connection id currently holding the write role
    writers: Arc<Mutex<HashMap<u8, u64>>>,
    next_connection_id: Arc<AtomicU64>,
    metrics: Arc<RelayMetrics>,
}

impl<T: RelayLogic> Relay<T> {
    pub fn new(logic: T, config: RelayRuntimeConfig) -> Self {
        Self {
            logic: Arc::new(logic),
            config,
            shared: Arc::new(Mutex::new(Shared {
                cache: ReplayCache::new(),
                subscribers: HashMap::new(),
                sequences: SequenceTracker::new(),
            })),
            writers: Arc::new(Mutex::new(HashMap::new())),
            next_connection_id: Arc::new(AtomicU64::new(1)),
            metrics: Arc::new(RelayMetrics::default()),
        }
    }

    /// Bind the socket and serve connections until the task is cancelled.
    pub async fn run(&self) -> Result<(), RelayError> {
        let listener = self.bind()?;
        info!(
            domain = ?self.logic.domain(),
            socket = %self.config.socket_path.display(),
            "relay listening"
        );

        self.spawn_metrics_reporter();

        loop {
            match listener.accept().await {
                Ok((stream, _)) => {
                    let connection_id = self.next_connection_id.fetch_add(1, Ordering::SeqCst);
                    self.metrics.connections.fetch_add(1, Ordering::Relaxed);
                    debug!(connection_id, "connection accepted");

                    let ctx = ConnectionContext {
                        logic: self.logic.clone(),
                        shared: self.shared.clone(),
                        writers: self.writers.clone(),
                        metrics: self.metrics.clone(),
                        queue_frames: self.config.subscriber_queue_frames,
                        max_violations: self.config.max_source_violations,
                        idle_timeout: self.config.idle_timeout,
                    };
                    tokio::spawn(async move {
                        handle_connection(stream, connection_id, ctx).await;
                    });
                }
                Err(e) => {
                    warn!("accept failed: {e}");
                }
            }
        }
    }

    fn bind(&self) -> Result<UnixListener, RelayError> {
        let path = &self.config.socket_path;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| RelayError::Setup(format!("create {}: {e}", parent.display())))?;
            std::fs::set_permissions(parent, std::fs::Permissions::from_mode(0o700))
                .map_err(|e| RelayError::Setup(format!("chmod {}: {e}", parent.display())))?;
        }
        if path.exists() {
            std::fs::remove_file(path)
                .map_err(|e| RelayError::Setup(format!("remove stale socket: {e}")))?;
        }
        let listener = UnixListener::bind(path)
            .map_err(|e| RelayError::Setup(format!("bind {}: {e}", path.display())))?;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
            .map_err(|e| RelayError::Setup(format!("chmod {}: {e}", path.display())))?;
        Ok(listener)
    }

    fn spawn_metrics_reporter(&self) {
        let metrics = self.metrics.clone();
        let shared = self.shared.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(60));
            interval.tick().await;
            loop {
                interval.tick().await;
                let subscribers = shared.lock().subscribers.len();
                info!(
                    frames_in = metrics.frames_in.load(Ordering::Relaxed),
                    frames_forwarded = metrics.frames_forwarded.load(Ordering::Relaxed),
                    invalid_frames = metrics.invalid_frames.load(Ordering::Relaxed),
                    subscribers,
                    "relay metrics"
                );
            }
        });
    }
}

struct ConnectionContext<T: RelayLogic> {
    logic: Arc<T>,
    shared: Arc<Mutex<Shared>>,
    writers: Arc<Mutex<HashMap<u8, u64>>>,
    metrics: Arc<RelayMetrics>,
    queue_frames: usize,
    max_violations: u32,
    idle_timeout: Duration,
}

async fn handle_connection<T: RelayLogic>(
    stream: UnixStream,
    connection_id: u64,
    ctx: ConnectionContext<T>,
) {
    let (read_half, write_half) = stream.into_split();

    // Register as a subscriber with the replay bootstrap enqueued before
    // any live frame can be fanned out: both happen under the same lock.
    let queue = Arc::new(FrameQueue::new(ctx.queue_frames));
    {
        let mut shared = ctx.shared.lock();
        for frame in shared.cache.replay_frames() {
            queue.push(frame);
        }
        shared.subscribers.insert(connection_id, queue.clone());
    }

    let write_task = tokio::spawn(write_loop(write_half, queue.clone(), connection_id));
    let claimed_source = read_loop(read_half, connection_id, &ctx).await;

    // Cleanup: drop the subscriber queue and release the write role.
    ctx.shared.lock().subscribers.remove(&connection_id);
    queue.close();
    if let Some(source) = claimed_source {
        let mut writers = ctx.writers.lock();
        if writers.get(&source) == Some(&connection_id) {
            writers.remove(&source);
            info!(connection_id, source, "writer role released");
        }
    }
    write_task.abort();
    debug!(connection_id, "connection closed");
}

/// Read frames until the peer disconnects, misbehaves past the violation
/// threshold, or goes silent past twice the idle timeout.
///
/// Returns the source byte this connection held the write role for, if any.
async fn read_loop<T: RelayLogic>(
    mut read_half: OwnedReadHalf,
    connection_id: u64,
    ctx: &ConnectionContext<T>,
) -> Option<u8> {
    let mut violations = 0u32;
    let mut claimed_source: Option<u8> = None;

    loop {
        let frame = match timeout(ctx.idle_timeout * 2, read_frame(&mut read_half)).await {
            Err(_) => {
                // A silent writer is presumed dead; pure subscribers never
                // write, so only connections that already claimed a source
                // are reaped for silence.
                if claimed_source.is_some() {
                    warn!(connection_id, "no frame or heartbeat within idle window");
                    break;
                }
                continue;
            }
            Ok(Ok(Some(frame))) => frame,
            Ok(Ok(None)) => break,
            Ok(Err(FrameReadError::Framing(e))) => {
                ctx.metrics.invalid_frames.fetch_add(1, Ordering::Relaxed);
                warn!(connection_id, "unrecoverable framing error: {e}");
                break;
            }
            Ok(Err(FrameReadError::Io(e))) => {
                debug!(connection_id, "read error: {e}");
                break;
            }
        };

        ctx.metrics.frames_in.fetch_add(1, Ordering::Relaxed);

        let header = match parse_header(&frame) {
            Ok(header) => header,
            Err(e) => {
                violations += 1;
                ctx.metrics.invalid_frames.fetch_add(1, Ordering::Relaxed);
                warn!(connection_id, violations, "invalid frame dropped: {e}");
                if violations >= ctx.max_violations {
                    warn!(connection_id, "violation threshold reached, closing source");
                    break;
                }
                continue;
            }
        };

        // First valid frame claims the write role for its source byte.
        if claimed_source.is_none() {
            let mut writers = ctx.writers.lock();
            match writers.get(&header.source) {
                Some(&holder) if holder != connection_id => {
                    drop(writers);
                    warn!(
                        connection_id,
                        source = header.source,
                        holder,
                        "write role already held, refusing second writer"
                    );
                    break;
                }
                _ => {
                    writers.insert(header.source, connection_id);
                    claimed_source = Some(header.source);
                    info!(connection_id, source = header.source, "writer role claimed");
                }
            }
        }

        if !ctx.logic.should_forward(&header) {
            debug!(
                connection_id,
                domain = header.domain,
                "frame for another domain dropped"
            );
            continue;
        }

        forward_frame(ctx, Bytes::from(frame), &header);
    }

    claimed_source
}

/// Update sequencing and the replay cache, then fan out. One lock, no await.
fn forward_frame<T: RelayLogic>(ctx: &ConnectionContext<T>, frame: Bytes, header: &MessageHeader) {
    let reset = frame_announces_reset(&frame);

    let mut shared = ctx.shared.lock();
    if reset {
        shared
            .sequences
            .reset(header.source, header.domain, header.sequence);
    }
    match shared
        .sequences
        .observe(header.source, header.domain, header.sequence)
    {
        SequenceCheck::Gap { missed } => {
            warn!(source = header.source, missed, "sequence gap from source");
        }
        SequenceCheck::Regression { expected, got } => {
            warn!(
                source = header.source,
                expected, got, "sequence regression without announced reset"
            );
        }
        _ => {}
    }

    shared.cache.note_frame(&frame);
    for queue in shared.subscribers.values() {
        queue.push(frame.clone());
    }
    drop(shared);

    ctx.metrics.frames_forwarded.fetch_add(1, Ordering::Relaxed);
}

fn frame_announces_reset(frame: &Bytes) -> bool {
    let payload = &frame[MessageHeader::SIZE..];
    match codec::parse_tlvs(payload) {
        Ok(tlvs) => tlvs.into_iter().any(|raw| {
            matches!(codec::decode_tlv(raw), Ok(Message::SourceReset(_)))
        }),
        Err(_) => false,
    }
}

enum FrameReadError {
    Io(std::io::Error),
    Framing(String),
}

/// Read one length-delimited frame: exact header, then exact payload.
///
/// `Ok(None)` is a clean EOF at a frame boundary. A header that fails basic
/// validation poisons the byte stream (lengths can no longer be trusted),
/// so it is a framing error rather than a per-frame drop.
async fn read_frame(read_half: &mut OwnedReadHalf) -> Result<Option<Vec<u8>>, FrameReadError> {
    let mut header_buf = [0u8; MessageHeader::SIZE];
    match read_half.read_exact(&mut header_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(FrameReadError::Io(e)),
    }

    let header = parse_header_unchecked(&header_buf)
        .map_err(|e| FrameReadError::Framing(e.to_string()))?;
    let payload_size = header.payload_size as usize;
    if payload_size > codec::MAX_MESSAGE_SIZE - MessageHeader::SIZE {
        return Err(FrameReadError::Framing(format!(
            "declared payload of {payload_size} bytes exceeds protocol maximum"
        )));
    }

    let mut frame = vec![0u8; MessageHeader::SIZE + payload_size];
    frame[..MessageHeader::SIZE].copy_from_slice(&header_buf);
    read_half
        .read_exact(&mut frame[MessageHeader::SIZE..])
        .await
        .map_err(FrameReadError::Io)?;
    Ok(Some(frame))
}

async fn write_loop(mut write_half: OwnedWriteHalf, queue: Arc<FrameQueue>, connection_id: u64) {
    let mut sent = 0u64;
    while let Some(frame) = queue.pop().await {
        if let Err(e) = write_half.write_all(&frame).await {
            debug!(connection_id, "write failed after {sent} frames: {e}");
            break;
        }
        sent += 1;
    }
    debug!(connection_id, sent, dropped = queue.dropped(), "write loop ended");
}
