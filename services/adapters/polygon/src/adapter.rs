//! The Polygon adapter proper: session lifecycle, event conversion, and
//! emission with monotonic sequencing.

use crate::abi::{decode_event, u256_to_u128, DexEvent, RawLog};
use crate::constants::monitored_event_topics;
use crate::snapshot::{PoolSnapshot, SnapshotClient};
use adapter_service::{
    Adapter, AdapterError, AdapterResult, DedupWindow, ExponentialBackoff, RelayOutput,
    SequenceAllocator,
};
use async_trait::async_trait;
use codec::payloads::{
    HeartbeatTlv, PoolBurnTlv, PoolMintTlv, PoolProtocol, PoolStateTlv, PoolSwapTlv,
    PoolSyncTlv, SourceResetTlv,
};
use codec::{Message, RelayDomain, SourceType, TlvMessageBuilder};
use config::PipelineConfig;
use futures_util::{SinkExt, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::{
    connect_async, tungstenite::Message as WsMessage, MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, info, warn};
use types::{InstrumentId, InstrumentRegistry};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// A pool we have snapshotted and may emit incremental events for.
#[derive(Debug, Clone)]
struct WatchedPool {
    pool_id: InstrumentId,
    token0_id: InstrumentId,
    token1_id: InstrumentId,
    snapshot: PoolSnapshot,
}

pub struct PolygonAdapter {
    config: config::PolygonConfig,
    watched_addresses: Vec<[u8; 20]>,
    registry: InstrumentRegistry,
    output: Arc<RelayOutput>,
    sequence: SequenceAllocator,
    dedup: DedupWindow,
    snapshots: SnapshotClient,
    pools: HashMap<[u8; 20], WatchedPool>,
    heartbeat_interval: Duration,
    running: bool,
}

impl PolygonAdapter {
    pub fn new(pipeline: &PipelineConfig) -> AdapterResult<Self> {
        let config = pipeline.polygon.clone();
        let watched_addresses = config
            .pools
            .iter()
            .map(|p| {
                config::parse_address(p).map_err(|reason| AdapterError::Config { reason })
            })
            .collect::<AdapterResult<Vec<_>>>()?;
        if watched_addresses.is_empty() {
            return Err(AdapterError::Config {
                reason: "polygon.pools is empty; nothing to watch".to_string(),
            });
        }

        let socket = pipeline.socket_path(RelayDomain::MarketData.socket_name());
        Ok(Self {
            snapshots: SnapshotClient::new(&config.http_url)?,
            dedup: DedupWindow::new(config.dedup_window),
            config,
            watched_addresses,
            registry: InstrumentRegistry::new(),
            output: Arc::new(RelayOutput::new(socket.to_string_lossy().to_string())),
            sequence: SequenceAllocator::new(),
            pools: HashMap::new(),
            heartbeat_interval: Duration::from_secs(pipeline.relay.idle_timeout_secs),
            running: false,
        })
    }

    /// Run forever: each session covers one WebSocket connection; transient
    /// failures reconnect with backoff, resubscribe, re-snapshot, and
    /// announce a `SourceReset`.
    pub async fn run(&mut self) -> AdapterResult<()> {
        self.running = true;
        self.output.connect().await?;
        let mut backoff = ExponentialBackoff::default();

        while self.running {
            let session_started = std::time::Instant::now();
            match self.run_session().await {
                Ok(()) => break,
                Err(e) if e.is_transient() => {
                    // A session that held for a while earns a fresh backoff.
                    if session_started.elapsed() > Duration::from_secs(60) {
                        backoff.reset();
                    }
                    let delay = backoff.next_delay();
                    warn!("polygon session ended ({e}), reconnecting in {delay:?}");
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    async fn run_session(&mut self) -> AdapterResult<()> {
        let mut ws = self.connect_and_subscribe().await?;
        self.bootstrap().await?;

        let mut heartbeat = tokio::time::interval(self.heartbeat_interval);
        heartbeat.tick().await; // immediate first tick is not a beacon
        let mut snapshot_retry = tokio::time::interval(Duration::from_secs(30));
        snapshot_retry.tick().await;

        loop {
            tokio::select! {
                message = ws.next() => {
                    match message {
                        Some(Ok(WsMessage::Text(text))) => {
                            if let Err(e) = self.handle_ws_text(&text).await {
                                match e {
                                    AdapterError::DecodeError { ref reason } => {
                                        // One malformed event; drop it, keep the stream.
                                        debug!("dropping undecodable event: {reason}");
                                    }
                                    other => return Err(other),
                                }
                            }
                        }
                        Some(Ok(WsMessage::Ping(payload))) => {
                            ws.send(WsMessage::Pong(payload)).await.map_err(|e| {
                                AdapterError::ConnectionFailed {
                                    endpoint: self.config.ws_url.clone(),
                                    reason: e.to_string(),
                                }
                            })?;
                        }
                        Some(Ok(WsMessage::Close(_))) | None => {
                            return Err(AdapterError::ConnectionFailed {
                                endpoint: self.config.ws_url.clone(),
                                reason: "websocket closed".to_string(),
                            });
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            return Err(AdapterError::ConnectionFailed {
                                endpoint: self.config.ws_url.clone(),
                                reason: e.to_string(),
                            });
                        }
                    }
                }
                _ = heartbeat.tick() => {
                    self.emit(Message::Heartbeat(HeartbeatTlv {
                        ts_ns: types::current_timestamp_ns(),
                    }))
                    .await?;
                }
                _ = snapshot_retry.tick() => {
                    if !self.pending_snapshots().is_empty() {
                        self.retry_pending_snapshots().await?;
                    }
                }
            }
        }
    }

    async fn connect_and_subscribe(&mut self) -> AdapterResult<WsStream> {
        info!(url = %self.config.ws_url, "connecting to Polygon websocket");
        let connect = connect_async(&self.config.ws_url);
        let (mut ws, _) = tokio::time::timeout(
            Duration::from_millis(self.config.connect_timeout_ms),
            connect,
        )
        .await
        .map_err(|_| AdapterError::ConnectionTimeout {
            endpoint: self.config.ws_url.clone(),
            timeout_ms: self.config.connect_timeout_ms,
        })?
        .map_err(|e| AdapterError::ConnectionFailed {
            endpoint: self.config.ws_url.clone(),
            reason: e.to_string(),
        })?;

        let addresses: Vec<String> = self
            .watched_addresses
            .iter()
            .map(|a| format!("0x{}", hex::encode(a)))
            .collect();
        let topics: Vec<String> = monitored_event_topics()
            .iter()
            .map(|t| format!("0x{}", hex::encode(t)))
            .collect();
        let subscription = serde_json::json!({
            "id": 1,
            "method": "eth_subscribe",
            "params": ["logs", { "address": addresses, "topics": [topics] }]
        });

        ws.send(WsMessage::Text(subscription.to_string()))
            .await
            .map_err(|e| AdapterError::ConnectionFailed {
                endpoint: self.config.ws_url.clone(),
                reason: format!("subscribe failed: {e}"),
            })?;
        info!("subscribed to DEX log events");
        Ok(ws)
    }

    /// Announce the sequence base, then snapshot every watched pool and
    /// emit its mappings and `PoolState` before any incremental event.
    /// Finishes with an `eth_getLogs` backfill covering the window between
    /// the snapshots and the live subscription.
    async fn bootstrap(&mut self) -> AdapterResult<()> {
        let base = self.sequence.restart();
        self.emit(Message::SourceReset(SourceResetTlv { new_sequence: base }))
            .await?;
        self.dedup.clear();
        self.pools.clear();

        let snapshot_block = self.snapshots.block_number().await.unwrap_or(0);

        for address in self.watched_addresses.clone() {
            match self.snapshots.pool_snapshot(address).await {
                Ok(snapshot) => {
                    self.register_and_announce(address, snapshot).await?;
                }
                Err(e) => {
                    // Until a snapshot exists the pool stays out of
                    // `self.pools`, so its incremental events are withheld;
                    // the retry timer picks it up again.
                    warn!(
                        pool = %hex::encode(address),
                        "snapshot failed ({e}); events for this pool are withheld"
                    );
                }
            }
        }
        info!(pools = self.pools.len(), "bootstrap complete");

        if snapshot_block > 0 {
            self.backfill_from(snapshot_block).await;
        }
        Ok(())
    }

    /// Replay logs minted while we were snapshotting. The dedup window
    /// suppresses anything the live subscription also delivers.
    async fn backfill_from(&mut self, from_block: u64) {
        let addresses: Vec<[u8; 20]> = self.pools.keys().copied().collect();
        if addresses.is_empty() {
            return;
        }
        match self.snapshots.backfill_logs(&addresses, from_block).await {
            Ok(logs) => {
                let count = logs.len();
                for log in logs {
                    if let Err(e) = self.process_raw_log(log).await {
                        debug!("backfill log dropped: {e}");
                    }
                }
                info!(from_block, count, "backfill complete");
            }
            Err(e) => {
                warn!(from_block, "log backfill failed: {e}");
            }
        }
    }

    /// Addresses still waiting for a first successful snapshot.
    fn pending_snapshots(&self) -> Vec<[u8; 20]> {
        self.watched_addresses
            .iter()
            .filter(|a| !self.pools.contains_key(*a))
            .copied()
            .collect()
    }

    async fn retry_pending_snapshots(&mut self) -> AdapterResult<()> {
        for address in self.pending_snapshots() {
            match self.snapshots.pool_snapshot(address).await {
                Ok(snapshot) => {
                    info!(pool = %hex::encode(address), "snapshot retry succeeded");
                    self.register_and_announce(address, snapshot).await?;
                }
                Err(e) => {
                    debug!(pool = %hex::encode(address), "snapshot retry failed: {e}");
                }
            }
        }
        Ok(())
    }

    async fn register_and_announce(
        &mut self,
        address: [u8; 20],
        snapshot: PoolSnapshot,
    ) -> AdapterResult<()> {
        let pool_descriptor = InstrumentId::pool_descriptor(
            &self.config.venue,
            self.config.chain_id,
            &address,
            &snapshot.token0,
            &snapshot.token1,
        );
        let token0_descriptor =
            InstrumentId::token_descriptor(self.config.chain_id, &snapshot.token0);
        let token1_descriptor =
            InstrumentId::token_descriptor(self.config.chain_id, &snapshot.token1);

        let mut ids = [InstrumentId::default(); 3];
        for (slot, descriptor) in ids
            .iter_mut()
            .zip([&pool_descriptor, &token0_descriptor, &token1_descriptor])
        {
            let (id, newly_seen) = self.registry.insert(descriptor);
            *slot = id;
            if newly_seen {
                self.emit(Message::InstrumentMapping {
                    instrument_id: id,
                    descriptor: descriptor.clone(),
                })
                .await?;
            }
        }

        let watched = WatchedPool {
            pool_id: ids[0],
            token0_id: ids[1],
            token1_id: ids[2],
            snapshot,
        };
        self.emit(Message::PoolState(pool_state_message(&watched, 0)))
            .await?;
        self.pools.insert(address, watched);
        Ok(())
    }

    async fn handle_ws_text(&mut self, text: &str) -> AdapterResult<()> {
        let Some(log) = parse_subscription_log(text)? else {
            return Ok(()); // subscription ack or unrelated frame
        };
        self.process_raw_log(log).await
    }

    async fn process_raw_log(&mut self, log: RawLog) -> AdapterResult<()> {
        if !self.dedup.insert((log.tx_hash, log.log_index)) {
            debug!(
                tx = %hex::encode(log.tx_hash),
                log_index = log.log_index,
                "duplicate event dropped"
            );
            return Ok(());
        }

        let Some(event) = decode_event(&log)? else {
            return Ok(());
        };

        let Some(pool) = self.pools.get_mut(&log.address) else {
            // Unknown or not-yet-snapshotted pool.
            return Ok(());
        };
        apply_event_to_snapshot(&mut pool.snapshot, &event);
        let Some(message) = convert_event(pool, &event, &log) else {
            return Ok(());
        };
        self.emit(message).await
    }

    /// Build a frame with the next sequence number and send it; if the
    /// relay connection was re-established, re-announce mappings and
    /// states so a restarted relay can rebuild its replay cache.
    async fn emit(&mut self, message: Message) -> AdapterResult<()> {
        let frame =
            TlvMessageBuilder::new(RelayDomain::MarketData, SourceType::PolygonAdapter as u8)
                .with_sequence(self.sequence.next())
                .add(&message)
                .build()?;
        let reconnected = self.output.send_frame(&frame).await?;
        if reconnected && !matches!(message, Message::SourceReset(_)) {
            self.rebroadcast_static().await?;
        }
        Ok(())
    }

    /// Re-emit every known mapping and pool state (relay restart, or an
    /// explicit snapshot request).
    async fn rebroadcast_static(&mut self) -> AdapterResult<()> {
        info!("re-announcing mappings and pool states");
        let mappings = self.registry.snapshot();
        let states: Vec<_> = self
            .pools
            .values()
            .map(|p| pool_state_message(p, 0))
            .collect();

        for (instrument_id, descriptor) in mappings {
            let frame = TlvMessageBuilder::new(
                RelayDomain::MarketData,
                SourceType::PolygonAdapter as u8,
            )
            .with_sequence(self.sequence.next())
            .add(&Message::InstrumentMapping {
                instrument_id,
                descriptor,
            })
            .build()?;
            self.output.send_frame(&frame).await?;
        }
        for state in states {
            let frame = TlvMessageBuilder::new(
                RelayDomain::MarketData,
                SourceType::PolygonAdapter as u8,
            )
            .with_sequence(self.sequence.next())
            .add(&Message::PoolState(state))
            .build()?;
            self.output.send_frame(&frame).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Adapter for PolygonAdapter {
    async fn start(&mut self) -> AdapterResult<()> {
        self.run().await
    }

    async fn stop(&mut self) -> AdapterResult<()> {
        self.running = false;
        self.output.disconnect().await;
        Ok(())
    }

    async fn subscribe(&mut self, ids: Vec<InstrumentId>) -> AdapterResult<()> {
        self.pools.retain(|_, pool| ids.contains(&pool.pool_id));
        self.watched_addresses = self.pools.keys().copied().collect();
        Ok(())
    }

    async fn state_snapshot(&mut self) -> AdapterResult<()> {
        self.rebroadcast_static().await
    }
}

/// Convert a decoded event into its wire message, at raw precision.
fn convert_event(pool: &WatchedPool, event: &DexEvent, log: &RawLog) -> Option<Message> {
    match event {
        DexEvent::V2Swap { .. } | DexEvent::V3Swap { .. } => {
            let (amount_in, amount_out, token_in_is_token0) = event.swap_direction()?;
            let (token_in_id, token_out_id, in_decimals, out_decimals) = if token_in_is_token0 {
                (
                    pool.token0_id,
                    pool.token1_id,
                    pool.snapshot.token0_decimals,
                    pool.snapshot.token1_decimals,
                )
            } else {
                (
                    pool.token1_id,
                    pool.token0_id,
                    pool.snapshot.token1_decimals,
                    pool.snapshot.token0_decimals,
                )
            };
            let (sqrt_price_after, tick_after) = match event {
                DexEvent::V3Swap {
                    sqrt_price_x96,
                    tick,
                    ..
                } => {
                    let mut le = [0u8; 32];
                    sqrt_price_x96.to_little_endian(&mut le);
                    (le, *tick)
                }
                _ => ([0u8; 32], 0),
            };
            Some(Message::PoolSwap(PoolSwapTlv {
                amount_in,
                amount_out,
                pool_id: pool.pool_id.to_u64(),
                token_in_id: token_in_id.to_u64(),
                token_out_id: token_out_id.to_u64(),
                block_number: log.block_number,
                tick_after,
                amount_in_decimals: in_decimals,
                amount_out_decimals: out_decimals,
                sqrt_price_x96_after: sqrt_price_after,
            }))
        }
        DexEvent::V2Sync { reserve0, reserve1 } => Some(Message::PoolSync(PoolSyncTlv {
            reserve0: u256_to_u128(reserve0)?,
            reserve1: u256_to_u128(reserve1)?,
            pool_id: pool.pool_id.to_u64(),
            block_number: log.block_number,
            reserve0_decimals: pool.snapshot.token0_decimals,
            reserve1_decimals: pool.snapshot.token1_decimals,
        })),
        DexEvent::V2Mint { amount0, amount1 } => Some(Message::PoolMint(PoolMintTlv {
            amount0: u256_to_u128(amount0)?,
            amount1: u256_to_u128(amount1)?,
            liquidity_delta: 0,
            pool_id: pool.pool_id.to_u64(),
            block_number: log.block_number,
            tick_lower: 0,
            tick_upper: 0,
            amount0_decimals: pool.snapshot.token0_decimals,
            amount1_decimals: pool.snapshot.token1_decimals,
        })),
        DexEvent::V2Burn { amount0, amount1 } => Some(Message::PoolBurn(PoolBurnTlv {
            amount0: u256_to_u128(amount0)?,
            amount1: u256_to_u128(amount1)?,
            liquidity_delta: 0,
            pool_id: pool.pool_id.to_u64(),
            block_number: log.block_number,
            tick_lower: 0,
            tick_upper: 0,
            amount0_decimals: pool.snapshot.token0_decimals,
            amount1_decimals: pool.snapshot.token1_decimals,
        })),
        DexEvent::V3Mint {
            tick_lower,
            tick_upper,
            liquidity,
            amount0,
            amount1,
        } => Some(Message::PoolMint(PoolMintTlv {
            amount0: u256_to_u128(amount0)?,
            amount1: u256_to_u128(amount1)?,
            liquidity_delta: *liquidity,
            pool_id: pool.pool_id.to_u64(),
            block_number: log.block_number,
            tick_lower: *tick_lower,
            tick_upper: *tick_upper,
            amount0_decimals: pool.snapshot.token0_decimals,
            amount1_decimals: pool.snapshot.token1_decimals,
        })),
        DexEvent::V3Burn {
            tick_lower,
            tick_upper,
            liquidity,
            amount0,
            amount1,
        } => Some(Message::PoolBurn(PoolBurnTlv {
            amount0: u256_to_u128(amount0)?,
            amount1: u256_to_u128(amount1)?,
            liquidity_delta: *liquidity,
            pool_id: pool.pool_id.to_u64(),
            block_number: log.block_number,
            tick_lower: *tick_lower,
            tick_upper: *tick_upper,
            amount0_decimals: pool.snapshot.token0_decimals,
            amount1_decimals: pool.snapshot.token1_decimals,
        })),
    }
}

/// Keep the local snapshot current so rebroadcasts reflect reality.
fn apply_event_to_snapshot(snapshot: &mut PoolSnapshot, event: &DexEvent) {
    match event {
        DexEvent::V2Sync { reserve0, reserve1 } => {
            if let (Some(r0), Some(r1)) = (u256_to_u128(reserve0), u256_to_u128(reserve1)) {
                snapshot.reserve0 = r0;
                snapshot.reserve1 = r1;
            }
        }
        DexEvent::V3Swap {
            sqrt_price_x96,
            liquidity,
            tick,
            ..
        } => {
            sqrt_price_x96.to_little_endian(&mut snapshot.sqrt_price_x96);
            snapshot.liquidity = *liquidity;
            snapshot.tick = *tick;
        }
        _ => {}
    }
}

fn pool_state_message(pool: &WatchedPool, block_number: u64) -> PoolStateTlv {
    let s = &pool.snapshot;
    PoolStateTlv {
        reserve0: s.reserve0,
        reserve1: s.reserve1,
        liquidity: s.liquidity,
        pool_id: pool.pool_id.to_u64(),
        token0_id: pool.token0_id.to_u64(),
        token1_id: pool.token1_id.to_u64(),
        block_number,
        fee_pips: s.fee_pips,
        tick: s.tick,
        tick_spacing: s.tick_spacing,
        protocol: s.protocol as u8,
        token0_decimals: s.token0_decimals,
        token1_decimals: s.token1_decimals,
        sqrt_price_x96: s.sqrt_price_x96,
    }
}

/// Extract a log object from an `eth_subscription` notification.
fn parse_subscription_log(text: &str) -> AdapterResult<Option<RawLog>> {
    let value: serde_json::Value =
        serde_json::from_str(text).map_err(|e| AdapterError::DecodeError {
            reason: format!("invalid JSON from websocket: {e}"),
        })?;

    if value.get("method").and_then(|m| m.as_str()) != Some("eth_subscription") {
        return Ok(None);
    }
    let Some(result) = value.pointer("/params/result") else {
        return Ok(None);
    };

    let address = parse_hex_fixed::<20>(result.get("address"), "address")?;
    let topics = result
        .get("topics")
        .and_then(|t| t.as_array())
        .ok_or_else(|| AdapterError::DecodeError {
            reason: "log missing topics".to_string(),
        })?
        .iter()
        .map(|t| parse_hex_fixed::<32>(Some(t), "topic"))
        .collect::<AdapterResult<Vec<_>>>()?;
    let data = parse_hex_variable(result.get("data"))?;
    let tx_hash = parse_hex_fixed::<32>(result.get("transactionHash"), "transactionHash")?;
    let log_index = parse_hex_u64(result.get("logIndex"))?;
    let block_number = parse_hex_u64(result.get("blockNumber"))?;

    Ok(Some(RawLog {
        address,
        topics,
        data,
        tx_hash,
        log_index,
        block_number,
    }))
}

fn parse_hex_fixed<const N: usize>(
    value: Option<&serde_json::Value>,
    what: &'static str,
) -> AdapterResult<[u8; N]> {
    let text = value.and_then(|v| v.as_str()).ok_or_else(|| AdapterError::DecodeError {
        reason: format!("log missing {what}"),
    })?;
    let bytes = parse_hex_str(text)?;
    if bytes.len() != N {
        return Err(AdapterError::DecodeError {
            reason: format!("{what} has {} bytes, expected {N}", bytes.len()),
        });
    }
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes);
    Ok(out)
}

fn parse_hex_variable(value: Option<&serde_json::Value>) -> AdapterResult<Vec<u8>> {
    match value.and_then(|v| v.as_str()) {
        Some(text) => parse_hex_str(text),
        None => Ok(Vec::new()),
    }
}

fn parse_hex_u64(value: Option<&serde_json::Value>) -> AdapterResult<u64> {
    let text = value.and_then(|v| v.as_str()).unwrap_or("0x0");
    let stripped = text.strip_prefix("0x").unwrap_or(text);
    u64::from_str_radix(stripped, 16).map_err(|e| AdapterError::DecodeError {
        reason: format!("invalid hex number {text}: {e}"),
    })
}

fn parse_hex_str(text: &str) -> AdapterResult<Vec<u8>> {
    let stripped = text.strip_prefix("0x").unwrap_or(text);
    hex::decode(stripped).map_err(|e| AdapterError::DecodeError {
        reason: format!("invalid hex string: {e}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::V2_SWAP_TOPIC;
    use zerocopy::AsBytes;

    fn watched_pool() -> WatchedPool {
        WatchedPool {
            pool_id: InstrumentId::from_descriptor("polygon:137:0xp:0x0:0x1"),
            token0_id: InstrumentId::from_descriptor("token:137:0x0"),
            token1_id: InstrumentId::from_descriptor("token:137:0x1"),
            snapshot: PoolSnapshot {
                protocol: PoolProtocol::V2,
                token0: [0xA0; 20],
                token1: [0xB0; 20],
                token0_decimals: 18,
                token1_decimals: 6,
                fee_pips: 3000,
                tick_spacing: 0,
                reserve0: 10u128.pow(21),
                reserve1: 2 * 10u128.pow(9),
                sqrt_price_x96: [0u8; 32],
                liquidity: 0,
                tick: 0,
            },
        }
    }

    fn sample_log() -> RawLog {
        RawLog {
            address: [0x11; 20],
            topics: vec![*V2_SWAP_TOPIC],
            data: vec![],
            tx_hash: [0x33; 32],
            log_index: 4,
            block_number: 52_123_456,
        }
    }

    #[test]
    fn swap_conversion_orients_decimals_by_direction() {
        let pool = watched_pool();
        let event = DexEvent::V2Swap {
            amount0_in: ethers_core::types::U256::from(10u128.pow(18)),
            amount1_in: ethers_core::types::U256::zero(),
            amount0_out: ethers_core::types::U256::zero(),
            amount1_out: ethers_core::types::U256::from(1_993_000u64),
        };

        let Some(Message::PoolSwap(swap)) = convert_event(&pool, &event, &sample_log()) else {
            panic!("expected a PoolSwap message");
        };
        let amount_in = swap.amount_in;
        let amount_out = swap.amount_out;
        let token_in_id = swap.token_in_id;
        let token_out_id = swap.token_out_id;
        assert_eq!(amount_in, 10u128.pow(18));
        assert_eq!(amount_out, 1_993_000);
        assert_eq!(swap.amount_in_decimals, 18);
        assert_eq!(swap.amount_out_decimals, 6);
        assert_eq!(token_in_id, pool.token0_id.to_u64());
        assert_eq!(token_out_id, pool.token1_id.to_u64());
    }

    #[test]
    fn conversion_is_deterministic_bit_for_bit() {
        let pool = watched_pool();
        let event = DexEvent::V2Sync {
            reserve0: ethers_core::types::U256::from(5u64),
            reserve1: ethers_core::types::U256::from(9u64),
        };
        let log = sample_log();

        let a = convert_event(&pool, &event, &log).unwrap();
        let b = convert_event(&pool, &event, &log).unwrap();
        let (Message::PoolSync(a), Message::PoolSync(b)) = (a, b) else {
            panic!("expected PoolSync");
        };
        assert_eq!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn v3_mint_carries_tick_range_and_liquidity_delta() {
        let pool = watched_pool();
        let event = DexEvent::V3Mint {
            tick_lower: -887_220,
            tick_upper: 887_220,
            liquidity: 42_000,
            amount0: ethers_core::types::U256::from(7u64),
            amount1: ethers_core::types::U256::from(8u64),
        };
        let Some(Message::PoolMint(mint)) = convert_event(&pool, &event, &sample_log()) else {
            panic!("expected PoolMint");
        };
        let tick_lower = mint.tick_lower;
        let tick_upper = mint.tick_upper;
        let liquidity_delta = mint.liquidity_delta;
        assert_eq!(tick_lower, -887_220);
        assert_eq!(tick_upper, 887_220);
        assert_eq!(liquidity_delta, 42_000);
    }

    #[test]
    fn sync_updates_local_snapshot() {
        let mut pool = watched_pool();
        apply_event_to_snapshot(
            &mut pool.snapshot,
            &DexEvent::V2Sync {
                reserve0: ethers_core::types::U256::from(111u64),
                reserve1: ethers_core::types::U256::from(222u64),
            },
        );
        assert_eq!(pool.snapshot.reserve0, 111);
        assert_eq!(pool.snapshot.reserve1, 222);
    }

    #[test]
    fn subscription_ack_is_not_a_log() {
        let ack = r#"{"jsonrpc":"2.0","id":1,"result":"0xsub"}"#;
        assert!(parse_subscription_log(ack).unwrap().is_none());
    }

    #[test]
    fn subscription_notification_parses_to_raw_log() {
        let text = format!(
            r#"{{"jsonrpc":"2.0","method":"eth_subscription","params":{{"subscription":"0xsub","result":{{
                "address":"0x1111111111111111111111111111111111111111",
                "topics":["0x{}"],
                "data":"0x00",
                "transactionHash":"0x{}",
                "logIndex":"0x2",
                "blockNumber":"0x31b8b40"
            }}}}}}"#,
            hex::encode(*crate::constants::V2_SYNC_TOPIC),
            hex::encode([0x44u8; 32]),
        );
        let log = parse_subscription_log(&text).unwrap().unwrap();
        assert_eq!(log.address, [0x11; 20]);
        assert_eq!(log.log_index, 2);
        assert_eq!(log.block_number, 0x31b8b40);
        assert_eq!(log.data, vec![0u8]);
    }
}
