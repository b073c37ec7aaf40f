//! Coinbase `matches` channel → `Trade` TLV messages

use adapter_service::{
    Adapter, AdapterError, AdapterResult, ExponentialBackoff, RelayOutput, SequenceAllocator,
};
use async_trait::async_trait;
use codec::payloads::{HeartbeatTlv, SourceResetTlv, TradeTlv};
use codec::{Message, RelayDomain, SourceType, TlvMessageBuilder};
use config::PipelineConfig;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};
use tracing::{debug, info, warn};
use types::{InstrumentId, InstrumentRegistry, UsdFixedPoint8};

/// One fill from the `matches` channel.
#[derive(Debug, Deserialize)]
struct MatchEvent {
    #[serde(rename = "type")]
    kind: String,
    product_id: String,
    price: String,
    size: String,
    side: String,
    time: Option<String>,
}

pub struct CoinbaseAdapter {
    config: config::CoinbaseConfig,
    registry: InstrumentRegistry,
    output: Arc<RelayOutput>,
    sequence: SequenceAllocator,
    heartbeat_interval: Duration,
    running: bool,
}

impl CoinbaseAdapter {
    pub fn new(pipeline: &PipelineConfig) -> AdapterResult<Self> {
        let config = pipeline.coinbase.clone();
        if config.products.is_empty() {
            return Err(AdapterError::Config {
                reason: "coinbase.products is empty; nothing to watch".to_string(),
            });
        }
        let socket = pipeline.socket_path(RelayDomain::MarketData.socket_name());
        Ok(Self {
            config,
            registry: InstrumentRegistry::new(),
            output: Arc::new(RelayOutput::new(socket.to_string_lossy().to_string())),
            sequence: SequenceAllocator::new(),
            heartbeat_interval: Duration::from_secs(pipeline.relay.idle_timeout_secs),
            running: false,
        })
    }

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
                    warn!("coinbase session ended ({e}), reconnecting in {delay:?}");
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    async fn run_session(&mut self) -> AdapterResult<()> {
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

        let subscription = serde_json::json!({
            "type": "subscribe",
            "channels": [{ "name": "matches", "product_ids": self.config.products }]
        });
        ws.send(WsMessage::Text(subscription.to_string()))
            .await
            .map_err(|e| AdapterError::ConnectionFailed {
                endpoint: self.config.ws_url.clone(),
                reason: format!("subscribe failed: {e}"),
            })?;
        info!(products = ?self.config.products, "subscribed to coinbase matches");

        // Announce the stream base and the product mappings.
        let base = self.sequence.restart();
        self.emit(Message::SourceReset(SourceResetTlv { new_sequence: base }))
            .await?;
        for product in self.config.products.clone() {
            let descriptor = InstrumentId::cex_descriptor(&self.config.venue, &product);
            let (id, newly_seen) = self.registry.insert(&descriptor);
            if newly_seen {
                self.emit(Message::InstrumentMapping {
                    instrument_id: id,
                    descriptor,
                })
                .await?;
            }
        }

        let mut heartbeat = tokio::time::interval(self.heartbeat_interval);
        heartbeat.tick().await;

        loop {
            tokio::select! {
                message = ws.next() => {
                    match message {
                        Some(Ok(WsMessage::Text(text))) => {
                            if let Err(e) = self.handle_text(&text).await {
                                if let AdapterError::DecodeError { reason } = &e {
                                    debug!("dropping undecodable match: {reason}");
                                } else {
                                    return Err(e);
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
            }
        }
    }

    async fn handle_text(&mut self, text: &str) -> AdapterResult<()> {
        let Ok(event) = serde_json::from_str::<MatchEvent>(text) else {
            return Ok(()); // subscription acks, heartbeats, other channels
        };
        if event.kind != "match" && event.kind != "last_match" {
            return Ok(());
        }

        let descriptor = InstrumentId::cex_descriptor(&self.config.venue, &event.product_id);
        let (instrument_id, newly_seen) = self.registry.insert(&descriptor);
        if newly_seen {
            self.emit(Message::InstrumentMapping {
                instrument_id,
                descriptor,
            })
            .await?;
        }

        let trade = convert_match(instrument_id, &event)?;
        self.emit(Message::Trade(trade)).await
    }

    async fn emit(&mut self, message: Message) -> AdapterResult<()> {
        let frame =
            TlvMessageBuilder::new(RelayDomain::MarketData, SourceType::CoinbaseAdapter as u8)
                .with_sequence(self.sequence.next())
                .add(&message)
                .build()?;
        self.output.send_frame(&frame).await?;
        Ok(())
    }
}

#[async_trait]
impl Adapter for CoinbaseAdapter {
    async fn start(&mut self) -> AdapterResult<()> {
        self.run().await
    }

    async fn stop(&mut self) -> AdapterResult<()> {
        self.running = false;
        self.output.disconnect().await;
        Ok(())
    }

    async fn subscribe(&mut self, ids: Vec<InstrumentId>) -> AdapterResult<()> {
        self.config.products.retain(|product| {
            let descriptor = InstrumentId::cex_descriptor(&self.config.venue, product);
            ids.contains(&InstrumentId::from_descriptor(&descriptor))
        });
        Ok(())
    }

    async fn state_snapshot(&mut self) -> AdapterResult<()> {
        // Trades carry no resident state; mappings re-announce on demand.
        for (instrument_id, descriptor) in self.registry.snapshot() {
            self.emit(Message::InstrumentMapping {
                instrument_id,
                descriptor,
            })
            .await?;
        }
        Ok(())
    }
}

/// Exact decimal-string → 8-decimal fixed-point conversion; a venue price
/// that does not parse drops the single event.
fn convert_match(instrument_id: InstrumentId, event: &MatchEvent) -> AdapterResult<TradeTlv> {
    let price = UsdFixedPoint8::from_decimal_str(&event.price).map_err(|e| {
        AdapterError::DecodeError {
            reason: format!("price {:?}: {e}", event.price),
        }
    })?;
    let volume = UsdFixedPoint8::from_decimal_str(&event.size).map_err(|e| {
        AdapterError::DecodeError {
            reason: format!("size {:?}: {e}", event.size),
        }
    })?;
    let side = match event.side.as_str() {
        "buy" => TradeTlv::SIDE_BUY,
        "sell" => TradeTlv::SIDE_SELL,
        other => {
            return Err(AdapterError::DecodeError {
                reason: format!("unknown side {other:?}"),
            })
        }
    };
    let ts_event_ns = event
        .time
        .as_deref()
        .and_then(parse_rfc3339_ns)
        .unwrap_or_else(types::current_timestamp_ns);

    Ok(TradeTlv {
        instrument_id: instrument_id.to_u64(),
        price: price.raw_value(),
        volume: volume.raw_value(),
        ts_event_ns,
        side,
        price_decimals: 8,
        volume_decimals: 8,
    })
}

fn parse_rfc3339_ns(text: &str) -> Option<u64> {
    chrono::DateTime::parse_from_rfc3339(text)
        .ok()
        .and_then(|dt| dt.timestamp_nanos_opt())
        .and_then(|ns| u64::try_from(ns).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn match_event(price: &str, size: &str, side: &str) -> MatchEvent {
        MatchEvent {
            kind: "match".to_string(),
            product_id: "ETH-USD".to_string(),
            price: price.to_string(),
            size: size.to_string(),
            side: side.to_string(),
            time: Some("2026-01-15T12:00:00.123456Z".to_string()),
        }
    }

    #[test]
    fn converts_match_to_fixed_point_trade() {
        let id = InstrumentId::from_descriptor("coinbase:ETH-USD");
        let trade = convert_match(id, &match_event("2000.50", "1.5", "sell")).unwrap();

        let (instrument_id, price, volume, ts_event_ns) =
            (trade.instrument_id, trade.price, trade.volume, trade.ts_event_ns);
        assert_eq!(instrument_id, id.to_u64());
        assert_eq!(price, 200_050_000_000);
        assert_eq!(volume, 150_000_000);
        assert_eq!(trade.side, TradeTlv::SIDE_SELL);
        assert_eq!(trade.price_decimals, 8);
        // Venue timestamp preserved at nanosecond precision.
        assert_eq!(ts_event_ns % 1_000_000_000, 123_456_000);
    }

    #[test]
    fn bad_price_drops_the_event() {
        let id = InstrumentId::from_descriptor("coinbase:ETH-USD");
        assert!(matches!(
            convert_match(id, &match_event("n/a", "1.0", "buy")),
            Err(AdapterError::DecodeError { .. })
        ));
    }

    #[test]
    fn unknown_side_drops_the_event() {
        let id = InstrumentId::from_descriptor("coinbase:ETH-USD");
        assert!(convert_match(id, &match_event("1", "1", "hold")).is_err());
    }

    #[test]
    fn match_json_shape_parses() {
        let text = r#"{"type":"match","trade_id":1,"product_id":"ETH-USD","price":"2000.5",
            "size":"0.25","side":"buy","time":"2026-01-15T12:00:00Z","sequence":9}"#;
        let event: MatchEvent = serde_json::from_str(text).unwrap();
        assert_eq!(event.kind, "match");
        assert_eq!(event.product_id, "ETH-USD");
    }
}
