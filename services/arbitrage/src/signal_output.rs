//! Signal emission onto the Signal relay
//!
//! Wraps a [`RelayOutput`] with this process's (source, domain) sequencing.
//! The first frame after startup or a relay reconnect is a `SourceReset`
//! announcing the sequence base.

use adapter_service::{AdapterResult, RelayOutput, SequenceAllocator};
use codec::payloads::{ArbitrageSignalTlv, SourceResetTlv};
use codec::{Message, RelayDomain, SourceType, TlvMessageBuilder};
use std::sync::Arc;
use tracing::info;

pub struct SignalOutput {
    output: Arc<RelayOutput>,
    sequence: SequenceAllocator,
    announced: bool,
}

impl SignalOutput {
    pub fn new(socket_path: impl Into<String>) -> Self {
        Self {
            output: Arc::new(RelayOutput::new(socket_path)),
            sequence: SequenceAllocator::new(),
            announced: false,
        }
    }

    pub async fn connect(&mut self) -> AdapterResult<()> {
        self.output.connect().await?;
        self.announce().await
    }

    async fn announce(&mut self) -> AdapterResult<()> {
        let base = self.sequence.restart();
        let frame = self.build(Message::SourceReset(SourceResetTlv { new_sequence: base }))?;
        self.output.send_frame(&frame).await?;
        self.announced = true;
        info!(base, "signal stream announced");
        Ok(())
    }

    pub async fn emit(&mut self, signal: ArbitrageSignalTlv) -> AdapterResult<()> {
        if !self.announced {
            self.announce().await?;
        }
        let frame = self.build(Message::ArbitrageSignal(signal))?;
        let reconnected = self.output.send_frame(&frame).await?;
        if reconnected {
            // The relay lost our stream state; re-announce for the next frame.
            self.announced = false;
        }
        Ok(())
    }

    fn build(&mut self, message: Message) -> AdapterResult<Vec<u8>> {
        Ok(
            TlvMessageBuilder::new(RelayDomain::Signal, SourceType::ArbitrageDetector as u8)
                .with_sequence(self.sequence.next())
                .add(&message)
                .build()?,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codec::decode_frame;
    use tokio::io::AsyncReadExt;
    use tokio::net::UnixListener;
    use zerocopy::FromZeroes;

    #[tokio::test]
    async fn announces_then_emits_with_consecutive_sequences() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("signals.sock");
        let listener = UnixListener::bind(&path).unwrap();

        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut frames = Vec::new();
            for _ in 0..2 {
                let mut header = [0u8; 32];
                stream.read_exact(&mut header).await.unwrap();
                let parsed = codec::header::parse_header_unchecked(&header).unwrap();
                let mut frame = header.to_vec();
                frame.resize(32 + parsed.payload_size as usize, 0);
                stream.read_exact(&mut frame[32..]).await.unwrap();
                frames.push(frame);
            }
            frames
        });

        let mut output = SignalOutput::new(path.to_string_lossy().to_string());
        output.connect().await.unwrap();

        let mut signal = ArbitrageSignalTlv::new_zeroed();
        signal.signal_id = 7;
        signal.net_profit_usd = 150_000_000;
        output.emit(signal).await.unwrap();

        let frames = server.await.unwrap();
        let (header0, messages0) = decode_frame(&frames[0]).unwrap();
        let (header1, messages1) = decode_frame(&frames[1]).unwrap();

        assert_eq!(header0.sequence, 0);
        assert!(matches!(messages0[0], Message::SourceReset(_)));
        assert_eq!(header1.sequence, 1);
        assert_eq!(header1.domain, RelayDomain::Signal as u8);
        let Message::ArbitrageSignal(received) = &messages1[0] else {
            panic!("expected a signal");
        };
        let signal_id = received.signal_id;
        assert_eq!(signal_id, 7);
    }
}
