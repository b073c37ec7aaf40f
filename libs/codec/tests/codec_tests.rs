//! End-to-end codec validation: frame laws, forward compatibility, and
//! sequence continuity across realistic message mixes.

use codec::payloads::*;
use codec::{
    decode_frame, Message, MessageHeader, RelayDomain, SequenceCheck, SequenceTracker,
    SourceType, TlvMessageBuilder,
};
use types::InstrumentId;
use zerocopy::AsBytes;

fn pool_swap(pool: &str, amount_in: u128, amount_out: u128) -> PoolSwapTlv {
    PoolSwapTlv {
        amount_in,
        amount_out,
        pool_id: InstrumentId::from_descriptor(pool).to_u64(),
        token_in_id: InstrumentId::from_descriptor("token:137:0xaa").to_u64(),
        token_out_id: InstrumentId::from_descriptor("token:137:0xbb").to_u64(),
        block_number: 52_000_000,
        tick_after: -12_345,
        amount_in_decimals: 18,
        amount_out_decimals: 6,
        sqrt_price_x96_after: PoolSwapTlv::sqrt_price_bytes_from_u128(
            79228162514264337593543950336,
        ),
    }
}

#[test]
fn every_frame_satisfies_the_frame_laws() {
    let messages = vec![
        Message::InstrumentMapping {
            instrument_id: InstrumentId::from_descriptor("quickswap:137:0xp:0xa:0xb"),
            descriptor: "quickswap:137:0xp:0xa:0xb".to_string(),
        },
        Message::PoolSwap(pool_swap("quickswap:137:0xp:0xa:0xb", 10u128.pow(18), 1_993_000_000)),
        Message::SourceReset(SourceResetTlv { new_sequence: 0 }),
        Message::Heartbeat(HeartbeatTlv { ts_ns: 1 }),
    ];

    for (i, message) in messages.iter().enumerate() {
        let frame =
            TlvMessageBuilder::new(RelayDomain::MarketData, SourceType::PolygonAdapter as u8)
                .with_sequence(i as u64)
                .add(message)
                .build()
                .unwrap();

        // magic
        assert_eq!(&frame[..4], &0xDEADBEEFu32.to_le_bytes());
        // payload_size ≤ total − 32
        let declared = u32::from_le_bytes(frame[24..28].try_into().unwrap()) as usize;
        assert_eq!(declared, frame.len() - MessageHeader::SIZE);
        // crc matches
        let (header, decoded) = decode_frame(&frame).unwrap();
        assert!(header.verify_checksum(&frame));
        assert_eq!(&decoded[0], message);
    }
}

#[test]
fn single_bit_corruption_anywhere_is_detected() {
    let frame = TlvMessageBuilder::new(RelayDomain::MarketData, 1)
        .with_sequence(9)
        .add(&Message::PoolSync(PoolSyncTlv {
            reserve0: 1_000_000_000_000,
            reserve1: 2_000_000_000_000,
            pool_id: 77,
            block_number: 1,
            reserve0_decimals: 18,
            reserve1_decimals: 6,
        }))
        .build()
        .unwrap();

    for bit in [0usize, 35, 64, frame.len() * 8 - 1] {
        let mut corrupted = frame.clone();
        corrupted[bit / 8] ^= 1 << (bit % 8);
        assert!(
            decode_frame(&corrupted).is_err(),
            "flipping bit {bit} went undetected"
        );
    }
}

#[test]
fn readers_skip_unknown_tlvs_between_known_ones() {
    let trade = TradeTlv {
        instrument_id: 1,
        price: 100_000_000,
        volume: 200_000_000,
        ts_event_ns: 5,
        side: TradeTlv::SIDE_BUY,
        price_decimals: 8,
        volume_decimals: 8,
    };
    let frame = TlvMessageBuilder::new(RelayDomain::MarketData, 1)
        .add(&Message::Unknown {
            tlv_type: 0x0012,
            payload: vec![9; 13],
        })
        .add(&Message::Trade(trade))
        .add(&Message::Unknown {
            tlv_type: 0xFFFF,
            payload: trade.as_bytes().to_vec(),
        })
        .build()
        .unwrap();

    let (_, messages) = decode_frame(&frame).unwrap();
    assert_eq!(messages.len(), 3);
    assert!(matches!(messages[0], Message::Unknown { tlv_type: 0x0012, .. }));
    assert_eq!(messages[1], Message::Trade(trade));
    // Experimental type with a trade-shaped body stays opaque.
    assert!(matches!(messages[2], Message::Unknown { tlv_type: 0xFFFF, .. }));
}

#[test]
fn sequence_continuity_across_a_stream_with_reset() {
    let mut tracker = SequenceTracker::new();
    let source = SourceType::PolygonAdapter as u8;
    let domain = RelayDomain::MarketData as u8;

    for seq in 0..100u64 {
        let check = tracker.observe(source, domain, seq);
        if seq == 0 {
            assert_eq!(check, SequenceCheck::First);
        } else {
            assert_eq!(check, SequenceCheck::InOrder);
        }
    }

    // Source restarts and announces the new base.
    tracker.reset(source, domain, 0);
    assert_eq!(tracker.observe(source, domain, 0), SequenceCheck::InOrder);
    assert_eq!(tracker.observe(source, domain, 1), SequenceCheck::InOrder);
}
