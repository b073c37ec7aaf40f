//! EVM log decoding for the supported DEX event shapes
//!
//! Amounts come off the wire as 256-bit words and stay integers the whole
//! way; nothing here ever rounds. A log whose topic matches but whose body
//! fails to decode is reported as an error and dropped by the caller; one
//! malformed event never resets the stream.

use crate::constants::*;
use adapter_service::{AdapterError, AdapterResult};
use ethabi::{decode, ParamType, Token};
use ethers_core::types::U256;

/// A raw EVM log as delivered by `eth_subscribe("logs")`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLog {
    pub address: [u8; 20],
    pub topics: Vec<[u8; 32]>,
    pub data: Vec<u8>,
    pub tx_hash: [u8; 32],
    pub log_index: u64,
    pub block_number: u64,
}

/// Decoded DEX event, still at raw integer precision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DexEvent {
    V2Swap {
        amount0_in: U256,
        amount1_in: U256,
        amount0_out: U256,
        amount1_out: U256,
    },
    V2Sync {
        reserve0: U256,
        reserve1: U256,
    },
    V2Mint {
        amount0: U256,
        amount1: U256,
    },
    V2Burn {
        amount0: U256,
        amount1: U256,
    },
    V3Swap {
        amount0: i128,
        amount1: i128,
        sqrt_price_x96: U256,
        liquidity: u128,
        tick: i32,
    },
    V3Mint {
        tick_lower: i32,
        tick_upper: i32,
        liquidity: u128,
        amount0: U256,
        amount1: U256,
    },
    V3Burn {
        tick_lower: i32,
        tick_upper: i32,
        liquidity: u128,
        amount0: U256,
        amount1: U256,
    },
}

/// Decode a log into a DEX event; `None` for topics we do not monitor.
pub fn decode_event(log: &RawLog) -> AdapterResult<Option<DexEvent>> {
    let Some(topic0) = log.topics.first() else {
        return Ok(None);
    };

    if topic0 == &*V2_SWAP_TOPIC {
        let tokens = decode_data(
            &[
                ParamType::Uint(256),
                ParamType::Uint(256),
                ParamType::Uint(256),
                ParamType::Uint(256),
            ],
            &log.data,
            "V2 Swap",
        )?;
        Ok(Some(DexEvent::V2Swap {
            amount0_in: uint(&tokens[0], "V2 Swap amount0In")?,
            amount1_in: uint(&tokens[1], "V2 Swap amount1In")?,
            amount0_out: uint(&tokens[2], "V2 Swap amount0Out")?,
            amount1_out: uint(&tokens[3], "V2 Swap amount1Out")?,
        }))
    } else if topic0 == &*V2_SYNC_TOPIC {
        let tokens = decode_data(
            &[ParamType::Uint(112), ParamType::Uint(112)],
            &log.data,
            "V2 Sync",
        )?;
        Ok(Some(DexEvent::V2Sync {
            reserve0: uint(&tokens[0], "V2 Sync reserve0")?,
            reserve1: uint(&tokens[1], "V2 Sync reserve1")?,
        }))
    } else if topic0 == &*V2_MINT_TOPIC {
        let tokens = decode_data(
            &[ParamType::Uint(256), ParamType::Uint(256)],
            &log.data,
            "V2 Mint",
        )?;
        Ok(Some(DexEvent::V2Mint {
            amount0: uint(&tokens[0], "V2 Mint amount0")?,
            amount1: uint(&tokens[1], "V2 Mint amount1")?,
        }))
    } else if topic0 == &*V2_BURN_TOPIC {
        let tokens = decode_data(
            &[ParamType::Uint(256), ParamType::Uint(256)],
            &log.data,
            "V2 Burn",
        )?;
        Ok(Some(DexEvent::V2Burn {
            amount0: uint(&tokens[0], "V2 Burn amount0")?,
            amount1: uint(&tokens[1], "V2 Burn amount1")?,
        }))
    } else if topic0 == &*V3_SWAP_TOPIC {
        let tokens = decode_data(
            &[
                ParamType::Int(256),
                ParamType::Int(256),
                ParamType::Uint(160),
                ParamType::Uint(128),
                ParamType::Int(24),
            ],
            &log.data,
            "V3 Swap",
        )?;
        Ok(Some(DexEvent::V3Swap {
            amount0: int_to_i128(&tokens[0], "V3 Swap amount0")?,
            amount1: int_to_i128(&tokens[1], "V3 Swap amount1")?,
            sqrt_price_x96: uint(&tokens[2], "V3 Swap sqrtPriceX96")?,
            liquidity: checked_u128(&tokens[3], "V3 Swap liquidity")?,
            tick: int_to_i32_24(&tokens[4], "V3 Swap tick")?,
        }))
    } else if topic0 == &*V3_MINT_TOPIC {
        let (tick_lower, tick_upper) = indexed_tick_range(log, "V3 Mint")?;
        let tokens = decode_data(
            &[
                ParamType::Address,
                ParamType::Uint(128),
                ParamType::Uint(256),
                ParamType::Uint(256),
            ],
            &log.data,
            "V3 Mint",
        )?;
        Ok(Some(DexEvent::V3Mint {
            tick_lower,
            tick_upper,
            liquidity: checked_u128(&tokens[1], "V3 Mint amount")?,
            amount0: uint(&tokens[2], "V3 Mint amount0")?,
            amount1: uint(&tokens[3], "V3 Mint amount1")?,
        }))
    } else if topic0 == &*V3_BURN_TOPIC {
        let (tick_lower, tick_upper) = indexed_tick_range(log, "V3 Burn")?;
        let tokens = decode_data(
            &[
                ParamType::Uint(128),
                ParamType::Uint(256),
                ParamType::Uint(256),
            ],
            &log.data,
            "V3 Burn",
        )?;
        Ok(Some(DexEvent::V3Burn {
            tick_lower,
            tick_upper,
            liquidity: checked_u128(&tokens[0], "V3 Burn amount")?,
            amount0: uint(&tokens[1], "V3 Burn amount0")?,
            amount1: uint(&tokens[2], "V3 Burn amount1")?,
        }))
    } else {
        Ok(None)
    }
}

/// Checked narrowing; any real token amount fits, so `None` flags a
/// corrupt log rather than a legitimate value.
pub fn u256_to_u128(value: &U256) -> Option<u128> {
    if *value > U256::from(u128::MAX) {
        None
    } else {
        Some(value.as_u128())
    }
}

impl DexEvent {
    /// Oriented (amount_in, amount_out, token_in_is_token0) for swaps.
    pub fn swap_direction(&self) -> Option<(u128, u128, bool)> {
        match self {
            DexEvent::V2Swap {
                amount0_in,
                amount1_in,
                amount0_out,
                amount1_out,
            } => {
                if amount0_in > &U256::zero() {
                    Some((u256_to_u128(amount0_in)?, u256_to_u128(amount1_out)?, true))
                } else if amount1_in > &U256::zero() {
                    Some((u256_to_u128(amount1_in)?, u256_to_u128(amount0_out)?, false))
                } else {
                    None
                }
            }
            DexEvent::V3Swap { amount0, amount1, .. } => {
                // Positive amounts flow into the pool.
                if *amount0 > 0 {
                    Some((
                        amount0.unsigned_abs(),
                        amount1.unsigned_abs(),
                        true,
                    ))
                } else if *amount1 > 0 {
                    Some((
                        amount1.unsigned_abs(),
                        amount0.unsigned_abs(),
                        false,
                    ))
                } else {
                    None
                }
            }
            _ => None,
        }
    }
}

fn decode_data(
    params: &[ParamType],
    data: &[u8],
    kind: &'static str,
) -> AdapterResult<Vec<Token>> {
    decode(params, data).map_err(|e| AdapterError::DecodeError {
        reason: format!("{kind}: {e}"),
    })
}

fn checked_u128(token: &Token, what: &'static str) -> AdapterResult<u128> {
    let value = uint(token, what)?;
    u256_to_u128(&value).ok_or_else(|| AdapterError::DecodeError {
        reason: format!("{what}: magnitude exceeds 128 bits"),
    })
}

fn uint(token: &Token, what: &'static str) -> AdapterResult<U256> {
    match token {
        Token::Uint(value) => Ok(U256::from_big_endian(&{
            let mut buf = [0u8; 32];
            value.to_big_endian(&mut buf);
            buf
        })),
        _ => Err(AdapterError::DecodeError {
            reason: format!("{what}: expected uint"),
        }),
    }
}

/// Two's-complement int256 word → i128; amounts past i128 are implausible
/// for any real token and rejected.
fn int_to_i128(token: &Token, what: &'static str) -> AdapterResult<i128> {
    let Token::Int(value) = token else {
        return Err(AdapterError::DecodeError {
            reason: format!("{what}: expected int"),
        });
    };
    let mut buf = [0u8; 32];
    value.to_big_endian(&mut buf);
    let negative = buf[0] & 0x80 != 0;
    if negative {
        // -x = !x + 1 over the full word
        let mut inverted = [0u8; 32];
        for (i, b) in buf.iter().enumerate() {
            inverted[i] = !b;
        }
        let magnitude = U256::from_big_endian(&inverted) + U256::one();
        if magnitude > U256::from(i128::MAX as u128) + U256::one() {
            return Err(AdapterError::DecodeError {
                reason: format!("{what}: magnitude exceeds 128 bits"),
            });
        }
        Ok((magnitude.as_u128() as i128).wrapping_neg())
    } else {
        let magnitude = U256::from_big_endian(&buf);
        if magnitude > U256::from(i128::MAX as u128) {
            return Err(AdapterError::DecodeError {
                reason: format!("{what}: magnitude exceeds 128 bits"),
            });
        }
        Ok(magnitude.as_u128() as i128)
    }
}

/// int24 packed in a 32-byte word → i32 with sign extension.
fn int_to_i32_24(token: &Token, what: &'static str) -> AdapterResult<i32> {
    let Token::Int(value) = token else {
        return Err(AdapterError::DecodeError {
            reason: format!("{what}: expected int24"),
        });
    };
    let mut buf = [0u8; 32];
    value.to_big_endian(&mut buf);
    Ok(sign_extend_24(&buf))
}

/// Indexed int24 tick bounds from topics[2] and topics[3].
fn indexed_tick_range(log: &RawLog, kind: &'static str) -> AdapterResult<(i32, i32)> {
    if log.topics.len() < 4 {
        return Err(AdapterError::DecodeError {
            reason: format!("{kind}: missing indexed tick topics"),
        });
    }
    Ok((sign_extend_24(&log.topics[2]), sign_extend_24(&log.topics[3])))
}

fn sign_extend_24(word: &[u8; 32]) -> i32 {
    let raw = u32::from_be_bytes([word[28], word[29], word[30], word[31]]);
    ((raw << 8) as i32) >> 8
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word_u256(value: U256) -> [u8; 32] {
        let mut buf = [0u8; 32];
        value.to_big_endian(&mut buf);
        buf
    }

    fn word_i32(value: i32) -> [u8; 32] {
        let mut buf = [0xFFu8; 32];
        if value >= 0 {
            buf = [0u8; 32];
        }
        buf[28..].copy_from_slice(&(value as u32).to_be_bytes());
        buf
    }

    fn raw_log(topics: Vec<[u8; 32]>, data: Vec<u8>) -> RawLog {
        RawLog {
            address: [0x11; 20],
            topics,
            data,
            tx_hash: [0x22; 32],
            log_index: 1,
            block_number: 52_000_000,
        }
    }

    #[test]
    fn decodes_v2_swap_and_orients_direction() {
        let mut data = Vec::new();
        // amount0In = 0, amount1In = 500, amount0Out = 999, amount1Out = 0
        for value in [0u64, 500, 999, 0] {
            data.extend_from_slice(&word_u256(U256::from(value)));
        }
        let log = raw_log(vec![*V2_SWAP_TOPIC, [0; 32], [0; 32]], data);

        let event = decode_event(&log).unwrap().unwrap();
        let (amount_in, amount_out, token_in_is_token0) = event.swap_direction().unwrap();
        assert_eq!(amount_in, 500);
        assert_eq!(amount_out, 999);
        assert!(!token_in_is_token0);
    }

    #[test]
    fn decodes_v2_sync() {
        let mut data = Vec::new();
        data.extend_from_slice(&word_u256(U256::from(1_000_000u64)));
        data.extend_from_slice(&word_u256(U256::from(2_000_000u64)));
        let log = raw_log(vec![*V2_SYNC_TOPIC], data);

        assert_eq!(
            decode_event(&log).unwrap().unwrap(),
            DexEvent::V2Sync {
                reserve0: U256::from(1_000_000u64),
                reserve1: U256::from(2_000_000u64),
            }
        );
    }

    #[test]
    fn decodes_v3_swap_with_negative_amount_and_tick() {
        let mut data = Vec::new();
        // amount0 = +1e18 in, amount1 = -5e8 out
        data.extend_from_slice(&word_u256(U256::from(10u128.pow(18))));
        let negative = {
            let mut buf = [0xFFu8; 32];
            let magnitude = U256::from(500_000_000u64);
            let twos = U256::MAX - magnitude + U256::one();
            twos.to_big_endian(&mut buf);
            buf
        };
        data.extend_from_slice(&negative);
        data.extend_from_slice(&word_u256(U256::from(79228162514264337593543950336u128)));
        data.extend_from_slice(&word_u256(U256::from(10u128.pow(20))));
        data.extend_from_slice(&word_i32(-202_500));
        let log = raw_log(vec![*V3_SWAP_TOPIC, [0; 32], [0; 32]], data);

        let DexEvent::V3Swap {
            amount0,
            amount1,
            sqrt_price_x96,
            liquidity,
            tick,
        } = decode_event(&log).unwrap().unwrap()
        else {
            panic!("wrong event kind");
        };
        assert_eq!(amount0, 10i128.pow(18));
        assert_eq!(amount1, -500_000_000);
        assert_eq!(sqrt_price_x96, U256::from(79228162514264337593543950336u128));
        assert_eq!(liquidity, 10u128.pow(20));
        assert_eq!(tick, -202_500);

        let (amount_in, amount_out, token_in_is_token0) =
            DexEvent::V3Swap {
                amount0,
                amount1,
                sqrt_price_x96,
                liquidity,
                tick,
            }
            .swap_direction()
            .unwrap();
        assert_eq!(amount_in, 10u128.pow(18));
        assert_eq!(amount_out, 500_000_000);
        assert!(token_in_is_token0);
    }

    #[test]
    fn decodes_v3_mint_tick_range_from_topics() {
        let mut data = Vec::new();
        data.extend_from_slice(&[0u8; 32]); // sender address word
        data.extend_from_slice(&word_u256(U256::from(7_000u64))); // liquidity
        data.extend_from_slice(&word_u256(U256::from(100u64)));
        data.extend_from_slice(&word_u256(U256::from(200u64)));
        let log = raw_log(
            vec![*V3_MINT_TOPIC, [0; 32], word_i32(-60), word_i32(60)],
            data,
        );

        let DexEvent::V3Mint {
            tick_lower,
            tick_upper,
            liquidity,
            ..
        } = decode_event(&log).unwrap().unwrap()
        else {
            panic!("wrong event kind");
        };
        assert_eq!((tick_lower, tick_upper), (-60, 60));
        assert_eq!(liquidity, 7_000);
    }

    #[test]
    fn unmonitored_topics_are_ignored() {
        let log = raw_log(vec![[0xAB; 32]], vec![]);
        assert_eq!(decode_event(&log).unwrap(), None);
    }

    #[test]
    fn malformed_body_is_a_decode_error() {
        // V2 Sync with a truncated body.
        let log = raw_log(vec![*V2_SYNC_TOPIC], vec![0u8; 16]);
        assert!(matches!(
            decode_event(&log),
            Err(AdapterError::DecodeError { .. })
        ));
    }

    #[test]
    fn decoding_is_deterministic() {
        let mut data = Vec::new();
        for value in [123u64, 0, 0, 456] {
            data.extend_from_slice(&word_u256(U256::from(value)));
        }
        let log = raw_log(vec![*V2_SWAP_TOPIC, [1; 32], [2; 32]], data);
        assert_eq!(decode_event(&log).unwrap(), decode_event(&log).unwrap());
    }
}
