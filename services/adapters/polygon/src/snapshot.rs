//! Pool state snapshots over HTTP RPC
//!
//! On connect (and on every reconnect) each watched pool is snapshotted
//! with `eth_call` before any incremental event for it is emitted: V2 pools
//! via `getReserves`/`token0`/`token1`, V3 pools via `slot0`/`liquidity`/
//! `fee`/`tickSpacing`. Token decimals are fetched once per token and
//! cached for the process lifetime.

use adapter_service::{AdapterError, AdapterResult};
use codec::payloads::PoolProtocol;
use std::collections::HashMap;
use web3::transports::Http;
use web3::types::{BlockNumber, CallRequest, FilterBuilder, H160, U256 as RpcU256};

/// Everything the pipeline needs to know about one pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolSnapshot {
    pub protocol: PoolProtocol,
    pub token0: [u8; 20],
    pub token1: [u8; 20],
    pub token0_decimals: u8,
    pub token1_decimals: u8,
    /// Fee in pips for both protocols (V2 pairs are fixed 0.30%).
    pub fee_pips: u32,
    pub tick_spacing: i32,
    pub reserve0: u128,
    pub reserve1: u128,
    /// Little-endian, zero-extended from 160 bits; zero for V2.
    pub sqrt_price_x96: [u8; 32],
    pub liquidity: u128,
    pub tick: i32,
}

pub struct SnapshotClient {
    web3: web3::Web3<Http>,
    decimals_cache: HashMap<[u8; 20], u8>,
}

impl SnapshotClient {
    pub fn new(http_url: &str) -> AdapterResult<Self> {
        let transport = Http::new(http_url).map_err(|e| AdapterError::ConnectionFailed {
            endpoint: http_url.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            web3: web3::Web3::new(transport),
            decimals_cache: HashMap::new(),
        })
    }

    /// Full snapshot of a pool, detecting its protocol by probing `slot0`.
    pub async fn pool_snapshot(&mut self, pool: [u8; 20]) -> AdapterResult<PoolSnapshot> {
        let token0 = self.call_address(pool, *crate::constants::SEL_TOKEN0, "token0").await?;
        let token1 = self.call_address(pool, *crate::constants::SEL_TOKEN1, "token1").await?;
        let token0_decimals = self.token_decimals(token0).await?;
        let token1_decimals = self.token_decimals(token1).await?;

        // V3 pools answer slot0; V2 pairs revert on it.
        match self.call(pool, *crate::constants::SEL_SLOT0, "slot0").await {
            Ok(slot0) if slot0.len() >= 64 => {
                let sqrt_price = word_at(&slot0, 0)?;
                let tick = sign_extended_i32(&word_at(&slot0, 1)?);

                let liquidity_raw =
                    self.call(pool, *crate::constants::SEL_LIQUIDITY, "liquidity").await?;
                let fee_raw = self.call(pool, *crate::constants::SEL_FEE, "fee").await?;
                let spacing_raw = self
                    .call(pool, *crate::constants::SEL_TICK_SPACING, "tickSpacing")
                    .await?;

                Ok(PoolSnapshot {
                    protocol: PoolProtocol::V3,
                    token0,
                    token1,
                    token0_decimals,
                    token1_decimals,
                    fee_pips: word_to_u128(&word_at(&fee_raw, 0)?) as u32,
                    tick_spacing: sign_extended_i32(&word_at(&spacing_raw, 0)?),
                    reserve0: 0,
                    reserve1: 0,
                    sqrt_price_x96: big_endian_word_to_le(&sqrt_price),
                    liquidity: word_to_u128(&word_at(&liquidity_raw, 0)?),
                    tick,
                })
            }
            _ => {
                let reserves = self
                    .call(pool, *crate::constants::SEL_GET_RESERVES, "getReserves")
                    .await?;
                if reserves.len() < 64 {
                    return Err(AdapterError::RpcError {
                        call: "getReserves",
                        reason: format!("short response of {} bytes", reserves.len()),
                    });
                }
                Ok(PoolSnapshot {
                    protocol: PoolProtocol::V2,
                    token0,
                    token1,
                    token0_decimals,
                    token1_decimals,
                    fee_pips: 3000,
                    tick_spacing: 0,
                    reserve0: word_to_u128(&word_at(&reserves, 0)?),
                    reserve1: word_to_u128(&word_at(&reserves, 1)?),
                    sqrt_price_x96: [0u8; 32],
                    liquidity: 0,
                    tick: 0,
                })
            }
        }
    }

    /// Current network gas price in wei.
    pub async fn gas_price(&self) -> AdapterResult<u128> {
        let price: RpcU256 =
            self.web3.eth().gas_price().await.map_err(|e| AdapterError::RpcError {
                call: "eth_gasPrice",
                reason: e.to_string(),
            })?;
        Ok(price.as_u128())
    }

    /// Latest block number, recorded before snapshotting so the log
    /// backfill can cover the gap up to the live subscription.
    pub async fn block_number(&self) -> AdapterResult<u64> {
        let number = self.web3.eth().block_number().await.map_err(|e| {
            AdapterError::RpcError {
                call: "eth_blockNumber",
                reason: e.to_string(),
            }
        })?;
        Ok(number.as_u64())
    }

    /// Historical logs for the watched addresses via `eth_getLogs`.
    pub async fn backfill_logs(
        &self,
        addresses: &[[u8; 20]],
        from_block: u64,
    ) -> AdapterResult<Vec<crate::abi::RawLog>> {
        let filter = FilterBuilder::default()
            .address(addresses.iter().map(|a| H160::from(*a)).collect())
            .from_block(BlockNumber::Number(from_block.into()))
            .to_block(BlockNumber::Latest)
            .build();
        let logs = self.web3.eth().logs(filter).await.map_err(|e| {
            AdapterError::RpcError {
                call: "eth_getLogs",
                reason: e.to_string(),
            }
        })?;

        let mut raw = Vec::with_capacity(logs.len());
        for log in logs {
            // Pending logs carry no tx hash; skip them rather than guess.
            let (Some(tx_hash), Some(log_index), Some(block_number)) =
                (log.transaction_hash, log.log_index, log.block_number)
            else {
                continue;
            };
            raw.push(crate::abi::RawLog {
                address: log.address.0,
                topics: log.topics.iter().map(|t| t.0).collect(),
                data: log.data.0,
                tx_hash: tx_hash.0,
                log_index: log_index.as_u64(),
                block_number: block_number.as_u64(),
            });
        }
        Ok(raw)
    }

    async fn token_decimals(&mut self, token: [u8; 20]) -> AdapterResult<u8> {
        if let Some(&decimals) = self.decimals_cache.get(&token) {
            return Ok(decimals);
        }
        let raw = self.call(token, *crate::constants::SEL_DECIMALS, "decimals").await?;
        let decimals = word_to_u128(&word_at(&raw, 0)?) as u8;
        self.decimals_cache.insert(token, decimals);
        Ok(decimals)
    }

    async fn call(
        &self,
        to: [u8; 20],
        selector: [u8; 4],
        call: &'static str,
    ) -> AdapterResult<Vec<u8>> {
        let request = CallRequest::builder()
            .to(H160::from(to))
            .data(selector.to_vec().into())
            .build();
        let result = self
            .web3
            .eth()
            .call(request, Some(BlockNumber::Latest.into()))
            .await
            .map_err(|e| AdapterError::RpcError {
                call,
                reason: e.to_string(),
            })?;
        Ok(result.0)
    }

    async fn call_address(
        &self,
        to: [u8; 20],
        selector: [u8; 4],
        call: &'static str,
    ) -> AdapterResult<[u8; 20]> {
        let raw = self.call(to, selector, call).await?;
        let word = word_at(&raw, 0)?;
        let mut address = [0u8; 20];
        address.copy_from_slice(&word[12..]);
        Ok(address)
    }
}

fn word_at(data: &[u8], index: usize) -> AdapterResult<[u8; 32]> {
    let start = index * 32;
    let end = start + 32;
    if data.len() < end {
        return Err(AdapterError::RpcError {
            call: "eth_call",
            reason: format!("response shorter than word {index}"),
        });
    }
    let mut word = [0u8; 32];
    word.copy_from_slice(&data[start..end]);
    Ok(word)
}

fn word_to_u128(word: &[u8; 32]) -> u128 {
    let mut buf = [0u8; 16];
    buf.copy_from_slice(&word[16..]);
    u128::from_be_bytes(buf)
}

fn sign_extended_i32(word: &[u8; 32]) -> i32 {
    let raw = u32::from_be_bytes([word[28], word[29], word[30], word[31]]);
    ((raw << 8) as i32) >> 8
}

fn big_endian_word_to_le(word: &[u8; 32]) -> [u8; 32] {
    let mut le = *word;
    le.reverse();
    le
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn word_extraction() {
        let mut data = vec![0u8; 64];
        data[31] = 0x2A;
        data[63] = 0x07;
        assert_eq!(word_to_u128(&word_at(&data, 0).unwrap()), 42);
        assert_eq!(word_to_u128(&word_at(&data, 1).unwrap()), 7);
        assert!(word_at(&data, 2).is_err());
    }

    #[test]
    fn negative_tick_sign_extension() {
        let mut word = [0xFFu8; 32];
        word[28..].copy_from_slice(&(-887_220i32 as u32).to_be_bytes());
        assert_eq!(sign_extended_i32(&word), -887_220);

        let mut positive = [0u8; 32];
        positive[28..].copy_from_slice(&(42i32 as u32).to_be_bytes());
        assert_eq!(sign_extended_i32(&positive), 42);
    }

    #[test]
    fn sqrt_price_byte_order() {
        let mut be = [0u8; 32];
        be[31] = 0x01; // value 1 big-endian
        let le = big_endian_word_to_le(&be);
        assert_eq!(le[0], 0x01);
        assert_eq!(le[31], 0x00);
    }
}
