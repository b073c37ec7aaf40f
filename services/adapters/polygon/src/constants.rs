//! Event signatures and call selectors for the supported DEX ABIs
//!
//! Topic hashes and function selectors are derived from their canonical
//! signature strings at first use, so the strings in this file are the
//! single source of truth.

use once_cell::sync::Lazy;
use sha3::{Digest, Keccak256};

fn event_topic(signature: &str) -> [u8; 32] {
    let digest = Keccak256::digest(signature.as_bytes());
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    out
}

fn selector(signature: &str) -> [u8; 4] {
    let digest = Keccak256::digest(signature.as_bytes());
    let mut out = [0u8; 4];
    out.copy_from_slice(&digest[..4]);
    out
}

// Uniswap V2 pair events.
pub static V2_SWAP_TOPIC: Lazy<[u8; 32]> =
    Lazy::new(|| event_topic("Swap(address,uint256,uint256,uint256,uint256,address)"));
pub static V2_SYNC_TOPIC: Lazy<[u8; 32]> = Lazy::new(|| event_topic("Sync(uint112,uint112)"));
pub static V2_MINT_TOPIC: Lazy<[u8; 32]> =
    Lazy::new(|| event_topic("Mint(address,uint256,uint256)"));
pub static V2_BURN_TOPIC: Lazy<[u8; 32]> =
    Lazy::new(|| event_topic("Burn(address,uint256,uint256,address)"));

// Uniswap V3 pool events.
pub static V3_SWAP_TOPIC: Lazy<[u8; 32]> =
    Lazy::new(|| event_topic("Swap(address,address,int256,int256,uint160,uint128,int24)"));
pub static V3_MINT_TOPIC: Lazy<[u8; 32]> =
    Lazy::new(|| event_topic("Mint(address,address,int24,int24,uint128,uint256,uint256)"));
pub static V3_BURN_TOPIC: Lazy<[u8; 32]> =
    Lazy::new(|| event_topic("Burn(address,int24,int24,uint128,uint256,uint256)"));

/// Every topic the WebSocket subscription filters on.
pub fn monitored_event_topics() -> Vec<[u8; 32]> {
    vec![
        *V2_SWAP_TOPIC,
        *V2_SYNC_TOPIC,
        *V2_MINT_TOPIC,
        *V2_BURN_TOPIC,
        *V3_SWAP_TOPIC,
        *V3_MINT_TOPIC,
        *V3_BURN_TOPIC,
    ]
}

// eth_call selectors for pool snapshots.
pub static SEL_TOKEN0: Lazy<[u8; 4]> = Lazy::new(|| selector("token0()"));
pub static SEL_TOKEN1: Lazy<[u8; 4]> = Lazy::new(|| selector("token1()"));
pub static SEL_GET_RESERVES: Lazy<[u8; 4]> = Lazy::new(|| selector("getReserves()"));
pub static SEL_SLOT0: Lazy<[u8; 4]> = Lazy::new(|| selector("slot0()"));
pub static SEL_LIQUIDITY: Lazy<[u8; 4]> = Lazy::new(|| selector("liquidity()"));
pub static SEL_FEE: Lazy<[u8; 4]> = Lazy::new(|| selector("fee()"));
pub static SEL_TICK_SPACING: Lazy<[u8; 4]> = Lazy::new(|| selector("tickSpacing()"));
pub static SEL_DECIMALS: Lazy<[u8; 4]> = Lazy::new(|| selector("decimals()"));
