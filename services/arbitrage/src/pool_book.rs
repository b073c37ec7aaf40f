//! Live pool-state view built from the MarketData stream
//!
//! Single-writer: only the detector process mutates the book, and never
//! across an await point. Pools are indexed by instrument id and by their
//! unordered token-pair key so candidate lookup on update is O(pools in
//! pair).

use amm::tick_math::q96;
use amm::V3PoolMath;
use codec::payloads::{PoolProtocol, PoolStateTlv};
use codec::Message;
use ethers_core::types::{U256, U512};
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};
use types::InstrumentId;

/// Unordered token-pair key.
pub type PairKey = (InstrumentId, InstrumentId);

fn pair_key(a: InstrumentId, b: InstrumentId) -> PairKey {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Latest known state of one pool.
#[derive(Debug, Clone)]
pub struct PoolEntry {
    pub pool_id: InstrumentId,
    pub token0_id: InstrumentId,
    pub token1_id: InstrumentId,
    pub token0_decimals: u8,
    pub token1_decimals: u8,
    /// Fee in pips for both protocols.
    pub fee_pips: u32,
    pub protocol: PoolProtocol,
    /// V2 reserves at native decimals; zero for V3.
    pub reserve0: u128,
    pub reserve1: u128,
    /// V3 state including the learned tick map; `None` for V2.
    pub v3: Option<V3PoolMath>,
    pub last_update_ns: u64,
}

impl PoolEntry {
    fn from_state(state: &PoolStateTlv, now_ns: u64, previous: Option<&PoolEntry>) -> Option<Self> {
        let protocol = state.pool_protocol()?;
        let v3 = match protocol {
            PoolProtocol::V2 => None,
            PoolProtocol::V3 => {
                let sqrt_price = U256::from_little_endian(&state.sqrt_price_x96);
                let mut pool = V3PoolMath::new(
                    sqrt_price,
                    state.liquidity,
                    state.tick,
                    state.fee_pips,
                    state.tick_spacing,
                )
                .ok()?;
                // The tick map is learned from mint/burn events; a fresh
                // snapshot replaces price and liquidity but keeps it.
                if let Some(PoolEntry { v3: Some(old), .. }) = previous {
                    pool.ticks = old.ticks.clone();
                }
                Some(pool)
            }
        };
        Some(Self {
            pool_id: state.pool(),
            token0_id: InstrumentId::from_u64(state.token0_id),
            token1_id: InstrumentId::from_u64(state.token1_id),
            token0_decimals: state.token0_decimals,
            token1_decimals: state.token1_decimals,
            fee_pips: state.fee_pips,
            protocol,
            reserve0: state.reserve0,
            reserve1: state.reserve1,
            v3,
            last_update_ns: now_ns,
        })
    }

    /// Pool fee in basis points.
    pub fn fee_bps(&self) -> u32 {
        self.fee_pips / 100
    }

    /// Marginal price of token0 in token1 units, as an exact ratio
    /// (numerator, denominator) in raw on-chain units.
    pub fn price_ratio(&self) -> Option<(U256, U256)> {
        match self.protocol {
            PoolProtocol::V2 => {
                if self.reserve0 == 0 || self.reserve1 == 0 {
                    return None;
                }
                Some((U256::from(self.reserve1), U256::from(self.reserve0)))
            }
            PoolProtocol::V3 => {
                let v3 = self.v3.as_ref()?;
                if v3.sqrt_price_x96.is_zero() {
                    return None;
                }
                // price = sqrtP^2 / 2^192; keep it as a U256 ratio by
                // splitting the shift across both sides.
                let squared = v3.sqrt_price_x96.full_mul(v3.sqrt_price_x96);
                let numerator = U256::try_from(squared >> 96).ok()?;
                Some((numerator, q96()))
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct PoolBook {
    pools: HashMap<InstrumentId, PoolEntry>,
    pairs: HashMap<PairKey, HashSet<InstrumentId>>,
}

impl PoolBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one market-data message. Returns the updated pool id when the
    /// update changed tradeable state (and thus warrants a detection pass).
    pub fn apply(&mut self, message: &Message, now_ns: u64) -> Option<InstrumentId> {
        match message {
            Message::PoolState(state) => {
                let id = state.pool();
                let previous = self.pools.get(&id);
                match PoolEntry::from_state(state, now_ns, previous) {
                    Some(entry) => {
                        self.pairs
                            .entry(pair_key(entry.token0_id, entry.token1_id))
                            .or_default()
                            .insert(id);
                        self.pools.insert(id, entry);
                        Some(id)
                    }
                    None => {
                        warn!(pool = %id, "unusable pool state snapshot dropped");
                        None
                    }
                }
            }
            Message::PoolSync(sync) => {
                let entry = self.pools.get_mut(&sync.pool())?;
                if sync.reserve0 == 0 || sync.reserve1 == 0 {
                    warn!(pool = %entry.pool_id, "sync with empty reserve dropped");
                    return None;
                }
                entry.reserve0 = sync.reserve0;
                entry.reserve1 = sync.reserve1;
                entry.last_update_ns = now_ns;
                Some(entry.pool_id)
            }
            Message::PoolSwap(swap) => {
                let entry = self.pools.get_mut(&swap.pool())?;
                entry.last_update_ns = now_ns;
                if let Some(v3) = entry.v3.as_mut() {
                    let sqrt_price = U256::from_little_endian(&swap.sqrt_price_x96_after);
                    if !sqrt_price.is_zero() {
                        v3.sqrt_price_x96 = sqrt_price;
                        v3.tick = swap.tick_after;
                    }
                }
                Some(entry.pool_id)
            }
            Message::PoolMint(mint) => {
                let entry = self.pools.get_mut(&mint.pool())?;
                entry.last_update_ns = now_ns;
                if let Some(v3) = entry.v3.as_mut() {
                    if mint.liquidity_delta > 0 {
                        v3.apply_mint(mint.tick_lower, mint.tick_upper, mint.liquidity_delta);
                    }
                }
                None
            }
            Message::PoolBurn(burn) => {
                let entry = self.pools.get_mut(&burn.pool())?;
                entry.last_update_ns = now_ns;
                if let Some(v3) = entry.v3.as_mut() {
                    if burn.liquidity_delta > 0 {
                        v3.apply_burn(burn.tick_lower, burn.tick_upper, burn.liquidity_delta);
                    }
                }
                None
            }
            _ => None,
        }
    }

    pub fn get(&self, id: InstrumentId) -> Option<&PoolEntry> {
        self.pools.get(&id)
    }

    /// Other pools trading the same unordered token pair.
    pub fn candidates(&self, pool_id: InstrumentId) -> Vec<InstrumentId> {
        let Some(entry) = self.pools.get(&pool_id) else {
            return Vec::new();
        };
        let key = pair_key(entry.token0_id, entry.token1_id);
        match self.pairs.get(&key) {
            Some(ids) => ids.iter().copied().filter(|id| *id != pool_id).collect(),
            None => Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.pools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }

    /// Pool removal (rare; adapter-signalled).
    pub fn remove(&mut self, pool_id: InstrumentId) {
        if let Some(entry) = self.pools.remove(&pool_id) {
            let key = pair_key(entry.token0_id, entry.token1_id);
            if let Some(ids) = self.pairs.get_mut(&key) {
                ids.remove(&pool_id);
                if ids.is_empty() {
                    self.pairs.remove(&key);
                }
            }
            debug!(pool = %pool_id, "pool removed from book");
        }
    }
}

/// Ratio comparison helper: spread of the pricier ratio over the cheaper
/// one, in basis points, computed exactly in 512-bit intermediates.
pub fn spread_bps(a: (U256, U256), b: (U256, U256)) -> Option<u32> {
    let (na, da) = a;
    let (nb, db) = b;
    if da.is_zero() || db.is_zero() {
        return None;
    }
    let lhs = na.full_mul(db);
    let rhs = nb.full_mul(da);
    let (high, low) = if lhs >= rhs { (lhs, rhs) } else { (rhs, lhs) };
    if low.is_zero() {
        return None;
    }
    let diff = high - low;
    // diff fits 2^512 only if inputs were enormous; saturate to a cap the
    // prefilter treats as "absurd spread".
    let scaled = diff.checked_mul(U512::from(10_000u64))? / low;
    Some(U256::try_from(scaled).map(|v| v.low_u32()).unwrap_or(u32::MAX))
}

#[cfg(test)]
mod tests {
    use super::*;
    use zerocopy::FromZeroes;

    fn v2_state(pool: &str, reserve0: u128, reserve1: u128) -> PoolStateTlv {
        let mut state = PoolStateTlv::new_zeroed();
        state.pool_id = InstrumentId::from_descriptor(pool).to_u64();
        state.token0_id = InstrumentId::from_descriptor("token:137:0xaaa").to_u64();
        state.token1_id = InstrumentId::from_descriptor("token:137:0xbbb").to_u64();
        state.protocol = PoolProtocol::V2 as u8;
        state.reserve0 = reserve0;
        state.reserve1 = reserve1;
        state.fee_pips = 3000;
        state.token0_decimals = 18;
        state.token1_decimals = 6;
        state
    }

    #[test]
    fn state_then_sync_updates_reserves() {
        let mut book = PoolBook::new();
        let id = book
            .apply(&Message::PoolState(v2_state("pool-a", 1_000, 2_000)), 1)
            .unwrap();

        let mut sync = codec::payloads::PoolSyncTlv::new_zeroed();
        sync.pool_id = id.to_u64();
        sync.reserve0 = 1_100;
        sync.reserve1 = 1_900;
        assert_eq!(book.apply(&Message::PoolSync(sync), 2), Some(id));

        let entry = book.get(id).unwrap();
        assert_eq!(entry.reserve0, 1_100);
        assert_eq!(entry.reserve1, 1_900);
        assert_eq!(entry.last_update_ns, 2);
    }

    #[test]
    fn sync_for_unknown_pool_is_ignored() {
        let mut book = PoolBook::new();
        let mut sync = codec::payloads::PoolSyncTlv::new_zeroed();
        sync.pool_id = 42;
        sync.reserve0 = 1;
        sync.reserve1 = 1;
        assert_eq!(book.apply(&Message::PoolSync(sync), 1), None);
    }

    #[test]
    fn empty_reserve_sync_is_refused() {
        let mut book = PoolBook::new();
        let id = book
            .apply(&Message::PoolState(v2_state("pool-a", 1_000, 2_000)), 1)
            .unwrap();
        let mut sync = codec::payloads::PoolSyncTlv::new_zeroed();
        sync.pool_id = id.to_u64();
        sync.reserve0 = 0;
        sync.reserve1 = 5;
        assert_eq!(book.apply(&Message::PoolSync(sync), 2), None);
        // State unchanged.
        assert_eq!(book.get(id).unwrap().reserve0, 1_000);
    }

    #[test]
    fn candidates_share_the_token_pair() {
        let mut book = PoolBook::new();
        let a = book
            .apply(&Message::PoolState(v2_state("pool-a", 1_000, 2_000)), 1)
            .unwrap();
        let b = book
            .apply(&Message::PoolState(v2_state("pool-b", 1_000, 2_004)), 1)
            .unwrap();

        // A third pool on a different pair.
        let mut other = v2_state("pool-c", 10, 20);
        other.token1_id = InstrumentId::from_descriptor("token:137:0xccc").to_u64();
        book.apply(&Message::PoolState(other), 1).unwrap();

        assert_eq!(book.candidates(a), vec![b]);
        assert_eq!(book.candidates(b), vec![a]);
        assert_eq!(book.len(), 3);
    }

    #[test]
    fn removal_unindexes_the_pool() {
        let mut book = PoolBook::new();
        let a = book
            .apply(&Message::PoolState(v2_state("pool-a", 1_000, 2_000)), 1)
            .unwrap();
        let b = book
            .apply(&Message::PoolState(v2_state("pool-b", 1_000, 2_004)), 1)
            .unwrap();
        book.remove(b);
        assert!(book.candidates(a).is_empty());
    }

    #[test]
    fn spread_calculation_in_bps() {
        // Prices 1.000 vs 1.002 → 20 bps.
        let a = (U256::from(1_000u64), U256::from(1_000u64));
        let b = (U256::from(1_002u64), U256::from(1_000u64));
        assert_eq!(spread_bps(a, b), Some(20));
        // Symmetric.
        assert_eq!(spread_bps(b, a), Some(20));
        // Identical prices → zero spread.
        assert_eq!(spread_bps(a, a), Some(0));
    }

    #[test]
    fn v2_price_ratio_is_reserve_ratio() {
        let mut book = PoolBook::new();
        let id = book
            .apply(&Message::PoolState(v2_state("pool-a", 4_000, 2_000)), 1)
            .unwrap();
        let (n, d) = book.get(id).unwrap().price_ratio().unwrap();
        assert_eq!((n, d), (U256::from(2_000u64), U256::from(4_000u64)));
    }
}
