//! Zero-copy payload structs for the fixed-size TLV kinds
//!
//! Every struct is `repr(C, packed)` with little-endian integer fields, so
//! its byte image is exactly the wire body with no padding and no alignment
//! requirement (readers must not assume alignment beyond one byte). Token
//! amounts are `u128` at native decimals with explicit `decimals` bytes; USD
//! values are `i64` at 8-decimal fixed point. No floating point anywhere.
//!
//! Reading a field from a packed reference copies it; bind to a local before
//! formatting or taking references.

use types::InstrumentId;
use zerocopy::{AsBytes, FromBytes, FromZeroes};

/// AMM flavor of a pool, carried inside `PoolState`.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolProtocol {
    V2 = 0,
    V3 = 1,
}

impl PoolProtocol {
    pub fn from_u8(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(PoolProtocol::V2),
            1 => Some(PoolProtocol::V3),
            _ => None,
        }
    }
}

/// Trade execution event (type 2). Fixed 43 bytes.
#[repr(C, packed)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, AsBytes, FromBytes, FromZeroes)]
pub struct TradeTlv {
    /// Instrument the trade printed on
    pub instrument_id: u64,
    /// Price, fixed point at `price_decimals`
    pub price: i64,
    /// Size, fixed point at `volume_decimals`
    pub volume: i64,
    /// Venue-side execution time, nanoseconds since epoch
    pub ts_event_ns: u64,
    /// 0 = buy, 1 = sell
    pub side: u8,
    pub price_decimals: u8,
    pub volume_decimals: u8,
}

impl TradeTlv {
    pub const SIDE_BUY: u8 = 0;
    pub const SIDE_SELL: u8 = 1;

    pub fn instrument(&self) -> InstrumentId {
        InstrumentId::from_u64(self.instrument_id)
    }
}

/// DEX swap event (type 3). Fixed 102 bytes.
///
/// `sqrt_price_x96_after` is the post-swap Q64.96 square-root price for V3
/// pools, stored little-endian and zero-extended from 160 bits; all zeros
/// for V2 pools.
#[repr(C, packed)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, AsBytes, FromBytes, FromZeroes)]
pub struct PoolSwapTlv {
    pub amount_in: u128,
    pub amount_out: u128,
    pub pool_id: u64,
    pub token_in_id: u64,
    pub token_out_id: u64,
    pub block_number: u64,
    /// Post-swap tick (V3); 0 for V2
    pub tick_after: i32,
    pub amount_in_decimals: u8,
    pub amount_out_decimals: u8,
    pub sqrt_price_x96_after: [u8; 32],
}

impl PoolSwapTlv {
    pub fn pool(&self) -> InstrumentId {
        InstrumentId::from_u64(self.pool_id)
    }

    /// Encode a 256-bit little-endian sqrt price field from its low 128 bits.
    pub fn sqrt_price_bytes_from_u128(value: u128) -> [u8; 32] {
        let mut out = [0u8; 32];
        out[..16].copy_from_slice(&value.to_le_bytes());
        out
    }
}

/// V2 reserve synchronization (type 4). Fixed 50 bytes.
#[repr(C, packed)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, AsBytes, FromBytes, FromZeroes)]
pub struct PoolSyncTlv {
    pub reserve0: u128,
    pub reserve1: u128,
    pub pool_id: u64,
    pub block_number: u64,
    pub reserve0_decimals: u8,
    pub reserve1_decimals: u8,
}

impl PoolSyncTlv {
    pub fn pool(&self) -> InstrumentId {
        InstrumentId::from_u64(self.pool_id)
    }
}

/// Liquidity mint event (type 5). Fixed 74 bytes.
///
/// V3 events carry the position's tick range and the liquidity delta; V2
/// events zero those fields.
#[repr(C, packed)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, AsBytes, FromBytes, FromZeroes)]
pub struct PoolMintTlv {
    pub amount0: u128,
    pub amount1: u128,
    pub liquidity_delta: u128,
    pub pool_id: u64,
    pub block_number: u64,
    pub tick_lower: i32,
    pub tick_upper: i32,
    pub amount0_decimals: u8,
    pub amount1_decimals: u8,
}

impl PoolMintTlv {
    pub fn pool(&self) -> InstrumentId {
        InstrumentId::from_u64(self.pool_id)
    }
}

/// Liquidity burn event (type 6). Same layout as mint.
#[repr(C, packed)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, AsBytes, FromBytes, FromZeroes)]
pub struct PoolBurnTlv {
    pub amount0: u128,
    pub amount1: u128,
    pub liquidity_delta: u128,
    pub pool_id: u64,
    pub block_number: u64,
    pub tick_lower: i32,
    pub tick_upper: i32,
    pub amount0_decimals: u8,
    pub amount1_decimals: u8,
}

impl PoolBurnTlv {
    pub fn pool(&self) -> InstrumentId {
        InstrumentId::from_u64(self.pool_id)
    }
}

/// Full pool snapshot (type 7). Fixed 127 bytes.
///
/// V2 pools populate the reserves; V3 pools populate sqrt price, active
/// liquidity, tick, and tick spacing. `fee_pips` is hundredths of a basis
/// point (3000 = 0.30%) for both protocols.
#[repr(C, packed)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, AsBytes, FromBytes, FromZeroes)]
pub struct PoolStateTlv {
    pub reserve0: u128,
    pub reserve1: u128,
    pub liquidity: u128,
    pub pool_id: u64,
    pub token0_id: u64,
    pub token1_id: u64,
    pub block_number: u64,
    pub fee_pips: u32,
    pub tick: i32,
    pub tick_spacing: i32,
    /// [`PoolProtocol`] as a byte
    pub protocol: u8,
    pub token0_decimals: u8,
    pub token1_decimals: u8,
    pub sqrt_price_x96: [u8; 32],
}

impl PoolStateTlv {
    pub fn pool(&self) -> InstrumentId {
        InstrumentId::from_u64(self.pool_id)
    }

    pub fn pool_protocol(&self) -> Option<PoolProtocol> {
        PoolProtocol::from_u8(self.protocol)
    }

    /// Structural validity per the data-model invariants: V2 pools must have
    /// both reserves positive; V3 pools a known fee tier.
    pub fn is_structurally_valid(&self) -> bool {
        let reserve0 = self.reserve0;
        let reserve1 = self.reserve1;
        let fee = self.fee_pips;
        match self.pool_protocol() {
            Some(PoolProtocol::V2) => reserve0 > 0 && reserve1 > 0,
            Some(PoolProtocol::V3) => matches!(fee, 100 | 500 | 3000 | 10000),
            None => false,
        }
    }
}

/// Sequence restart announcement (type 8). Fixed 8 bytes.
#[repr(C, packed)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, AsBytes, FromBytes, FromZeroes)]
pub struct SourceResetTlv {
    /// The first sequence number the source will use after the reset
    pub new_sequence: u64,
}

/// Arbitrage opportunity signal (type 20). Fixed 84 bytes.
///
/// Emitted only after every profitability guard passes: positive net
/// profit, spread above the fee sum, plausible margin, fresh pool state.
#[repr(C, packed)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, AsBytes, FromBytes, FromZeroes)]
pub struct ArbitrageSignalTlv {
    /// Optimal input amount at `input_decimals`
    pub optimal_input: u128,
    /// Expected output of the closed loop at `output_decimals`
    pub expected_output: u128,
    pub buy_pool_id: u64,
    pub sell_pool_id: u64,
    pub signal_id: u64,
    /// Gross profit, USD at 8 decimals
    pub expected_profit_usd: i64,
    /// Gas estimate, USD at 8 decimals
    pub gas_cost_usd: i64,
    /// Net profit, USD at 8 decimals
    pub net_profit_usd: i64,
    /// Detector confidence, basis points of 10000
    pub confidence_bps: u16,
    pub input_decimals: u8,
    pub output_decimals: u8,
}

impl ArbitrageSignalTlv {
    pub fn buy_pool(&self) -> InstrumentId {
        InstrumentId::from_u64(self.buy_pool_id)
    }

    pub fn sell_pool(&self) -> InstrumentId {
        InstrumentId::from_u64(self.sell_pool_id)
    }
}

/// Liveness beacon (type 100). Fixed 8 bytes.
#[repr(C, packed)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, AsBytes, FromBytes, FromZeroes)]
pub struct HeartbeatTlv {
    pub ts_ns: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::size_of;

    #[test]
    fn payload_sizes_are_stable() {
        // Wire sizes are part of the protocol; a change here breaks readers.
        assert_eq!(size_of::<TradeTlv>(), 43);
        assert_eq!(size_of::<PoolSwapTlv>(), 102);
        assert_eq!(size_of::<PoolSyncTlv>(), 50);
        assert_eq!(size_of::<PoolMintTlv>(), 74);
        assert_eq!(size_of::<PoolBurnTlv>(), 74);
        assert_eq!(size_of::<PoolStateTlv>(), 127);
        assert_eq!(size_of::<SourceResetTlv>(), 8);
        assert_eq!(size_of::<ArbitrageSignalTlv>(), 84);
        assert_eq!(size_of::<HeartbeatTlv>(), 8);
    }

    #[test]
    fn trade_round_trips_through_bytes() {
        let trade = TradeTlv {
            instrument_id: 0xABCD,
            price: 4_500_000_000_000,
            volume: 150_000_000,
            ts_event_ns: 1_700_000_000_000_000_000,
            side: TradeTlv::SIDE_BUY,
            price_decimals: 8,
            volume_decimals: 8,
        };
        let bytes = trade.as_bytes();
        let parsed = TradeTlv::read_from(bytes).unwrap();
        assert_eq!(parsed, trade);
    }

    #[test]
    fn sqrt_price_encoding() {
        let value = 79228162514264337593543950336u128;
        let bytes = PoolSwapTlv::sqrt_price_bytes_from_u128(value);
        assert_eq!(&bytes[..16], &value.to_le_bytes());
        assert_eq!(&bytes[16..], &[0u8; 16]);
    }

    #[test]
    fn pool_state_validity() {
        let mut state = PoolStateTlv::new_zeroed();
        state.protocol = PoolProtocol::V2 as u8;
        assert!(!state.is_structurally_valid());
        state.reserve0 = 1;
        state.reserve1 = 1;
        assert!(state.is_structurally_valid());

        state.protocol = PoolProtocol::V3 as u8;
        state.fee_pips = 42;
        assert!(!state.is_structurally_valid());
        state.fee_pips = 3000;
        assert!(state.is_structurally_valid());

        state.protocol = 9;
        assert!(!state.is_structurally_valid());
    }

    #[test]
    fn unaligned_decode_works() {
        // Shift the bytes by one to force an unaligned read.
        let sync = PoolSyncTlv {
            reserve0: 1_000_000_000_000,
            reserve1: 2_000_000_000_000,
            pool_id: 7,
            block_number: 42,
            reserve0_decimals: 18,
            reserve1_decimals: 6,
        };
        let mut buf = vec![0u8];
        buf.extend_from_slice(sync.as_bytes());
        let parsed = PoolSyncTlv::read_from(&buf[1..]).unwrap();
        assert_eq!(parsed, sync);
    }
}
