//! Fixed-point → JSON rendering
//!
//! All money and amount fields become exact decimal strings so no JSON
//! parser downstream can mangle them through binary floating point;
//! counters and timestamps stay JSON numbers.

use codec::payloads::{ArbitrageSignalTlv, TradeTlv};
use serde_json::{json, Value};
use types::UsdFixedPoint8;

/// Render a fixed-point integer at `decimals` as an exact decimal string.
///
/// Trailing fractional zeros are trimmed; integral values render with no
/// fractional part. This is lossless in both directions.
pub fn format_fixed(raw: i128, decimals: u8) -> String {
    let negative = raw < 0;
    let magnitude = raw.unsigned_abs();
    format_unsigned(magnitude, decimals, negative)
}

/// Unsigned variant for u128 wire amounts.
pub fn format_fixed_unsigned(raw: u128, decimals: u8) -> String {
    format_unsigned(raw, decimals, false)
}

fn format_unsigned(magnitude: u128, decimals: u8, negative: bool) -> String {
    let sign = if negative { "-" } else { "" };
    if decimals == 0 {
        return format!("{sign}{magnitude}");
    }
    let scale = 10u128.pow(decimals as u32);
    let whole = magnitude / scale;
    let frac = magnitude % scale;
    if frac == 0 {
        format!("{sign}{whole}")
    } else {
        let frac_str = format!("{frac:0width$}", width = decimals as usize);
        format!("{sign}{whole}.{}", frac_str.trim_end_matches('0'))
    }
}

fn format_usd(raw: i64) -> String {
    UsdFixedPoint8::from_raw(raw).to_decimal_string()
}

/// Trade frame per the dashboard wire contract.
pub fn trade_json(descriptor: &str, trade: &TradeTlv) -> Value {
    let price = trade.price;
    let volume = trade.volume;
    let ts_event_ns = trade.ts_event_ns;
    json!({
        "msg_type": "trade",
        "instrument": descriptor,
        "price": format_fixed(price as i128, trade.price_decimals),
        "volume": format_fixed(volume as i128, trade.volume_decimals),
        "ts_ns": ts_event_ns,
        "side": if trade.side == TradeTlv::SIDE_BUY { "buy" } else { "sell" },
    })
}

/// Arbitrage signal frame per the dashboard wire contract.
pub fn arbitrage_json(
    buy_descriptor: &str,
    sell_descriptor: &str,
    signal: &ArbitrageSignalTlv,
) -> Value {
    let optimal_input = signal.optimal_input;
    let expected_output = signal.expected_output;
    let expected_profit = signal.expected_profit_usd;
    let gas_cost = signal.gas_cost_usd;
    let net_profit = signal.net_profit_usd;
    json!({
        "msg_type": "arbitrage",
        "buy": buy_descriptor,
        "sell": sell_descriptor,
        "input": format_fixed_unsigned(optimal_input, signal.input_decimals),
        "expected_output": format_fixed_unsigned(expected_output, signal.output_decimals),
        "expected_profit_usd": format_usd(expected_profit),
        "gas_usd": format_usd(gas_cost),
        "net_profit_usd": format_usd(net_profit),
    })
}

/// Periodic metrics frame; counters are JSON numbers by contract.
pub fn metrics_json(
    trades_per_second: u64,
    active_connections: usize,
    signals_total: u64,
    frames_dropped: u64,
) -> Value {
    json!({
        "msg_type": "metrics",
        "trades_per_second": trades_per_second,
        "active_connections": active_connections,
        "signals_total": signals_total,
        "frames_dropped": frames_dropped,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use zerocopy::FromZeroes;

    #[test]
    fn fixed_formatting_is_exact() {
        assert_eq!(format_fixed(1_000_000_000_000_000_000, 18), "1");
        assert_eq!(format_fixed(1_500_000_000_000_000_000, 18), "1.5");
        assert_eq!(format_fixed(1, 18), "0.000000000000000001");
        assert_eq!(format_fixed(-2_500_000, 6), "-2.5");
        assert_eq!(format_fixed(42, 0), "42");
        assert_eq!(format_fixed_unsigned(1_993_012_003, 6), "1993.012003");
    }

    #[test]
    fn no_floating_point_artifacts() {
        // 0.1 + 0.2 style values must render exactly.
        assert_eq!(format_fixed(30_000_000, 8), "0.3");
        assert_eq!(format_fixed(10_000_000 + 20_000_000, 8), "0.3");
    }

    #[test]
    fn trade_json_shape() {
        let trade = TradeTlv {
            instrument_id: 1,
            price: 200_050_000_000,
            volume: 150_000_000,
            ts_event_ns: 1_700_000_000_000_000_123,
            side: TradeTlv::SIDE_SELL,
            price_decimals: 8,
            volume_decimals: 8,
        };
        let value = trade_json("coinbase:ETH-USD", &trade);
        assert_eq!(value["msg_type"], "trade");
        assert_eq!(value["instrument"], "coinbase:ETH-USD");
        // Money fields are strings; the timestamp is a number.
        assert_eq!(value["price"], "2000.5");
        assert_eq!(value["volume"], "1.5");
        assert_eq!(value["side"], "sell");
        assert_eq!(value["ts_ns"], 1_700_000_000_000_000_123u64);
    }

    #[test]
    fn arbitrage_json_shape() {
        let mut signal = ArbitrageSignalTlv::new_zeroed();
        signal.optimal_input = 5_000_000_000; // 5000 USDC at 6 decimals
        signal.expected_output = 5_024_000_000;
        signal.input_decimals = 6;
        signal.output_decimals = 6;
        signal.expected_profit_usd = 2_400_000_000; // $24
        signal.gas_cost_usd = 1_120_000; // $0.0112
        signal.net_profit_usd = 2_398_880_000;

        let value = arbitrage_json("pool-a-desc", "pool-b-desc", &signal);
        assert_eq!(value["msg_type"], "arbitrage");
        assert_eq!(value["buy"], "pool-a-desc");
        assert_eq!(value["sell"], "pool-b-desc");
        assert_eq!(value["input"], "5000");
        assert_eq!(value["expected_output"], "5024");
        assert_eq!(value["expected_profit_usd"], "24");
        assert_eq!(value["gas_usd"], "0.0112");
        assert_eq!(value["net_profit_usd"], "23.9888");
    }

    #[test]
    fn metrics_counters_are_numbers() {
        let value = metrics_json(120, 3, 42, 7);
        assert!(value["trades_per_second"].is_u64());
        assert!(value["active_connections"].is_u64());
        assert_eq!(value["msg_type"], "metrics");
    }
}
