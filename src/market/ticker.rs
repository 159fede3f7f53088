//! Raw feed payload → `Ticker`.
//!
//! Accepts both the REST field names (`symbol`, `bidPrice`, ...) and the
//! compact stream names (`s`, `b`, `B`, ...). Numbers may arrive as JSON
//! strings or numbers.

use serde::Deserialize;
use serde_json::Value;

use crate::types::Ticker;

#[derive(Debug, Deserialize)]
struct RawTicker {
    #[serde(alias = "s")]
    symbol: Option<String>,
    #[serde(rename = "bidPrice", alias = "b")]
    bid_price: Option<Value>,
    #[serde(rename = "bidQty", alias = "B")]
    bid_qty: Option<Value>,
    #[serde(rename = "askPrice", alias = "a")]
    ask_price: Option<Value>,
    #[serde(rename = "askQty", alias = "A")]
    ask_qty: Option<Value>,
    #[serde(rename = "lastPrice", alias = "c")]
    last_price: Option<Value>,
    #[serde(rename = "volume", alias = "v")]
    base_volume: Option<Value>,
    #[serde(rename = "quoteVolume", alias = "q")]
    quote_volume: Option<Value>,
    #[serde(rename = "count", alias = "n")]
    trades: Option<Value>,
    #[serde(rename = "closeTime", alias = "E")]
    event_time: Option<Value>,
}

fn as_f64(value: &Option<Value>) -> f64 {
    match value {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(f64::NAN),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(f64::NAN),
        _ => f64::NAN,
    }
}

fn as_u64(value: &Option<Value>) -> u64 {
    match value {
        Some(Value::Number(n)) => n.as_u64().unwrap_or(0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0),
        _ => 0,
    }
}

fn as_i64(value: &Option<Value>) -> i64 {
    match value {
        Some(Value::Number(n)) => n.as_i64().unwrap_or(0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0),
        _ => 0,
    }
}

/// Parse one feed entry. Entries without a symbol are dropped.
pub fn parse_ticker(value: &Value) -> Option<Ticker> {
    let raw = RawTicker::deserialize(value).ok()?;
    let symbol = raw.symbol.as_deref()?.trim().to_uppercase();
    if symbol.is_empty() {
        return None;
    }

    Some(Ticker {
        symbol,
        bid_price: as_f64(&raw.bid_price),
        bid_qty: as_f64(&raw.bid_qty),
        ask_price: as_f64(&raw.ask_price),
        ask_qty: as_f64(&raw.ask_qty),
        last_price: as_f64(&raw.last_price),
        base_volume: as_f64(&raw.base_volume),
        quote_volume: as_f64(&raw.quote_volume),
        trades: as_u64(&raw.trades),
        event_time: as_i64(&raw.event_time),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_rest_payload() {
        let t = parse_ticker(&json!({
            "symbol": "ETHBTC",
            "bidPrice": "0.05310000", "bidQty": "12.5",
            "askPrice": "0.05311000", "askQty": "3.1",
            "lastPrice": "0.05310500",
            "volume": "40000.1", "quoteVolume": "2124.3",
            "count": 91234, "closeTime": 1700000000123i64
        }))
        .unwrap();

        assert_eq!(t.symbol, "ETHBTC");
        assert_eq!(t.bid_price, 0.0531);
        assert_eq!(t.ask_price, 0.05311);
        assert_eq!(t.ask_qty, 3.1);
        assert_eq!(t.quote_volume, 2124.3);
        assert_eq!(t.trades, 91234);
        assert_eq!(t.event_time, 1700000000123);
    }

    #[test]
    fn test_parse_stream_payload() {
        let t = parse_ticker(&json!({
            "e": "24hrTicker", "E": 1700000000999i64, "s": "BNBUSDT",
            "b": "300.1", "B": "5", "a": "300.2", "A": "7",
            "c": "300.15", "C": 1700000000000i64,
            "v": "1000", "q": "300000", "n": "42"
        }))
        .unwrap();

        assert_eq!(t.symbol, "BNBUSDT");
        assert_eq!(t.bid_price, 300.1);
        assert_eq!(t.bid_qty, 5.0);
        assert_eq!(t.ask_price, 300.2);
        assert_eq!(t.last_price, 300.15);
        assert_eq!(t.quote_volume, 300000.0);
        assert_eq!(t.trades, 42);
        assert_eq!(t.event_time, 1700000000999);
    }

    #[test]
    fn test_missing_symbol_dropped() {
        assert!(parse_ticker(&json!({"bidPrice": "1"})).is_none());
        assert!(parse_ticker(&json!({"symbol": "  "})).is_none());
        assert!(parse_ticker(&json!("BTCUSDT")).is_none());
        assert!(parse_ticker(&json!(null)).is_none());
    }

    #[test]
    fn test_missing_numbers_become_nan() {
        let t = parse_ticker(&json!({"symbol": "ethbtc", "bidPrice": "n/a"})).unwrap();
        assert_eq!(t.symbol, "ETHBTC");
        assert!(t.bid_price.is_nan());
        assert!(t.ask_price.is_nan());
        assert_eq!(t.trades, 0);
    }
}
