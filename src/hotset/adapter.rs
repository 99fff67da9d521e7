// =============================================================================
// Per-venue WebSocket wire format: subscribe URL + tick parsing
// =============================================================================

use std::time::Duration;

use crate::types::{TickUpdate, Venue};

/// What the Hot Set Manager needs to know about one venue's streaming API.
/// Parsing follows the same indexed/keyed JSON unpacking style as
/// `venue/rest.rs`'s per-venue `parse_klines` match arms.
pub trait HotSetVenue: Send + Sync {
    fn venue(&self) -> Venue;
    fn ws_url(&self, symbols: &[String]) -> String;
    fn parse_tick(&self, raw: &str) -> Option<TickUpdate>;
    fn ping_interval(&self) -> Duration {
        Duration::from_secs(20)
    }
    fn pong_timeout(&self) -> Duration {
        Duration::from_secs(10)
    }
}

fn parse_f64(v: &serde_json::Value) -> f64 {
    v.as_str().and_then(|s| s.parse().ok()).or_else(|| v.as_f64()).unwrap_or(f64::NAN)
}

pub struct BinanceHotSetVenue;

impl HotSetVenue for BinanceHotSetVenue {
    fn venue(&self) -> Venue {
        Venue::Binance
    }

    fn ws_url(&self, symbols: &[String]) -> String {
        let streams: Vec<String> = symbols.iter().map(|s| format!("{}@bookTicker", s.to_lowercase())).collect();
        format!("wss://stream.binance.com:9443/stream?streams={}", streams.join("/"))
    }

    fn parse_tick(&self, raw: &str) -> Option<TickUpdate> {
        let root: serde_json::Value = serde_json::from_str(raw).ok()?;
        let data = root.get("data").unwrap_or(&root);
        let symbol = data.get("s")?.as_str()?.to_string();
        Some(TickUpdate {
            venue: Venue::Binance,
            symbol,
            ts: chrono::Utc::now().timestamp_millis(),
            bid: parse_f64(data.get("b")?),
            ask: parse_f64(data.get("a")?),
            bid_size: parse_f64(data.get("B")?),
            ask_size: parse_f64(data.get("A")?),
            last_price: (parse_f64(data.get("b")?) + parse_f64(data.get("a")?)) / 2.0,
            volume_24h: f64::NAN,
        })
    }
}

pub struct KrakenHotSetVenue;

impl HotSetVenue for KrakenHotSetVenue {
    fn venue(&self) -> Venue {
        Venue::Kraken
    }

    fn ws_url(&self, _symbols: &[String]) -> String {
        "wss://ws.kraken.com/v2".to_string()
    }

    fn parse_tick(&self, raw: &str) -> Option<TickUpdate> {
        let root: serde_json::Value = serde_json::from_str(raw).ok()?;
        if root.get("channel")?.as_str()? != "ticker" {
            return None;
        }
        let entry = root.get("data")?.as_array()?.first()?;
        let symbol = entry.get("symbol")?.as_str()?.replace('/', "");
        Some(TickUpdate {
            venue: Venue::Kraken,
            symbol,
            ts: chrono::Utc::now().timestamp_millis(),
            bid: parse_f64(entry.get("bid")?),
            ask: parse_f64(entry.get("ask")?),
            bid_size: parse_f64(entry.get("bid_qty")?),
            ask_size: parse_f64(entry.get("ask_qty")?),
            last_price: parse_f64(entry.get("last")?),
            volume_24h: entry.get("volume").map(parse_f64).unwrap_or(f64::NAN),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binance_parses_book_ticker_envelope() {
        let raw = r#"{"stream":"btcusdt@bookTicker","data":{"s":"BTCUSDT","b":"100.5","B":"2.0","a":"100.6","A":"1.5"}}"#;
        let tick = BinanceHotSetVenue.parse_tick(raw).unwrap();
        assert_eq!(tick.symbol, "BTCUSDT");
        assert!((tick.bid - 100.5).abs() < 1e-9);
    }

    #[test]
    fn kraken_ignores_non_ticker_channels() {
        let raw = r#"{"channel":"heartbeat"}"#;
        assert!(KrakenHotSetVenue.parse_tick(raw).is_none());
    }

    #[test]
    fn kraken_parses_ticker_payload() {
        let raw = r#"{"channel":"ticker","data":[{"symbol":"BTC/USD","bid":100.0,"bid_qty":1.0,"ask":101.0,"ask_qty":2.0,"last":100.5,"volume":10.0}]}"#;
        let tick = KrakenHotSetVenue.parse_tick(raw).unwrap();
        assert_eq!(tick.symbol, "BTCUSD");
        assert!((tick.last_price - 100.5).abs() < 1e-9);
    }
}
