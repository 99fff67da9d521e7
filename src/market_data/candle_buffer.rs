// =============================================================================
// Kline Buffer — ring buffer of closed klines per (symbol, interval)
// =============================================================================

use std::collections::{HashMap, VecDeque};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::types::Kline;

/// Composite key identifying a unique kline series.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct CandleKey {
    pub symbol: String,
    pub interval: String,
}

impl std::fmt::Display for CandleKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.symbol, self.interval)
    }
}

/// Thread-safe ring buffer that keeps the most recent closed klines per
/// `(symbol, interval)` key, feeding the factor engine's historical window
/// requirements.
pub struct CandleBuffer {
    buffers: RwLock<HashMap<CandleKey, VecDeque<Kline>>>,
    max_candles: usize,
}

impl CandleBuffer {
    pub fn new(max_candles: usize) -> Self {
        Self { buffers: RwLock::new(HashMap::new()), max_candles }
    }

    /// Append a closed kline, trimming the ring to `max_candles`.
    pub fn push(&self, key: CandleKey, kline: Kline) {
        let mut map = self.buffers.write();
        let ring = map.entry(key).or_insert_with(|| VecDeque::with_capacity(self.max_candles + 1));
        ring.push_back(kline);
        while ring.len() > self.max_candles {
            ring.pop_front();
        }
    }

    /// Most recent `count` klines, oldest-first.
    pub fn get(&self, key: &CandleKey, count: usize) -> Vec<Kline> {
        let map = self.buffers.read();
        match map.get(key) {
            Some(ring) => {
                let start = ring.len().saturating_sub(count);
                ring.iter().skip(start).cloned().collect()
            }
            None => Vec::new(),
        }
    }

    pub fn get_closes(&self, key: &CandleKey, count: usize) -> Vec<f64> {
        self.get(key, count).iter().map(|c| c.close).collect()
    }

    pub fn last_close(&self, key: &CandleKey) -> Option<f64> {
        let map = self.buffers.read();
        map.get(key).and_then(|ring| ring.back()).map(|c| c.close)
    }

    pub fn count(&self, key: &CandleKey) -> usize {
        let map = self.buffers.read();
        map.get(key).map_or(0, VecDeque::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Venue;

    fn sample_kline(ts: i64, close: f64) -> Kline {
        Kline {
            symbol: "BTCUSD".to_string(),
            venue: Venue::Kraken,
            ts,
            interval: "1h".to_string(),
            open: close,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume: 100.0,
            quote_volume: 200.0,
        }
    }

    fn make_key(sym: &str, iv: &str) -> CandleKey {
        CandleKey { symbol: sym.into(), interval: iv.into() }
    }

    #[test]
    fn ring_buffer_trims_to_capacity() {
        let buf = CandleBuffer::new(3);
        let key = make_key("BTCUSD", "1h");
        for i in 0..5 {
            buf.push(key.clone(), sample_kline(i * 3_600_000, 100.0 + i as f64));
        }
        assert_eq!(buf.count(&key), 3);
        assert_eq!(buf.get_closes(&key, 10), vec![102.0, 103.0, 104.0]);
    }

    #[test]
    fn last_close_tracks_most_recent_push() {
        let buf = CandleBuffer::new(10);
        let key = make_key("ETHUSD", "1h");
        buf.push(key.clone(), sample_kline(0, 50.0));
        buf.push(key.clone(), sample_kline(3_600_000, 52.0));
        assert_eq!(buf.last_close(&key), Some(52.0));
    }

    #[test]
    fn empty_buffer_returns_none() {
        let buf = CandleBuffer::new(10);
        let key = make_key("XYZUSD", "1h");
        assert_eq!(buf.last_close(&key), None);
    }
}
