// =============================================================================
// Multi-timeframe momentum, RSI(4h), ATR(1h), and per-timeframe volume
// =============================================================================

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::indicators::atr::calculate_atr;
use crate::indicators::rsi::calculate_rsi;
use crate::market_data::{CandleBuffer, CandleKey};
use crate::types::{Kline, Timeframe};

/// `(last - first) / first * 100` over the window implied by `tf.min_bars()`
/// 1h bars. `NaN` when the buffer doesn't hold enough history yet.
pub fn momentum_pct(bars: &[Kline], tf: Timeframe) -> f64 {
    let needed = tf.min_bars();
    if bars.len() < needed {
        return f64::NAN;
    }
    let window = &bars[bars.len() - needed..];
    let first = window.first().unwrap().close;
    let last = window.last().unwrap().close;
    if first == 0.0 {
        return f64::NAN;
    }
    (last - first) / first * 100.0
}

pub fn average_volume(bars: &[Kline], tf: Timeframe) -> f64 {
    let needed = tf.min_bars();
    if bars.len() < needed {
        return f64::NAN;
    }
    let window = &bars[bars.len() - needed..];
    window.iter().map(|k| k.volume).sum::<f64>() / window.len() as f64
}

/// Full multi-timeframe momentum snapshot for one symbol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MomentumSnapshot {
    pub symbol: String,
    pub momentum_by_tf: HashMap<Timeframe, f64>,
    pub avg_volume_by_tf: HashMap<Timeframe, f64>,
    pub rsi_4h: f64,
    pub atr_1h: f64,
}

/// Build a [`MomentumSnapshot`] from the hourly candle buffer. `interval_1h`
/// is the buffer's 1h series key for `symbol`; the 4h RSI is computed from a
/// resampled 4h-close series built by taking every 4th hourly close.
pub fn build_snapshot(buffer: &CandleBuffer, symbol: &str, lookback_bars: usize) -> MomentumSnapshot {
    let key = CandleKey { symbol: symbol.to_string(), interval: "1h".to_string() };
    let bars = buffer.get(&key, lookback_bars);

    let mut momentum_by_tf = HashMap::new();
    let mut avg_volume_by_tf = HashMap::new();
    for tf in Timeframe::ALL {
        momentum_by_tf.insert(tf, momentum_pct(&bars, tf));
        avg_volume_by_tf.insert(tf, average_volume(&bars, tf));
    }

    let closes_4h: Vec<f64> = bars.iter().step_by(4).map(|k| k.close).collect();
    let rsi_series = calculate_rsi(&closes_4h, 14);
    let rsi_4h = rsi_series.last().copied().unwrap_or(f64::NAN);

    let atr_1h = calculate_atr(&bars, 14).unwrap_or(f64::NAN);

    MomentumSnapshot {
        symbol: symbol.to_string(),
        momentum_by_tf,
        avg_volume_by_tf,
        rsi_4h,
        atr_1h,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Venue;

    fn kline(ts: i64, close: f64) -> Kline {
        Kline {
            symbol: "BTCUSD".to_string(),
            venue: Venue::Kraken,
            ts,
            interval: "1h".to_string(),
            open: close,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume: 10.0,
            quote_volume: 0.0,
        }
    }

    #[test]
    fn momentum_is_nan_below_min_bars() {
        let bars: Vec<Kline> = (0..3).map(|i| kline(i, 100.0)).collect();
        assert!(momentum_pct(&bars, Timeframe::H4).is_nan());
    }

    #[test]
    fn momentum_computed_once_window_fills() {
        let bars: Vec<Kline> = (0..5).map(|i| kline(i, 100.0 + i as f64)).collect();
        let m = momentum_pct(&bars, Timeframe::H4);
        assert!(!m.is_nan());
        assert!((m - 4.0).abs() < 1e-9); // (104-100)/100*100
    }

    #[test]
    fn average_volume_over_window() {
        let bars: Vec<Kline> = (0..5).map(|i| kline(i, 100.0)).collect();
        let avg = average_volume(&bars, Timeframe::H4);
        assert!((avg - 10.0).abs() < 1e-9);
    }

    #[test]
    fn snapshot_builds_from_buffer() {
        let buffer = CandleBuffer::new(200);
        let key = CandleKey { symbol: "BTCUSD".to_string(), interval: "1h".to_string() };
        for i in 0..200 {
            buffer.push(key.clone(), kline(i, 100.0 + i as f64 * 0.1));
        }
        let snapshot = build_snapshot(&buffer, "BTCUSD", 200);
        assert!(!snapshot.momentum_by_tf[&Timeframe::H1].is_nan());
        assert!(!snapshot.atr_1h.is_nan());
    }
}
