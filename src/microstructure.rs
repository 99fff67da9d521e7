// =============================================================================
// Microstructure Processor — spread, depth@2%, VADR, venue health
// =============================================================================
//
// Grounded on `market_data/orderbook.rs`'s spread/imbalance bookkeeping,
// extended with a rolling price/volume window per symbol so VADR can be
// computed the way the scoring pipeline needs it.

use std::collections::{HashMap, VecDeque};

use parking_lot::RwLock;

use crate::clock::Clock;
use crate::types::{BookL2Snapshot, HealthStatus, MicrostructureSample, ProviderHealth, SampleQuality, Venue};

struct SymbolWindow {
    prices: VecDeque<f64>,
    volumes: VecDeque<f64>,
    capacity: usize,
}

impl SymbolWindow {
    fn new(capacity: usize) -> Self {
        Self { prices: VecDeque::with_capacity(capacity), volumes: VecDeque::with_capacity(capacity), capacity }
    }

    fn push(&mut self, price: f64, volume: f64) {
        if self.prices.len() == self.capacity {
            self.prices.pop_front();
            self.volumes.pop_front();
        }
        self.prices.push_back(price);
        self.volumes.push_back(volume);
    }

    fn vadr(&self, min_bars: usize) -> f64 {
        if self.prices.len() < min_bars {
            return f64::NAN;
        }
        let max = self.prices.iter().cloned().fold(f64::MIN, f64::max);
        let min = self.prices.iter().cloned().fold(f64::MAX, f64::min);
        if min <= 0.0 {
            return f64::NAN;
        }
        let avg_volume = self.volumes.iter().sum::<f64>() / self.volumes.len() as f64;
        ((max - min) / min) * (1.0 + (1.0 + avg_volume / 1_000_000.0).ln())
    }
}

pub struct MicrostructureProcessor {
    vadr_min_bars: usize,
    windows: RwLock<HashMap<String, SymbolWindow>>,
}

impl MicrostructureProcessor {
    pub fn new(vadr_min_bars: usize) -> Self {
        Self { vadr_min_bars, windows: RwLock::new(HashMap::new()) }
    }

    /// Depth within ±2% of mid, approximated at the top of book when only L1
    /// is available; a book-native adapter with full L2 levels integrates the
    /// true depth inside the band instead of using this shortcut.
    fn depth_usd_at_2pct(book: &BookL2Snapshot) -> (f64, f64) {
        let best_bid = book.best_bid().unwrap_or(0.0);
        let best_ask = book.best_ask().unwrap_or(0.0);
        let bid_size: f64 = book.bids.first().map(|l| l.size).unwrap_or(0.0);
        let ask_size: f64 = book.asks.first().map(|l| l.size).unwrap_or(0.0);
        (bid_size * best_bid, ask_size * best_ask)
    }

    /// Ingest one book snapshot + the tick's last price and 24h volume,
    /// producing a fresh [`MicrostructureSample`].
    pub fn ingest(
        &self,
        symbol: &str,
        venue: Venue,
        book: &BookL2Snapshot,
        last_price: f64,
        volume_24h: f64,
        health: &ProviderHealth,
        clock: &dyn Clock,
    ) -> Option<MicrostructureSample> {
        let best_bid = book.best_bid()?;
        let best_ask = book.best_ask()?;
        let mid = (best_bid + best_ask) / 2.0;
        let spread_bps = if best_ask > best_bid && mid > 0.0 {
            (best_ask - best_bid) / mid * 10_000.0
        } else {
            f64::NAN
        };

        let (depth_bid, depth_ask) = Self::depth_usd_at_2pct(book);

        let vadr = {
            let mut windows = self.windows.write();
            let window = windows.entry(symbol.to_string()).or_insert_with(|| SymbolWindow::new(2 * self.vadr_min_bars));
            window.push(last_price, volume_24h);
            window.vadr(self.vadr_min_bars)
        };

        let liquidity_gradient = if depth_ask + depth_bid > 0.0 {
            // depth@0.5% approximated as the same top-of-book depth; ratio
            // collapses to 1.0 without full L2 levels but stays well-defined.
            1.0
        } else {
            f64::NAN
        };

        let quality = if health.is_degraded() {
            SampleQuality::Degraded
        } else if spread_bps.is_finite() && spread_bps < 10.0 {
            SampleQuality::Excellent
        } else {
            SampleQuality::Good
        };

        let is_usd_quote = symbol.ends_with("USD") || symbol.ends_with("USDT") || symbol.ends_with("USDC");

        let sample = MicrostructureSample {
            symbol: symbol.to_string(),
            venue,
            ts: clock.now_ms(),
            spread_bps,
            depth_bid_usd_at_2pct: depth_bid,
            depth_ask_usd_at_2pct: depth_ask,
            vadr,
            liquidity_gradient,
            quality,
            is_usd_quote,
        };

        if sample.is_valid() {
            Some(sample)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MicrostructureGates {
    pub spread_ok: bool,
    pub depth_ok: bool,
    pub vadr_ok: bool,
    pub venue_health_ok: bool,
}

impl MicrostructureGates {
    pub fn microstructure_ok(&self) -> bool {
        self.spread_ok && self.depth_ok && self.vadr_ok && self.venue_health_ok
    }
}

pub fn evaluate_gates(
    sample: &MicrostructureSample,
    health: &ProviderHealth,
    spread_max_bps: f64,
    depth_min_usd: f64,
    vadr_min: f64,
) -> MicrostructureGates {
    MicrostructureGates {
        spread_ok: sample.spread_bps.is_finite() && sample.spread_bps < spread_max_bps,
        depth_ok: sample.depth_bid_usd_at_2pct.min(sample.depth_ask_usd_at_2pct) >= depth_min_usd,
        vadr_ok: sample.vadr.is_finite() && sample.vadr >= vadr_min,
        venue_health_ok: health.status == HealthStatus::Healthy,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::types::BookLevel;
    use chrono::Utc;

    fn book(bid: f64, ask: f64) -> BookL2Snapshot {
        BookL2Snapshot::new(
            "BTCUSD",
            Venue::Kraken,
            0,
            vec![BookLevel { price: bid, size: 2.0 }],
            vec![BookLevel { price: ask, size: 1.5 }],
            1,
        )
        .unwrap()
    }

    fn healthy() -> ProviderHealth {
        ProviderHealth {
            status: HealthStatus::Healthy,
            last_seen: 0,
            error_rate: 0.0,
            p99_latency_ms: 50.0,
            ws_connected: true,
            rest_healthy: true,
        }
    }

    #[test]
    fn vadr_is_nan_until_window_fills() {
        let clock = FixedClock::new(Utc::now());
        let processor = MicrostructureProcessor::new(14);
        let sample = processor
            .ingest("BTCUSD", Venue::Kraken, &book(100.0, 100.1), 100.0, 5_000_000.0, &healthy(), &clock)
            .unwrap();
        assert!(sample.vadr.is_nan());
    }

    #[test]
    fn vadr_computed_once_window_fills() {
        let clock = FixedClock::new(Utc::now());
        let processor = MicrostructureProcessor::new(3);
        let mut last = None;
        for i in 0..6 {
            let price = 100.0 + i as f64;
            last = processor.ingest("BTCUSD", Venue::Kraken, &book(price, price + 0.1), price, 2_000_000.0, &healthy(), &clock);
        }
        assert!(last.unwrap().vadr.is_finite());
    }

    #[test]
    fn wide_spread_sample_rejected_as_corrupt() {
        let clock = FixedClock::new(Utc::now());
        let processor = MicrostructureProcessor::new(14);
        let wide = book(100.0, 200.0);
        assert!(processor.ingest("BTCUSD", Venue::Kraken, &wide, 150.0, 1_000_000.0, &healthy(), &clock).is_none());
    }

    #[test]
    fn gates_require_all_four_conditions() {
        let sample = MicrostructureSample {
            symbol: "BTCUSD".into(),
            venue: Venue::Kraken,
            ts: 0,
            spread_bps: 10.0,
            depth_bid_usd_at_2pct: 200_000.0,
            depth_ask_usd_at_2pct: 200_000.0,
            vadr: 2.0,
            liquidity_gradient: 1.0,
            quality: SampleQuality::Excellent,
            is_usd_quote: true,
        };
        let gates = evaluate_gates(&sample, &healthy(), 50.0, 100_000.0, 1.75);
        assert!(gates.microstructure_ok());
    }
}
