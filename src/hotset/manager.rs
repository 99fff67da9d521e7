// =============================================================================
// Hot Set Manager — multi-venue WS connections with staged latency tracking
// =============================================================================
//
// Grounded on `market_data/trade_stream.rs::run_trade_stream`'s
// connect/read-loop/reconnect shape, generalized from one hardcoded Binance
// stream to N venues, each behind a `HotSetVenue` adapter, with bounded
// per-subscriber fanout instead of a single in-process aggregator.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::{SinkExt, StreamExt};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{info, warn};

use crate::clock::Clock;
use crate::hotset::adapter::HotSetVenue;
use crate::microstructure::MicrostructureProcessor;
use crate::types::{ProviderHealth, TickUpdate, Venue};

/// Elapsed time through each of the four pipeline stages for one tick.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct StageLatency {
    pub ingest_ms: f64,
    pub normalize_ms: f64,
    pub process_ms: f64,
    pub serve_ms: f64,
}

impl StageLatency {
    pub fn total_ms(&self) -> f64 {
        self.ingest_ms + self.normalize_ms + self.process_ms + self.serve_ms
    }
}

struct SubscriberSlot {
    tx: mpsc::Sender<TickUpdate>,
    dropped: AtomicU64,
}

/// Fans out ticks from every connected venue to bounded per-subscriber
/// channels, discarding (not blocking on) a tick for a subscriber whose
/// channel is full, and discarding any tick older than `stale_threshold_ms`.
pub struct HotSetManager {
    subscribers: RwLock<HashMap<String, Arc<SubscriberSlot>>>,
    microstructure: Arc<MicrostructureProcessor>,
    stale_threshold_ms: i64,
    stale_dropped: AtomicU64,
}

impl HotSetManager {
    pub fn new(microstructure: Arc<MicrostructureProcessor>, stale_threshold_ms: i64) -> Self {
        Self {
            subscribers: RwLock::new(HashMap::new()),
            microstructure,
            stale_threshold_ms,
            stale_dropped: AtomicU64::new(0),
        }
    }

    /// Register a subscriber with a bounded channel. Returns the receiving
    /// end; the caller drives its own consumer loop.
    pub fn subscribe(&self, id: impl Into<String>, capacity: usize) -> mpsc::Receiver<TickUpdate> {
        let (tx, rx) = mpsc::channel(capacity);
        self.subscribers.write().insert(id.into(), Arc::new(SubscriberSlot { tx, dropped: AtomicU64::new(0) }));
        rx
    }

    pub fn unsubscribe(&self, id: &str) {
        self.subscribers.write().remove(id);
    }

    pub fn dropped_for(&self, id: &str) -> u64 {
        self.subscribers.read().get(id).map(|s| s.dropped.load(Ordering::Relaxed)).unwrap_or(0)
    }

    pub fn stale_dropped(&self) -> u64 {
        self.stale_dropped.load(Ordering::Relaxed)
    }

    /// Stage 3 (Process) + Stage 4 (Serve). Called once per parsed tick,
    /// after the venue connection loop's Ingest + Normalize stages.
    fn dispatch(&self, tick: TickUpdate, clock: &dyn Clock, ingest_ms: f64, normalize_ms: f64, health: &ProviderHealth) -> StageLatency {
        let now_ms = clock.now_ms();
        if now_ms - tick.ts > self.stale_threshold_ms {
            self.stale_dropped.fetch_add(1, Ordering::Relaxed);
            return StageLatency { ingest_ms, normalize_ms, ..Default::default() };
        }

        let process_start = Instant::now();
        // A top-of-book tick carries only one level per side; build a
        // single-level book so the microstructure processor still refreshes
        // spread/VADR state from it. Full-depth snapshots for depth@2% come
        // from the facade's L2 path, not the hot set.
        if let Some(book) = crate::types::BookL2Snapshot::new(
            tick.symbol.clone(),
            tick.venue,
            tick.ts,
            vec![crate::types::BookLevel { price: tick.bid, size: tick.bid_size }],
            vec![crate::types::BookLevel { price: tick.ask, size: tick.ask_size }],
            0,
        ) {
            self.microstructure.ingest(&tick.symbol, tick.venue, &book, tick.last_price, tick.volume_24h, health, clock);
        }
        let process_ms = process_start.elapsed().as_secs_f64() * 1000.0;

        let serve_start = Instant::now();
        let subscribers: Vec<Arc<SubscriberSlot>> = self.subscribers.read().values().cloned().collect();
        for slot in subscribers {
            if slot.tx.try_send(tick.clone()).is_err() {
                slot.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
        let serve_ms = serve_start.elapsed().as_secs_f64() * 1000.0;

        StageLatency { ingest_ms, normalize_ms, process_ms, serve_ms }
    }

    /// Run one venue's connection with subscribe-on-connect, ping/pong
    /// keepalive, and automatic reconnect with bounded exponential backoff.
    /// Runs until `shutdown` resolves.
    pub async fn run_venue(
        &self,
        venue_adapter: Arc<dyn HotSetVenue>,
        symbols: Vec<String>,
        clock: Arc<dyn Clock>,
        health: Arc<RwLock<ProviderHealth>>,
    ) {
        let venue = venue_adapter.venue();
        let mut backoff = Duration::from_millis(500);
        const MAX_BACKOFF: Duration = Duration::from_secs(30);

        loop {
            let url = venue_adapter.ws_url(&symbols);
            info!(venue = %venue, %url, "connecting hot set websocket");

            match connect_async(&url).await {
                Ok((stream, _response)) => {
                    backoff = Duration::from_millis(500);
                    let (mut write, mut read) = stream.split();
                    let mut ping_interval = tokio::time::interval(venue_adapter.ping_interval());
                    let mut last_pong = Instant::now();

                    loop {
                        tokio::select! {
                            _ = ping_interval.tick() => {
                                if last_pong.elapsed() > venue_adapter.pong_timeout() {
                                    warn!(venue = %venue, "pong timeout, reconnecting");
                                    break;
                                }
                                if write.send(Message::Ping(vec![])).await.is_err() {
                                    break;
                                }
                            }
                            msg = read.next() => {
                                let ingest_start = Instant::now();
                                match msg {
                                    Some(Ok(Message::Text(text))) => {
                                        let ingest_ms = ingest_start.elapsed().as_secs_f64() * 1000.0;
                                        let normalize_start = Instant::now();
                                        if let Some(tick) = venue_adapter.parse_tick(&text) {
                                            let normalize_ms = normalize_start.elapsed().as_secs_f64() * 1000.0;
                                            self.dispatch(tick, clock.as_ref(), ingest_ms, normalize_ms, &health.read());
                                        }
                                    }
                                    Some(Ok(Message::Pong(_))) => {
                                        last_pong = Instant::now();
                                    }
                                    Some(Ok(Message::Close(_))) | None => {
                                        warn!(venue = %venue, "hot set websocket closed");
                                        break;
                                    }
                                    Some(Err(e)) => {
                                        warn!(venue = %venue, error = %e, "hot set websocket read error");
                                        break;
                                    }
                                    _ => {}
                                }
                            }
                        }
                    }
                }
                Err(e) => {
                    warn!(venue = %venue, error = %e, "hot set websocket connect failed");
                }
            }

            health.write().ws_connected = false;
            tokio::time::sleep(backoff).await;
            backoff = (backoff * 2).min(MAX_BACKOFF);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::types::HealthStatus;
    use chrono::Utc;

    fn healthy() -> ProviderHealth {
        ProviderHealth { status: HealthStatus::Healthy, last_seen: 0, error_rate: 0.0, p99_latency_ms: 100.0, ws_connected: true, rest_healthy: true }
    }

    fn tick(ts: i64) -> TickUpdate {
        TickUpdate {
            venue: Venue::Binance,
            symbol: "BTCUSD".to_string(),
            ts,
            bid: 100.0,
            ask: 100.1,
            bid_size: 1.0,
            ask_size: 1.0,
            last_price: 100.05,
            volume_24h: 1000.0,
        }
    }

    fn processor() -> Arc<MicrostructureProcessor> {
        Arc::new(MicrostructureProcessor::new(5))
    }

    #[test]
    fn stale_tick_is_discarded_and_counted() {
        let manager = HotSetManager::new(processor(), 5_000);
        let clock = FixedClock::new(Utc::now());
        let now_ms = clock.now_ms();
        let stale = tick(now_ms - 10_000);
        manager.dispatch(stale, &clock, 0.0, 0.0, &healthy());
        assert_eq!(manager.stale_dropped(), 1);
    }

    #[test]
    fn fresh_tick_is_served_to_subscribers() {
        let manager = HotSetManager::new(processor(), 5_000);
        let clock = FixedClock::new(Utc::now());
        let _rx = manager.subscribe("scan", 4);
        let fresh = tick(clock.now_ms());
        let latency = manager.dispatch(fresh, &clock, 1.0, 0.5, &healthy());
        assert_eq!(manager.dropped_for("scan"), 0);
        assert!(latency.total_ms() >= 0.0);
    }

    #[test]
    fn full_subscriber_channel_drops_without_blocking() {
        let manager = HotSetManager::new(processor(), 5_000);
        let clock = FixedClock::new(Utc::now());
        let _rx = manager.subscribe("scan", 1);
        manager.dispatch(tick(clock.now_ms()), &clock, 0.0, 0.0, &healthy());
        manager.dispatch(tick(clock.now_ms()), &clock, 0.0, 0.0, &healthy());
        assert!(manager.dropped_for("scan") >= 1);
    }

    /// Scenario 9 (hot-set latency SLA): 1000 synthetic fresh ticks through
    /// Process+Serve should clear p99 end-to-end well under the 300ms
    /// budget, with zero stale drops, given a roomy subscriber channel.
    #[test]
    fn thousand_fresh_ticks_clear_latency_sla_with_no_stale_drops() {
        let manager = HotSetManager::new(processor(), 5_000);
        let clock = FixedClock::new(Utc::now());
        let _rx = manager.subscribe("scan", 2_000);

        let mut totals: Vec<f64> = Vec::with_capacity(1_000);
        let health = healthy();
        for _ in 0..1_000 {
            let latency = manager.dispatch(tick(clock.now_ms()), &clock, 0.5, 0.2, &health);
            totals.push(latency.total_ms());
        }

        totals.sort_by(|a, b| a.partial_cmp(b).unwrap());
        let p99 = totals[(totals.len() as f64 * 0.99) as usize];
        assert!(p99 < 300.0, "p99 end-to-end latency {p99}ms exceeded the 300ms SLA");
        assert_eq!(manager.stale_dropped(), 0);
        assert_eq!(manager.dropped_for("scan"), 0);
    }
}
