// =============================================================================
// Data Facade — unified hot + warm + reconciled surface for the scan pipeline
// =============================================================================
//
// Composes venue adapters the way `provider/middleware.rs::ProviderFabric`
// composes middlewares: one registry, looked up by name. `l2_book` only ever
// calls through a `VenueAdapter`, so aggregator sources are unrepresentable
// here by construction (the `AggregatorViolation` path in `venue::guard`
// matters for config-driven sources, not this facade's fixed venue set).

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::ProviderError;
use crate::hotset::HotSetManager;
use crate::reconcile::{reconcile, Reconciled, SourceReading};
use crate::types::{BookL2Snapshot, Kline, ProviderHealth, Trade, Venue};
use crate::venue::VenueAdapter;
use crate::config::ReconcileConfig;

/// Unifies hot (WS) and warm (REST) market data across registered venues,
/// with health-ordered fallback and exchange-native-only L2 books.
pub struct DataFacade {
    adapters: HashMap<Venue, Arc<dyn VenueAdapter>>,
    hot_set: Option<Arc<HotSetManager>>,
    reconcile_config: ReconcileConfig,
}

impl DataFacade {
    pub fn new(reconcile_config: ReconcileConfig) -> Self {
        Self { adapters: HashMap::new(), hot_set: None, reconcile_config }
    }

    pub fn register(&mut self, adapter: Arc<dyn VenueAdapter>) {
        self.adapters.insert(adapter.venue(), adapter);
    }

    pub fn with_hot_set(mut self, hot_set: Arc<HotSetManager>) -> Self {
        self.hot_set = Some(hot_set);
        self
    }

    /// Venues ranked healthiest-first: REST-healthy and WS-connected sorted
    /// ahead of degraded ones, ties broken by lowest p99 latency.
    fn venues_by_health(&self) -> Vec<Venue> {
        let mut ranked: Vec<(Venue, ProviderHealth)> =
            self.adapters.iter().map(|(&v, a)| (v, a.health())).collect();
        ranked.sort_by(|a, b| {
            let a_ok = a.1.rest_healthy as u8;
            let b_ok = b.1.rest_healthy as u8;
            b_ok.cmp(&a_ok).then(a.1.p99_latency_ms.partial_cmp(&b.1.p99_latency_ms).unwrap_or(std::cmp::Ordering::Equal))
        });
        ranked.into_iter().map(|(v, _)| v).collect()
    }

    /// Warm klines with venue failover ordered by health; write-through
    /// caching happens inside each adapter's `ProviderMiddleware`.
    pub async fn warm_klines(&self, symbol: &str, interval: &str, limit: u32) -> Result<Vec<Kline>, ProviderError> {
        let mut last_err = None;
        for venue in self.venues_by_health() {
            let adapter = self.adapters.get(&venue).expect("venue came from adapters map");
            match adapter.get_klines(symbol, interval, limit).await {
                Ok(klines) => return Ok(klines),
                Err(e) => last_err = Some(e),
            }
        }
        Err(last_err.unwrap_or_else(|| ProviderError::InsufficientData {
            symbol: symbol.to_string(),
            reason: "no venue adapters registered".to_string(),
        }))
    }

    pub async fn warm_trades(&self, symbol: &str, limit: u32) -> Result<Vec<Trade>, ProviderError> {
        let mut last_err = None;
        for venue in self.venues_by_health() {
            let adapter = self.adapters.get(&venue).expect("venue came from adapters map");
            match adapter.get_trades(symbol, limit).await {
                Ok(trades) => return Ok(trades),
                Err(e) => last_err = Some(e),
            }
        }
        Err(last_err.unwrap_or_else(|| ProviderError::InsufficientData {
            symbol: symbol.to_string(),
            reason: "no venue adapters registered".to_string(),
        }))
    }

    /// L2 book data can only come from a specific exchange-native venue;
    /// there is no failover since depth/spread are venue-specific truths,
    /// not a consensus value.
    pub async fn l2_book(&self, venue: Venue, symbol: &str, depth: u32) -> Result<BookL2Snapshot, ProviderError> {
        let adapter = self.adapters.get(&venue).ok_or_else(|| ProviderError::AggregatorViolation {
            source: venue.name().to_string(),
            data_type: "L1/L2 microstructure".to_string(),
            reason: "no exchange-native adapter registered for this venue".to_string(),
        })?;
        adapter.get_book_l2(symbol, depth).await
    }

    /// Cross-venue reconciled last-price, fetched in parallel from every
    /// registered venue's warm klines (one-bar lookback).
    pub async fn reconciled_price(&self, symbol: &str) -> Result<Reconciled, ProviderError> {
        let mut futures = Vec::new();
        for (&venue, adapter) in &self.adapters {
            let adapter = adapter.clone();
            let symbol = symbol.to_string();
            futures.push(async move {
                let klines = adapter.get_klines(&symbol, "1h", 1).await.ok()?;
                let price = klines.last()?.close;
                Some(SourceReading { venue, value: price })
            });
        }
        let results = futures_util::future::join_all(futures).await;
        let readings: Vec<SourceReading> = results.into_iter().flatten().collect();
        reconcile(&readings, &self.reconcile_config)
    }

    pub fn health_snapshot(&self) -> Vec<(Venue, ProviderHealth)> {
        self.adapters.iter().map(|(&v, a)| (v, a.health())).collect()
    }

    pub fn hot_set(&self) -> Option<&Arc<HotSetManager>> {
        self.hot_set.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::HealthStatus;
    use async_trait::async_trait;

    struct StubAdapter {
        venue: Venue,
        healthy: bool,
        price: f64,
    }

    #[async_trait]
    impl VenueAdapter for StubAdapter {
        fn venue(&self) -> Venue {
            self.venue
        }
        fn normalize_symbol(&self, canonical: &str) -> String {
            canonical.to_string()
        }
        fn normalize_interval(&self, canonical: &str) -> String {
            canonical.to_string()
        }
        async fn get_klines(&self, symbol: &str, interval: &str, _limit: u32) -> Result<Vec<Kline>, ProviderError> {
            if !self.healthy {
                return Err(ProviderError::TransportError { provider: self.venue.name().to_string(), message: "down".into() });
            }
            Ok(vec![Kline {
                symbol: symbol.to_string(),
                venue: self.venue,
                ts: 0,
                interval: interval.to_string(),
                open: self.price,
                high: self.price,
                low: self.price,
                close: self.price,
                volume: 1.0,
                quote_volume: 0.0,
            }])
        }
        async fn get_trades(&self, _symbol: &str, _limit: u32) -> Result<Vec<Trade>, ProviderError> {
            Ok(Vec::new())
        }
        async fn get_book_l2(&self, symbol: &str, _depth: u32) -> Result<BookL2Snapshot, ProviderError> {
            BookL2Snapshot::new(symbol, self.venue, 0, Vec::new(), Vec::new(), 1)
                .ok_or_else(|| ProviderError::TransportError { provider: self.venue.name().to_string(), message: "empty book".into() })
        }
        fn health(&self) -> ProviderHealth {
            ProviderHealth {
                status: if self.healthy { HealthStatus::Healthy } else { HealthStatus::Unhealthy },
                last_seen: 0,
                error_rate: 0.0,
                p99_latency_ms: if self.healthy { 50.0 } else { 5000.0 },
                ws_connected: self.healthy,
                rest_healthy: self.healthy,
            }
        }
    }

    #[tokio::test]
    async fn warm_klines_fails_over_to_next_healthy_venue() {
        let mut facade = DataFacade::new(ReconcileConfig::default());
        facade.register(Arc::new(StubAdapter { venue: Venue::Binance, healthy: false, price: 100.0 }));
        facade.register(Arc::new(StubAdapter { venue: Venue::Kraken, healthy: true, price: 101.0 }));
        let klines = facade.warm_klines("BTCUSD", "1h", 1).await.unwrap();
        assert_eq!(klines[0].venue, Venue::Kraken);
    }

    #[tokio::test]
    async fn reconciled_price_combines_multiple_venues() {
        let mut facade = DataFacade::new(ReconcileConfig::default());
        facade.register(Arc::new(StubAdapter { venue: Venue::Binance, healthy: true, price: 100.0 }));
        facade.register(Arc::new(StubAdapter { venue: Venue::Kraken, healthy: true, price: 100.2 }));
        let reconciled = facade.reconciled_price("BTCUSD").await.unwrap();
        assert!(reconciled.sources_used == 2);
    }
}
