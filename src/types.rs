// =============================================================================
// Core data model shared across the scan pipeline
// =============================================================================

use serde::{Deserialize, Serialize};

/// Canonical trade side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

/// Exchange-native venues this crate is allowed to source microstructure from.
///
/// Deliberately closed: adding a venue means editing this enum, which is the
/// "aggregator ban as a type-system obligation" from the design notes. There
/// is no `Aggregator(String)` variant here on purpose — aggregator sources
/// are modeled separately in [`Source`] and can never reach a function that
/// expects a `Venue`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Venue {
    Kraken,
    Binance,
    Coinbase,
    Okx,
}

impl Venue {
    pub fn all() -> &'static [Venue] {
        &[Venue::Kraken, Venue::Binance, Venue::Coinbase, Venue::Okx]
    }

    pub fn name(self) -> &'static str {
        match self {
            Venue::Kraken => "kraken",
            Venue::Binance => "binance",
            Venue::Coinbase => "coinbase",
            Venue::Okx => "okx",
        }
    }
}

impl std::fmt::Display for Venue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Any price/data source, exchange-native or aggregator. Microstructure code
/// must never accept this type directly -- see [`crate::venue::guard`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Source {
    ExchangeNative(Venue),
    Aggregator(String),
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Source::ExchangeNative(v) => write!(f, "{v}"),
            Source::Aggregator(name) => write!(f, "{name}"),
        }
    }
}

/// A market regime used purely to select a factor-weight profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Regime {
    Bull,
    Choppy,
    HighVol,
}

impl std::fmt::Display for Regime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Regime::Bull => write!(f, "bull"),
            Regime::Choppy => write!(f, "choppy"),
            Regime::HighVol => write!(f, "high_vol"),
        }
    }
}

/// Canonical trading timeframe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Timeframe {
    H1,
    H4,
    H12,
    H24,
    D7,
}

impl Timeframe {
    pub const ALL: [Timeframe; 5] = [
        Timeframe::H1,
        Timeframe::H4,
        Timeframe::H12,
        Timeframe::H24,
        Timeframe::D7,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Timeframe::H1 => "1h",
            Timeframe::H4 => "4h",
            Timeframe::H12 => "12h",
            Timeframe::H24 => "24h",
            Timeframe::D7 => "7d",
        }
    }

    /// Minimum number of 1h bars required to compute momentum over this
    /// timeframe.
    pub fn min_bars(self) -> usize {
        match self {
            Timeframe::H1 => 2,
            Timeframe::H4 => 5,
            Timeframe::H12 => 13,
            Timeframe::H24 => 25,
            Timeframe::D7 => 169,
        }
    }
}

/// Canonical symbol (e.g. `BTCUSD`). Quote currency must be USD-class.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Pair {
    pub canonical: String,
}

const USD_CLASS_QUOTES: &[&str] = &["USD", "USDT", "USDC"];

impl Pair {
    /// Construct a canonical pair, rejecting non-USD-class quote currencies.
    pub fn new(canonical: impl Into<String>) -> Option<Self> {
        let canonical = canonical.into().to_uppercase();
        if USD_CLASS_QUOTES
            .iter()
            .any(|q| canonical.ends_with(q) && canonical.len() > q.len())
        {
            Some(Self { canonical })
        } else {
            None
        }
    }
}

/// OHLCV kline. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Kline {
    pub symbol: String,
    pub venue: Venue,
    pub ts: i64,
    pub interval: String,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub quote_volume: f64,
}

impl Kline {
    /// Validate the invariants from the data model: `high >= max(open,close)`,
    /// `low <= min(open,close)`, `volume >= 0`.
    pub fn is_valid(&self) -> bool {
        self.high >= self.open.max(self.close)
            && self.low <= self.open.min(self.close)
            && self.volume >= 0.0
    }
}

/// A single executed trade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub symbol: String,
    pub venue: Venue,
    pub ts: i64,
    pub price: f64,
    pub size: f64,
    pub side: Side,
    pub trade_id: String,
}

/// A single price level.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BookLevel {
    pub price: f64,
    pub size: f64,
}

/// Level-2 order book snapshot. `bids` descending by price, `asks` ascending.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookL2Snapshot {
    pub symbol: String,
    pub venue: Venue,
    pub ts: i64,
    pub bids: Vec<BookLevel>,
    pub asks: Vec<BookLevel>,
    pub sequence: u64,
}

impl BookL2Snapshot {
    /// Construct a snapshot, rejecting it if `best_ask <= best_bid`.
    pub fn new(
        symbol: impl Into<String>,
        venue: Venue,
        ts: i64,
        bids: Vec<BookLevel>,
        asks: Vec<BookLevel>,
        sequence: u64,
    ) -> Option<Self> {
        let best_bid = bids.first()?.price;
        let best_ask = asks.first()?.price;
        if best_ask <= best_bid {
            return None;
        }
        Some(Self {
            symbol: symbol.into(),
            venue,
            ts,
            bids,
            asks,
            sequence,
        })
    }

    pub fn best_bid(&self) -> Option<f64> {
        self.bids.first().map(|l| l.price)
    }

    pub fn best_ask(&self) -> Option<f64> {
        self.asks.first().map(|l| l.price)
    }
}

/// Data-quality tier for a microstructure sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleQuality {
    Excellent,
    Good,
    Degraded,
}

/// Canonical normalized tick, the output of the Hot Set Manager's Normalize
/// stage regardless of which venue's wire format it started as.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TickUpdate {
    pub venue: Venue,
    pub symbol: String,
    pub ts: i64,
    pub bid: f64,
    pub ask: f64,
    pub bid_size: f64,
    pub ask_size: f64,
    pub last_price: f64,
    pub volume_24h: f64,
}

/// Real-time microstructure read for a symbol on one venue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MicrostructureSample {
    pub symbol: String,
    pub venue: Venue,
    pub ts: i64,
    pub spread_bps: f64,
    pub depth_bid_usd_at_2pct: f64,
    pub depth_ask_usd_at_2pct: f64,
    pub vadr: f64,
    pub liquidity_gradient: f64,
    pub quality: SampleQuality,
    pub is_usd_quote: bool,
}

impl MicrostructureSample {
    /// A sample with `spread_bps >= 1000` is corrupt and must be rejected.
    pub fn is_valid(&self) -> bool {
        self.spread_bps.is_finite() && self.spread_bps < 1000.0
    }
}

/// Raw, pre-residualization factor values.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RawFactors {
    pub momentum_core: f64,
    pub technical: f64,
    pub volume: f64,
    pub quality: f64,
    pub social: f64,
}

impl RawFactors {
    /// Social is externally capped at +10 before residualization.
    pub fn social_capped(&self) -> f64 {
        self.social.min(10.0)
    }
}

/// Fully composed, regime-aware score for a symbol.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CompositeScore {
    pub momentum_core: f64,
    pub technical_resid: f64,
    pub volume_resid: f64,
    pub quality_resid: f64,
    pub social_resid_capped: f64,
    pub final_score_with_social: f64,
    pub regime: Regime,
}

/// The verdict from a single entry gate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateResult {
    pub gate_name: String,
    pub pass: bool,
    pub reason: String,
    pub metric_value: f64,
    pub threshold: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fix_hint: Option<String>,
}

/// Context carried into the exit evaluator for a held position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExitInputs {
    pub symbol: String,
    pub entry_price: f64,
    pub entry_time: i64,
    pub current_price: f64,
    pub now: i64,
    pub atr_1h: f64,
    pub high_water_mark: f64,
    pub venue_health: ProviderHealth,
    pub momentum_1h: f64,
    pub momentum_4h: f64,
    pub acceleration_4h: f64,
}

impl ExitInputs {
    pub fn hours_held(&self) -> f64 {
        (self.now - self.entry_time) as f64 / 3_600_000.0
    }

    pub fn unrealized_pnl_pct(&self) -> f64 {
        ((self.current_price - self.entry_price) / self.entry_price) * 100.0
    }
}

/// Health status reported by a venue adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ProviderHealth {
    pub status: HealthStatus,
    pub last_seen: i64,
    pub error_rate: f64,
    pub p99_latency_ms: f64,
    pub ws_connected: bool,
    pub rest_healthy: bool,
}

impl ProviderHealth {
    /// Degraded per the exit evaluator's venue-health gate: p99 > 2s, error
    /// rate > 3%, or an explicit degraded/unhealthy status.
    pub fn is_degraded(&self) -> bool {
        self.status != HealthStatus::Healthy
            || self.p99_latency_ms > 2000.0
            || self.error_rate > 0.03
    }
}

/// Cache tier; determines TTL policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheTier {
    Hot,
    Warm,
    Cold,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub payload: serde_json::Value,
    pub expires_at: i64,
    pub tier: CacheTier,
    pub compressed: bool,
}

/// Append-only point-in-time snapshot used for deterministic replay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PitSnapshot {
    pub key: String,
    pub payload: serde_json::Value,
    pub captured_at: i64,
    pub source: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BudgetSnapshot {
    pub used_today: u64,
    pub used_month: u64,
    pub limit_day: u64,
    pub limit_month: u64,
    pub warn_at_ratio: f64,
    pub exhausted: bool,
    pub reset_eta: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pair_rejects_non_usd_quote() {
        assert!(Pair::new("BTCUSD").is_some());
        assert!(Pair::new("BTCUSDT").is_some());
        assert!(Pair::new("BTCEUR").is_none());
    }

    #[test]
    fn kline_invariants() {
        let k = Kline {
            symbol: "BTCUSD".into(),
            venue: Venue::Kraken,
            ts: 0,
            interval: "1h".into(),
            open: 100.0,
            high: 105.0,
            low: 95.0,
            close: 102.0,
            volume: 10.0,
            quote_volume: 1000.0,
        };
        assert!(k.is_valid());
        let mut bad = k.clone();
        bad.high = 99.0;
        assert!(!bad.is_valid());
    }

    #[test]
    fn book_snapshot_rejects_crossed_book() {
        let bids = vec![BookLevel { price: 100.0, size: 1.0 }];
        let asks = vec![BookLevel { price: 99.0, size: 1.0 }];
        assert!(BookL2Snapshot::new("BTCUSD", Venue::Kraken, 0, bids, asks, 1).is_none());
    }

    #[test]
    fn microstructure_sample_rejects_wide_spread() {
        let sample = MicrostructureSample {
            symbol: "BTCUSD".into(),
            venue: Venue::Kraken,
            ts: 0,
            spread_bps: 1200.0,
            depth_bid_usd_at_2pct: 1.0,
            depth_ask_usd_at_2pct: 1.0,
            vadr: 1.0,
            liquidity_gradient: 1.0,
            quality: SampleQuality::Degraded,
            is_usd_quote: true,
        };
        assert!(!sample.is_valid());
    }

    #[test]
    fn social_capped_clamps_above_ten() {
        let raw = RawFactors {
            momentum_core: 0.0,
            technical: 0.0,
            volume: 0.0,
            quality: 0.0,
            social: 42.0,
        };
        assert_eq!(raw.social_capped(), 10.0);
    }
}
