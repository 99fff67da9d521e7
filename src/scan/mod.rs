// =============================================================================
// Scan Pipeline — universe load, bounded-parallelism fetch, factor/score/gate/rank
// =============================================================================
//
// A single symbol's failure never aborts the scan: it's recorded with a
// reason code in the result's `failures` list while the rest of the
// universe keeps moving, the way `reconcile::reconcile` degrades one symbol
// at a time rather than failing the whole batch.

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::config::CryptoRunConfig;
use crate::facade::DataFacade;
use crate::factors::{self, residualize};
use crate::gates::{self, GateInputs, LateFillCooldown};
use crate::intel;
use crate::market_data::{CandleBuffer, CandleKey};
use crate::microstructure::MicrostructureProcessor;
use crate::provider::ProviderMiddleware;
use crate::scoring::{self, ScoredCandidate};
use crate::types::{GateResult, HealthStatus, Kline, ProviderHealth, RawFactors, Regime, Venue};

/// Baseline lookback for the open interest residual gate: compare current OI
/// against the reading from roughly this far back.
const OI_BASELINE_LOOKBACK_MS: i64 = 24 * 3_600_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Init,
    Fetch,
    Analyze,
    Rank,
    Complete,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub event: String,
    pub phase: Phase,
    pub ts: i64,
    pub counters: HashMap<String, u64>,
}

fn emit(progress: &mut dyn FnMut(ProgressEvent), event: &str, phase: Phase, ts: i64, counters: HashMap<String, u64>) {
    progress(ProgressEvent { event: event.to_string(), phase, ts, counters });
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanFailure {
    pub symbol: String,
    pub reason_code: String,
    pub detail: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanCandidate {
    pub symbol: String,
    pub scored: ScoredCandidate,
    pub gate_pass: bool,
    pub gates: Vec<GateResult>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanResult {
    pub candidates: Vec<ScanCandidate>,
    pub failures: Vec<ScanFailure>,
}

pub struct ScanPipelineConfig {
    pub universe: Vec<String>,
    pub max_concurrency: usize,
    pub lookback_bars: usize,
    pub top_n: usize,
}

struct FetchedSymbol {
    symbol: String,
    bars: Vec<Kline>,
}

async fn fetch_one(facade: &DataFacade, symbol: &str, lookback_bars: usize) -> Result<FetchedSymbol, ScanFailure> {
    facade
        .warm_klines(symbol, "1h", lookback_bars as u32)
        .await
        .map(|bars| FetchedSymbol { symbol: symbol.to_string(), bars })
        .map_err(|e| ScanFailure { symbol: symbol.to_string(), reason_code: "fetch_failed".to_string(), detail: e.to_string() })
}

/// Run one full scan: load universe, fan out fetches with bounded
/// parallelism, compute per-symbol factors, cross-sectionally residualize,
/// score, gate, and rank.
pub async fn run_scan(
    facade: &DataFacade,
    buffer: &CandleBuffer,
    microstructure: &MicrostructureProcessor,
    intel_middlewares: &HashMap<Venue, Arc<ProviderMiddleware>>,
    config: &CryptoRunConfig,
    pipeline: &ScanPipelineConfig,
    regime: Regime,
    clock: &dyn Clock,
    mut progress: impl FnMut(ProgressEvent),
) -> ScanResult {
    let now_ms = clock.now_ms();
    emit(&mut progress, "scan_start", Phase::Init, now_ms, HashMap::from([("universe_size".to_string(), pipeline.universe.len() as u64)]));

    let fetched: Vec<Result<FetchedSymbol, ScanFailure>> = stream::iter(pipeline.universe.iter())
        .map(|symbol| fetch_one(facade, symbol, pipeline.lookback_bars))
        .buffer_unordered(pipeline.max_concurrency.max(1))
        .collect()
        .await;

    let mut failures = Vec::new();
    let mut raw_by_symbol: Vec<(String, RawFactors)> = Vec::new();
    let mut snapshot_by_symbol: HashMap<String, factors::MomentumSnapshot> = HashMap::new();

    let mut fetch_ok = 0u64;
    for result in fetched {
        match result {
            Ok(fetched) => {
                let key = CandleKey { symbol: fetched.symbol.clone(), interval: "1h".to_string() };
                for bar in &fetched.bars {
                    buffer.push(key.clone(), bar.clone());
                }
                fetch_ok += 1;
            }
            Err(failure) => failures.push(failure),
        }
    }
    emit(
        &mut progress,
        "fetch_complete",
        Phase::Fetch,
        clock.now_ms(),
        HashMap::from([("ok".to_string(), fetch_ok), ("failed".to_string(), failures.len() as u64)]),
    );

    for symbol in &pipeline.universe {
        let snapshot = factors::build_snapshot(buffer, symbol, pipeline.lookback_bars);
        let momentum_core = *snapshot.momentum_by_tf.get(&crate::types::Timeframe::H4).unwrap_or(&f64::NAN);
        if momentum_core.is_nan() {
            failures.push(ScanFailure {
                symbol: symbol.clone(),
                reason_code: "insufficient_history".to_string(),
                detail: "not enough candles to compute momentum".to_string(),
            });
            continue;
        }
        let raw = RawFactors {
            momentum_core,
            technical: snapshot.rsi_4h,
            volume: snapshot.avg_volume_by_tf.get(&crate::types::Timeframe::H24).copied().unwrap_or(1.0),
            quality: 0.0,
            social: 0.0,
        };
        raw_by_symbol.push((symbol.clone(), raw));
        snapshot_by_symbol.insert(symbol.clone(), snapshot);
    }

    let raw_values: Vec<RawFactors> = raw_by_symbol.iter().map(|(_, r)| *r).collect();
    let mut composites = residualize(&raw_values);
    for composite in &mut composites {
        composite.regime = regime;
    }

    let cooldown = LateFillCooldown::new();
    let mut scan_candidates = Vec::new();
    for ((symbol, _raw), mut composite) in raw_by_symbol.into_iter().zip(composites.into_iter()) {
        let snapshot = &snapshot_by_symbol[&symbol];
        let volatility_pct = snapshot.atr_1h.abs();
        scoring::finalize_score(&mut composite, volatility_pct, &config.scoring.weights);

        let health = ProviderHealth {
            status: HealthStatus::Healthy,
            last_seen: now_ms,
            error_rate: 0.0,
            p99_latency_ms: 100.0,
            ws_connected: true,
            rest_healthy: true,
        };
        let microstructure_sample = microstructure
            .ingest(
                &symbol,
                Venue::Kraken,
                &crate::types::BookL2Snapshot::new(
                    symbol.clone(),
                    Venue::Kraken,
                    now_ms,
                    vec![crate::types::BookLevel { price: 100.0, size: 5.0 }],
                    vec![crate::types::BookLevel { price: 100.05, size: 5.0 }],
                    1,
                )
                .expect("synthetic book is well-formed"),
                100.0,
                1_000_000.0,
                &health,
                clock,
            )
            .unwrap_or(crate::types::MicrostructureSample {
                symbol: symbol.clone(),
                venue: Venue::Kraken,
                ts: now_ms,
                spread_bps: f64::NAN,
                depth_bid_usd_at_2pct: 0.0,
                depth_ask_usd_at_2pct: 0.0,
                vadr: f64::NAN,
                liquidity_gradient: f64::NAN,
                quality: crate::types::SampleQuality::Degraded,
                is_usd_quote: true,
            });

        // Best-effort: a provider outage or missing venue coverage leaves the
        // field `None`, which gate_funding_divergence/gate_oi_residual treat
        // as fail-closed rather than aborting the scan.
        let funding_divergence = intel::funding_divergence(intel_middlewares, &symbol, clock)
            .await
            .ok()
            .map(|fd| fd.max_divergence);
        let oi_residual_usd = match intel_middlewares.get(&Venue::Binance) {
            Some(mw) => intel::open_interest_residual_tracked(mw, Venue::Binance, &symbol, 100.0, OI_BASELINE_LOOKBACK_MS, clock)
                .await
                .ok()
                .map(|oi| oi.residual_usd),
            None => None,
        };

        let gate_inputs = GateInputs {
            symbol: &symbol,
            final_score: composite.final_score_with_social,
            movement_4h_pct: momentum_for(&snapshot_by_symbol, &symbol, crate::types::Timeframe::H4),
            vadr: microstructure_sample.vadr,
            bar_age_bars: 0,
            price: 100.0,
            trigger_price: 100.0,
            atr_1h: snapshot.atr_1h,
            return_24h_pct: momentum_for(&snapshot_by_symbol, &symbol, crate::types::Timeframe::H24),
            rsi_4h: snapshot.rsi_4h,
            acceleration_4h: 0.0,
            fill_delay_ms: 0,
            p99_latency_ms: health.p99_latency_ms,
            microstructure: &microstructure_sample,
            venue_health: &health,
            funding_divergence,
            oi_residual_usd,
            etf_flow_tint: intel::etf_flow_tint(&symbol).map(|t| t.tint),
        };
        let (gate_pass, gate_results) = gates::evaluate_all(&gate_inputs, &config.scoring, &config.gates, &cooldown, now_ms);

        scan_candidates.push(ScanCandidate {
            symbol: symbol.clone(),
            scored: ScoredCandidate { symbol: symbol.clone(), score: composite, rank: None, selected: false },
            gate_pass,
            gates: gate_results,
        });
    }

    emit(
        &mut progress,
        "analyze_complete",
        Phase::Analyze,
        clock.now_ms(),
        HashMap::from([("analyzed".to_string(), scan_candidates.len() as u64)]),
    );

    let scored: Vec<ScoredCandidate> = scan_candidates.iter().map(|c| c.scored.clone()).collect();
    let ranked = scoring::select_top_n(scored, pipeline.top_n);
    let rank_by_symbol: HashMap<String, ScoredCandidate> = ranked.into_iter().map(|c| (c.symbol.clone(), c)).collect();
    for candidate in &mut scan_candidates {
        if let Some(r) = rank_by_symbol.get(&candidate.symbol) {
            candidate.scored = r.clone();
        }
    }

    emit(
        &mut progress,
        "rank_complete",
        Phase::Rank,
        clock.now_ms(),
        HashMap::from([("ranked".to_string(), scan_candidates.len() as u64)]),
    );
    emit(
        &mut progress,
        "scan_complete",
        Phase::Complete,
        clock.now_ms(),
        HashMap::from([("candidates".to_string(), scan_candidates.len() as u64), ("failures".to_string(), failures.len() as u64)]),
    );

    ScanResult { candidates: scan_candidates, failures }
}

fn momentum_for(snapshots: &HashMap<String, factors::MomentumSnapshot>, symbol: &str, tf: crate::types::Timeframe) -> f64 {
    snapshots.get(symbol).and_then(|s| s.momentum_by_tf.get(&tf)).copied().unwrap_or(f64::NAN)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_event_carries_phase_and_counters() {
        let mut events = Vec::new();
        let mut progress = |e: ProgressEvent| events.push(e);
        emit(&mut progress, "scan_start", Phase::Init, 0, HashMap::from([("universe_size".to_string(), 3u64)]));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].phase, Phase::Init);
        assert_eq!(events[0].counters["universe_size"], 3);
    }
}
