// =============================================================================
// Entry Gate Stack — ten precedence-ordered gates, evaluate-all-for-explain
// =============================================================================
//
// Grounded on the teacher's `risk.rs::can_trade` pattern of "evaluate several
// breakers, return the first tripped reason", generalized so every gate
// still runs even after one fails: the explain report needs all ten
// verdicts, while the overall pass decision is simply "did any gate fail".

mod late_fill;

pub use late_fill::LateFillCooldown;

use crate::config::GateConfig;
use crate::microstructure;
use crate::types::{GateResult, HealthStatus, MicrostructureSample, ProviderHealth};

/// Everything the gate stack needs for one candidate, collected up front so
/// every gate function stays a pure, independently testable check.
pub struct GateInputs<'a> {
    pub symbol: &'a str,
    pub final_score: f64,
    pub movement_4h_pct: f64,
    pub vadr: f64,
    pub bar_age_bars: u32,
    pub price: f64,
    pub trigger_price: f64,
    pub atr_1h: f64,
    pub return_24h_pct: f64,
    pub rsi_4h: f64,
    pub acceleration_4h: f64,
    pub fill_delay_ms: u64,
    pub p99_latency_ms: f64,
    pub microstructure: &'a MicrostructureSample,
    pub venue_health: &'a ProviderHealth,
    /// `None` when the provider couldn't supply a reading; the gate fails.
    pub funding_divergence: Option<f64>,
    pub oi_residual_usd: Option<f64>,
    /// `None` when the symbol has no associated ETF; the gate is not
    /// applicable and passes vacuously.
    pub etf_flow_tint: Option<f64>,
}

fn result(name: &str, pass: bool, reason: String, value: f64, threshold: f64, fix_hint: Option<String>) -> GateResult {
    GateResult { gate_name: name.to_string(), pass, reason, metric_value: value, threshold, fix_hint }
}

fn gate_score_threshold(inputs: &GateInputs, cfg: &crate::config::ScoringConfig) -> GateResult {
    let pass = inputs.final_score >= cfg.score_entry_threshold;
    result(
        "score_threshold",
        pass,
        format!("final score {:.2} vs threshold {:.2}", inputs.final_score, cfg.score_entry_threshold),
        inputs.final_score,
        cfg.score_entry_threshold,
        (!pass).then(|| "wait for a stronger composite score before entry".to_string()),
    )
}

fn gate_movement(inputs: &GateInputs, cfg: &GateConfig) -> GateResult {
    let magnitude = inputs.movement_4h_pct.abs();
    let pass = magnitude >= cfg.movement_pct;
    result(
        "movement",
        pass,
        format!("|4h move| {:.2}% vs min {:.2}%", magnitude, cfg.movement_pct),
        magnitude,
        cfg.movement_pct,
        (!pass).then(|| "wait for a larger 4h price move".to_string()),
    )
}

fn gate_vadr(inputs: &GateInputs, cfg: &GateConfig) -> GateResult {
    let pass = inputs.vadr.is_finite() && inputs.vadr >= cfg.vadr_min;
    result(
        "vadr",
        pass,
        format!("VADR {:.3} vs min {:.3}", inputs.vadr, cfg.vadr_min),
        inputs.vadr,
        cfg.vadr_min,
        (!pass).then(|| "volume-adjusted daily range too thin".to_string()),
    )
}

fn gate_freshness(inputs: &GateInputs, cfg: &GateConfig) -> GateResult {
    let bars_ok = inputs.bar_age_bars <= cfg.freshness_max_bars;
    let price_distance = if inputs.atr_1h > 0.0 {
        (inputs.price - inputs.trigger_price).abs() / inputs.atr_1h
    } else {
        f64::INFINITY
    };
    let distance_ok = price_distance <= cfg.freshness_atr_mult;
    let pass = bars_ok && distance_ok;
    result(
        "freshness",
        pass,
        format!(
            "bar age {} (max {}), price distance {:.2}x ATR (max {:.2}x)",
            inputs.bar_age_bars, cfg.freshness_max_bars, price_distance, cfg.freshness_atr_mult
        ),
        price_distance,
        cfg.freshness_atr_mult,
        (!pass).then(|| "signal has gone stale; re-trigger on a fresh bar".to_string()),
    )
}

fn gate_fatigue(inputs: &GateInputs, cfg: &GateConfig) -> GateResult {
    let overextended = inputs.return_24h_pct > cfg.fatigue_return_pct && inputs.rsi_4h > cfg.fatigue_rsi;
    let pass = !overextended || inputs.acceleration_4h > 0.0;
    result(
        "fatigue",
        pass,
        format!(
            "24h return {:.2}% (limit {:.2}%), RSI4h {:.2} (limit {:.2}), 4h accel {:.4}",
            inputs.return_24h_pct, cfg.fatigue_return_pct, inputs.rsi_4h, cfg.fatigue_rsi, inputs.acceleration_4h
        ),
        inputs.return_24h_pct,
        cfg.fatigue_return_pct,
        (!pass).then(|| "move is overextended without renewed acceleration".to_string()),
    )
}

fn gate_late_fill(inputs: &GateInputs, cfg: &GateConfig, cooldown: &LateFillCooldown, now_ms: i64) -> GateResult {
    let base = cfg.late_fill_base_ms;
    let grace_ceiling = base + cfg.late_fill_grace_ms;

    let pass = if inputs.fill_delay_ms <= base {
        true
    } else if inputs.fill_delay_ms <= grace_ceiling
        && inputs.p99_latency_ms > cfg.p99_threshold_ms
        && cooldown.can_relax(inputs.symbol, now_ms, cfg.late_fill_cooldown_ms)
    {
        cooldown.record_relax(inputs.symbol, now_ms);
        true
    } else {
        false
    };

    result(
        "late_fill",
        pass,
        format!(
            "fill delay {}ms (base {}ms, grace ceiling {}ms), p99 {:.0}ms (threshold {:.0}ms)",
            inputs.fill_delay_ms, base, grace_ceiling, inputs.p99_latency_ms, cfg.p99_threshold_ms
        ),
        inputs.fill_delay_ms as f64,
        base as f64,
        (!pass).then(|| "fill arrived too late and no relaxation window is available".to_string()),
    )
}

fn gate_liquidity(inputs: &GateInputs, cfg: &GateConfig) -> GateResult {
    let gates = microstructure::evaluate_gates(
        inputs.microstructure,
        inputs.venue_health,
        cfg.spread_max_bps,
        cfg.depth_min_usd,
        cfg.vadr_min,
    );
    let pass = gates.spread_ok && gates.depth_ok;
    let min_depth = inputs.microstructure.depth_bid_usd_at_2pct.min(inputs.microstructure.depth_ask_usd_at_2pct);
    result(
        "liquidity",
        pass,
        format!(
            "spread {:.1}bps (max {:.1}), depth@2% ${:.0} (min ${:.0})",
            inputs.microstructure.spread_bps, cfg.spread_max_bps, min_depth, cfg.depth_min_usd
        ),
        min_depth,
        cfg.depth_min_usd,
        (!pass).then(|| "exchange-native spread or depth insufficient".to_string()),
    )
}

fn gate_funding_divergence(inputs: &GateInputs, cfg: &GateConfig) -> GateResult {
    match inputs.funding_divergence {
        Some(divergence) => {
            let pass = divergence >= cfg.funding_divergence_min;
            result(
                "funding_divergence",
                pass,
                format!("max divergence {:.3} vs min {:.3}", divergence, cfg.funding_divergence_min),
                divergence,
                cfg.funding_divergence_min,
                (!pass).then(|| "funding rates too aligned across venues".to_string()),
            )
        }
        None => result(
            "funding_divergence",
            false,
            "funding divergence data unavailable".to_string(),
            0.0,
            cfg.funding_divergence_min,
            Some("no venue reported a funding rate for this symbol".to_string()),
        ),
    }
}

fn gate_oi_residual(inputs: &GateInputs, cfg: &GateConfig) -> GateResult {
    match inputs.oi_residual_usd {
        Some(residual) => {
            let pass = residual >= cfg.oi_residual_min_usd;
            result(
                "oi_residual",
                pass,
                format!("OI residual ${:.0} vs min ${:.0}", residual, cfg.oi_residual_min_usd),
                residual,
                cfg.oi_residual_min_usd,
                (!pass).then(|| "open interest hasn't moved enough above baseline".to_string()),
            )
        }
        None => result(
            "oi_residual",
            false,
            "open interest data unavailable".to_string(),
            0.0,
            cfg.oi_residual_min_usd,
            Some("venue does not publish open interest for this symbol".to_string()),
        ),
    }
}

fn gate_etf_flow(inputs: &GateInputs, cfg: &GateConfig) -> GateResult {
    match inputs.etf_flow_tint {
        Some(tint) => {
            let pass = tint >= cfg.etf_flow_tint_min;
            result(
                "etf_flow",
                pass,
                format!("ETF flow tint {:.3} vs min {:.3}", tint, cfg.etf_flow_tint_min),
                tint,
                cfg.etf_flow_tint_min,
                (!pass).then(|| "ETF flow tint not bullish enough".to_string()),
            )
        }
        // No associated ETF: not applicable, passes vacuously.
        None => result("etf_flow", true, "no ETF tracks this symbol; gate not applicable".to_string(), 0.0, cfg.etf_flow_tint_min, None),
    }
}

/// Evaluate all ten gates in precedence order. Every gate is evaluated
/// regardless of earlier failures (for the explain report); the overall pass
/// decision is "did every gate pass".
pub fn evaluate_all(
    inputs: &GateInputs,
    scoring_cfg: &crate::config::ScoringConfig,
    gate_cfg: &GateConfig,
    cooldown: &LateFillCooldown,
    now_ms: i64,
) -> (bool, Vec<GateResult>) {
    let results = vec![
        gate_score_threshold(inputs, scoring_cfg),
        gate_movement(inputs, gate_cfg),
        gate_vadr(inputs, gate_cfg),
        gate_freshness(inputs, gate_cfg),
        gate_fatigue(inputs, gate_cfg),
        gate_late_fill(inputs, gate_cfg, cooldown, now_ms),
        gate_liquidity(inputs, gate_cfg),
        gate_funding_divergence(inputs, gate_cfg),
        gate_oi_residual(inputs, gate_cfg),
        gate_etf_flow(inputs, gate_cfg),
    ];
    let overall_pass = results.iter().all(|r| r.pass);
    (overall_pass, results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{SampleQuality, Venue};

    fn healthy() -> ProviderHealth {
        ProviderHealth {
            status: HealthStatus::Healthy,
            last_seen: 0,
            error_rate: 0.0,
            p99_latency_ms: 100.0,
            ws_connected: true,
            rest_healthy: true,
        }
    }

    fn good_sample() -> MicrostructureSample {
        MicrostructureSample {
            symbol: "BTCUSD".to_string(),
            venue: Venue::Kraken,
            ts: 0,
            spread_bps: 10.0,
            depth_bid_usd_at_2pct: 200_000.0,
            depth_ask_usd_at_2pct: 200_000.0,
            vadr: 2.0,
            liquidity_gradient: 1.0,
            quality: SampleQuality::Excellent,
            is_usd_quote: true,
        }
    }

    fn passing_inputs<'a>(health: &'a ProviderHealth, sample: &'a MicrostructureSample) -> GateInputs<'a> {
        GateInputs {
            symbol: "BTCUSD",
            final_score: 80.0,
            movement_4h_pct: 4.0,
            vadr: 2.0,
            bar_age_bars: 1,
            price: 100.0,
            trigger_price: 100.0,
            atr_1h: 2.0,
            return_24h_pct: 5.0,
            rsi_4h: 50.0,
            acceleration_4h: 0.1,
            fill_delay_ms: 1_000,
            p99_latency_ms: 100.0,
            microstructure: sample,
            venue_health: health,
            funding_divergence: Some(3.0),
            oi_residual_usd: Some(2_000_000.0),
            etf_flow_tint: None,
        }
    }

    #[test]
    fn all_gates_pass_for_clean_candidate() {
        let health = healthy();
        let sample = good_sample();
        let inputs = passing_inputs(&health, &sample);
        let scoring_cfg = crate::config::ScoringConfig::default();
        let gate_cfg = GateConfig::default();
        let cooldown = LateFillCooldown::new();
        let (pass, results) = evaluate_all(&inputs, &scoring_cfg, &gate_cfg, &cooldown, 0);
        assert!(pass);
        assert_eq!(results.len(), 10);
    }

    #[test]
    fn failure_does_not_short_circuit_remaining_gates() {
        let health = healthy();
        let sample = good_sample();
        let mut inputs = passing_inputs(&health, &sample);
        inputs.final_score = 10.0; // fails gate 1
        let scoring_cfg = crate::config::ScoringConfig::default();
        let gate_cfg = GateConfig::default();
        let cooldown = LateFillCooldown::new();
        let (pass, results) = evaluate_all(&inputs, &scoring_cfg, &gate_cfg, &cooldown, 0);
        assert!(!pass);
        assert_eq!(results.len(), 10, "all ten gates must still run for the explain report");
        assert!(!results[0].pass);
        assert!(results[1].pass); // movement still independently evaluated and passing
    }

    #[test]
    fn fatigue_blocks_overextended_move_without_acceleration() {
        let health = healthy();
        let sample = good_sample();
        let mut inputs = passing_inputs(&health, &sample);
        inputs.return_24h_pct = 15.0;
        inputs.rsi_4h = 75.0;
        inputs.acceleration_4h = -0.1;
        let gate_cfg = GateConfig::default();
        let result = gate_fatigue(&inputs, &gate_cfg);
        assert!(!result.pass);
    }

    #[test]
    fn fatigue_allows_overextended_move_with_acceleration() {
        let health = healthy();
        let sample = good_sample();
        let mut inputs = passing_inputs(&health, &sample);
        inputs.return_24h_pct = 15.0;
        inputs.rsi_4h = 75.0;
        inputs.acceleration_4h = 0.5;
        let gate_cfg = GateConfig::default();
        let result = gate_fatigue(&inputs, &gate_cfg);
        assert!(result.pass);
    }

    #[test]
    fn late_fill_blocks_beyond_grace_ceiling() {
        let health = healthy();
        let sample = good_sample();
        let mut inputs = passing_inputs(&health, &sample);
        inputs.fill_delay_ms = 70_000;
        inputs.p99_latency_ms = 500.0;
        let gate_cfg = GateConfig::default();
        let cooldown = LateFillCooldown::new();
        let result = gate_late_fill(&inputs, &gate_cfg, &cooldown, 0);
        assert!(!result.pass);
    }

    #[test]
    fn late_fill_relaxation_is_single_fire_within_cooldown() {
        let health = healthy();
        let sample = good_sample();
        let mut inputs = passing_inputs(&health, &sample);
        inputs.fill_delay_ms = 45_000; // within grace ceiling (30s + 30s)
        inputs.p99_latency_ms = 500.0; // above threshold, eligible to relax
        let gate_cfg = GateConfig::default();
        let cooldown = LateFillCooldown::new();

        let first = gate_late_fill(&inputs, &gate_cfg, &cooldown, 0);
        assert!(first.pass);

        // Same symbol, still within the 30-minute cooldown: relaxation used up.
        let second = gate_late_fill(&inputs, &gate_cfg, &cooldown, 60_000);
        assert!(!second.pass);

        // After the cooldown elapses, relaxation is available again.
        let third = gate_late_fill(&inputs, &gate_cfg, &cooldown, gate_cfg.late_fill_cooldown_ms + 1);
        assert!(third.pass);
    }

    #[test]
    fn etf_flow_not_applicable_passes_when_no_etf() {
        let health = healthy();
        let sample = good_sample();
        let inputs = passing_inputs(&health, &sample);
        let gate_cfg = GateConfig::default();
        let result = gate_etf_flow(&inputs, &gate_cfg);
        assert!(result.pass);
    }

    #[test]
    fn funding_divergence_fails_closed_when_data_unavailable() {
        let health = healthy();
        let sample = good_sample();
        let mut inputs = passing_inputs(&health, &sample);
        inputs.funding_divergence = None;
        let gate_cfg = GateConfig::default();
        let result = gate_funding_divergence(&inputs, &gate_cfg);
        assert!(!result.pass);
    }
}
