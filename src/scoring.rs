// =============================================================================
// Composite Scorer — normalize factors, weight by regime, rank candidates
// =============================================================================
//
// Grounded on `signals/weighted_score.rs::WeightedScorer`'s regime-keyed
// weight map and per-component contribution breakdown, generalized from that
// module's four arbitrary named signals to the four fixed components this
// scorer always normalizes: momentum, volume, social, volatility.

use serde::{Deserialize, Serialize};

use crate::config::ScoringWeights;
use crate::types::{CompositeScore, Regime};

/// Sigmoid-like map clamped to [-50, +50] before scaling to [0, 100].
/// Negative momentum decays faster than it grows, matching the spec's
/// "negative momentum decays faster" requirement for a downside-averse map.
fn normalize_momentum(momentum_core: f64) -> f64 {
    let clamped = momentum_core.clamp(-50.0, 50.0);
    let k = if clamped < 0.0 { 0.18 } else { 0.12 };
    let sigmoid = 1.0 / (1.0 + (-k * clamped).exp());
    sigmoid * 100.0
}

/// Log-scale around a 1x baseline: `volume_resid` is a ratio-like factor
/// where 1.0 means "typical volume". `ln(ratio)` is rescaled so ratio=1 maps
/// to 50 and saturates toward 0/100 at the extremes.
fn normalize_volume(volume_resid: f64) -> f64 {
    let ratio = (volume_resid.max(0.01)).max(1e-6);
    let log_ratio = ratio.ln();
    let scaled = 50.0 + log_ratio * 15.0;
    scaled.clamp(0.0, 100.0)
}

/// Linear map from [-10, +10] to [0, 100].
fn normalize_social(social_resid_capped: f64) -> f64 {
    let clamped = social_resid_capped.clamp(-10.0, 10.0);
    ((clamped + 10.0) / 20.0) * 100.0
}

/// Inverted-U preferring 15-25% volatility: peaks at 20%, falls off
/// symmetrically outside the 15-25 band.
fn normalize_volatility(volatility_pct: f64) -> f64 {
    let center = 20.0;
    let width = 15.0;
    let distance = (volatility_pct - center).abs();
    (100.0 - (distance / width) * 100.0).clamp(0.0, 100.0)
}

fn regime_adjust(regime: Regime, momentum_n: f64, volume_n: f64, volatility_n: f64, base: f64) -> f64 {
    match regime {
        Regime::Bull => {
            if momentum_n > 70.0 {
                base * 1.10
            } else {
                base
            }
        }
        Regime::Choppy => {
            if volatility_n < 40.0 {
                // Low score on the inverted-U means volatility is far from
                // the preferred 15-25% band, i.e. actually high or very low.
                base * 0.90
            } else {
                base
            }
        }
        Regime::HighVol => {
            if volume_n > 60.0 && volatility_n > 60.0 {
                base * 1.08
            } else {
                base
            }
        }
    }
    .min(100.0)
}

/// Produce the final weighted, regime-adjusted score for one candidate.
/// `volatility_pct` (e.g. realized 24h volatility) is supplied alongside the
/// residualized composite since it isn't itself a residualized channel.
pub fn finalize_score(composite: &mut CompositeScore, volatility_pct: f64, weights: &ScoringWeights) {
    let momentum_n = normalize_momentum(composite.momentum_core);
    let volume_n = normalize_volume(composite.volume_resid);
    let social_n = normalize_social(composite.social_resid_capped);
    let volatility_n = normalize_volatility(volatility_pct);

    let base = weights.momentum * momentum_n
        + weights.volume * volume_n
        + weights.social * social_n
        + weights.volatility * volatility_n;

    composite.final_score_with_social = regime_adjust(composite.regime, momentum_n, volume_n, volatility_n, base);
}

/// A scored, identified candidate ready for gating and ranking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredCandidate {
    pub symbol: String,
    pub score: CompositeScore,
    pub rank: Option<usize>,
    pub selected: bool,
}

/// Sort descending by final score, assign 1-based ranks, and mark the top
/// `n` as `selected`.
pub fn select_top_n(mut candidates: Vec<ScoredCandidate>, n: usize) -> Vec<ScoredCandidate> {
    candidates.sort_by(|a, b| {
        b.score
            .final_score_with_social
            .partial_cmp(&a.score.final_score_with_social)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    for (i, candidate) in candidates.iter_mut().enumerate() {
        candidate.rank = Some(i + 1);
        candidate.selected = i < n;
    }
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;

    fn composite(momentum_core: f64, volume_resid: f64, social_resid_capped: f64, regime: Regime) -> CompositeScore {
        CompositeScore {
            momentum_core,
            technical_resid: 0.0,
            volume_resid,
            quality_resid: 0.0,
            social_resid_capped,
            final_score_with_social: 0.0,
            regime,
        }
    }

    #[test]
    fn momentum_normalization_favors_positive_over_symmetric_negative() {
        let up = normalize_momentum(20.0);
        let down = normalize_momentum(-20.0);
        assert!(up - 50.0 > 50.0 - down, "negative momentum must decay faster than positive grows");
    }

    #[test]
    fn volume_baseline_ratio_maps_near_midpoint() {
        let n = normalize_volume(1.0);
        assert!((n - 50.0).abs() < 1e-6);
    }

    #[test]
    fn social_extremes_map_to_bounds() {
        assert!((normalize_social(10.0) - 100.0).abs() < 1e-9);
        assert!((normalize_social(-10.0) - 0.0).abs() < 1e-9);
        assert!((normalize_social(0.0) - 50.0).abs() < 1e-9);
    }

    #[test]
    fn volatility_peaks_at_twenty_percent() {
        let peak = normalize_volatility(20.0);
        let low = normalize_volatility(5.0);
        let high = normalize_volatility(60.0);
        assert!(peak > low && peak > high);
    }

    #[test]
    fn bull_regime_boosts_strong_momentum() {
        let weights = ScoringWeights::default();
        let mut bull = composite(45.0, 1.0, 0.0, Regime::Bull);
        let mut choppy = composite(45.0, 1.0, 0.0, Regime::Choppy);
        finalize_score(&mut bull, 20.0, &weights);
        finalize_score(&mut choppy, 20.0, &weights);
        assert!(bull.final_score_with_social > choppy.final_score_with_social);
    }

    #[test]
    fn select_top_n_ranks_descending_and_marks_selection() {
        let weights = ScoringWeights::default();
        let mut scores = vec![
            composite(10.0, 1.0, 0.0, Regime::Choppy),
            composite(40.0, 1.0, 0.0, Regime::Choppy),
            composite(-30.0, 1.0, 0.0, Regime::Choppy),
        ];
        for s in &mut scores {
            finalize_score(s, 20.0, &weights);
        }
        let candidates: Vec<ScoredCandidate> = scores
            .into_iter()
            .enumerate()
            .map(|(i, score)| ScoredCandidate { symbol: format!("SYM{i}"), score, rank: None, selected: false })
            .collect();
        let ranked = select_top_n(candidates, 2);
        assert_eq!(ranked[0].rank, Some(1));
        assert!(ranked[0].score.final_score_with_social >= ranked[1].score.final_score_with_social);
        assert!(ranked[0].selected && ranked[1].selected);
        assert!(!ranked[2].selected);
    }
}
