// =============================================================================
// Cross-sectional residualization — orthogonalize against the momentum core
// =============================================================================
//
// `momentum_core` is protected: every other raw factor is regressed onto it
// across the whole batch of symbols in a scan and replaced by its residual,
// so a factor that's really just restating momentum stops double-counting
// it. A single symbol has no covariance to measure against, so this only
// makes sense applied to a full cross-section at once.

use crate::types::{CompositeScore, Regime, RawFactors};

/// Population beta and mean needed to residualize one factor channel against
/// `momentum_core` across a batch.
struct Projection {
    beta: f64,
    factor_mean: f64,
    momentum_mean: f64,
}

fn project(values: &[f64], momentum: &[f64]) -> Projection {
    let n = values.len() as f64;
    let factor_mean = values.iter().sum::<f64>() / n;
    let momentum_mean = momentum.iter().sum::<f64>() / n;

    let mut covariance = 0.0;
    let mut variance = 0.0;
    for i in 0..values.len() {
        let dm = momentum[i] - momentum_mean;
        covariance += (values[i] - factor_mean) * dm;
        variance += dm * dm;
    }

    let beta = if variance > 1e-12 { covariance / variance } else { 0.0 };
    Projection { beta, factor_mean, momentum_mean }
}

/// Residual = raw value minus the momentum-predicted component, demeaned so
/// that a factor at its own population mean with momentum at the population
/// mean produces `factor_mean` (i.e. the residual reduces to the raw value
/// when momentum sits at the cross-sectional average).
fn residualize_channel(values: &[f64], momentum: &[f64]) -> Vec<f64> {
    if values.len() < 2 {
        // No cross-section to regress against; pass through unchanged.
        return values.to_vec();
    }
    let p = project(values, momentum);
    values
        .iter()
        .zip(momentum.iter())
        .map(|(&v, &m)| v - p.beta * (m - p.momentum_mean))
        .collect()
}

/// Residualize a full batch of [`RawFactors`] against `momentum_core`,
/// leaving momentum itself untouched. The returned scores still need their
/// `regime` field filled in by the caller before use.
pub fn residualize(raw: &[RawFactors]) -> Vec<CompositeScore> {
    if raw.is_empty() {
        return Vec::new();
    }

    let momentum: Vec<f64> = raw.iter().map(|r| r.momentum_core).collect();
    let technical: Vec<f64> = raw.iter().map(|r| r.technical).collect();
    let volume: Vec<f64> = raw.iter().map(|r| r.volume).collect();
    let quality: Vec<f64> = raw.iter().map(|r| r.quality).collect();
    let social: Vec<f64> = raw.iter().map(|r| r.social_capped()).collect();

    let technical_resid = residualize_channel(&technical, &momentum);
    let volume_resid = residualize_channel(&volume, &momentum);
    let quality_resid = residualize_channel(&quality, &momentum);
    let social_resid = residualize_channel(&social, &momentum)
        .into_iter()
        .map(|v| v.clamp(-10.0, 10.0))
        .collect::<Vec<_>>();

    (0..raw.len())
        .map(|i| CompositeScore {
            momentum_core: raw[i].momentum_core,
            technical_resid: technical_resid[i],
            volume_resid: volume_resid[i],
            quality_resid: quality_resid[i],
            social_resid_capped: social_resid[i],
            final_score_with_social: 0.0,
            regime: Regime::Choppy,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(momentum_core: f64, technical: f64, volume: f64, quality: f64, social: f64) -> RawFactors {
        RawFactors { momentum_core, technical, volume, quality, social }
    }

    #[test]
    fn momentum_core_passes_through_unchanged() {
        let batch = vec![
            raw(10.0, 1.0, 2.0, 3.0, 4.0),
            raw(-5.0, 0.5, -1.0, 2.0, -3.0),
            raw(20.0, 2.0, 3.0, 1.0, 5.0),
        ];
        let scored = residualize(&batch);
        for (r, s) in batch.iter().zip(scored.iter()) {
            assert_eq!(s.momentum_core, r.momentum_core);
        }
    }

    #[test]
    fn factor_identical_to_momentum_residualizes_toward_zero() {
        // technical == momentum_core exactly: beta=1, residual should collapse
        // to the factor's own mean (no leftover signal once momentum is removed).
        let batch = vec![
            raw(10.0, 10.0, 0.0, 0.0, 0.0),
            raw(-5.0, -5.0, 0.0, 0.0, 0.0),
            raw(20.0, 20.0, 0.0, 0.0, 0.0),
        ];
        let scored = residualize(&batch);
        let resids: Vec<f64> = scored.iter().map(|s| s.technical_resid).collect();
        let mean = resids.iter().sum::<f64>() / resids.len() as f64;
        for r in &resids {
            assert!((r - mean).abs() < 1e-9);
        }
    }

    #[test]
    fn single_symbol_batch_passes_through() {
        let batch = vec![raw(5.0, 1.0, 2.0, 3.0, 4.0)];
        let scored = residualize(&batch);
        assert_eq!(scored.len(), 1);
        assert_eq!(scored[0].technical_resid, 1.0);
    }

    #[test]
    fn social_residual_stays_within_cap() {
        let batch = vec![
            raw(1.0, 0.0, 0.0, 0.0, 10.0),
            raw(-1.0, 0.0, 0.0, 0.0, -10.0),
            raw(50.0, 0.0, 0.0, 0.0, 9.0),
        ];
        let scored = residualize(&batch);
        for s in &scored {
            assert!(s.social_resid_capped.abs() <= 10.0 + 1e-9);
        }
    }

    #[test]
    fn empty_batch_returns_empty() {
        assert!(residualize(&[]).is_empty());
    }
}
