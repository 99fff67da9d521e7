// =============================================================================
// Cross-venue reconciliation
// =============================================================================
//
// Independent venues rarely agree on a price to the penny. This takes one
// reading per source for the same instrument and produces a single
// reconciled value plus a confidence score, trimming outliers before
// averaging rather than letting one bad feed skew the result.

use crate::config::ReconcileConfig;
use crate::error::ProviderError;
use crate::types::Venue;

#[derive(Debug, Clone)]
pub struct SourceReading {
    pub venue: Venue,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Reconciled {
    pub value: f64,
    pub confidence: f64,
    pub sources_used: usize,
    pub sources_trimmed: usize,
}

fn median(values: &[f64]) -> f64 {
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    }
}

/// Reconcile readings from independent venues into one value.
///
/// Requires at least `config.min_sources` readings. Any reading deviating
/// from the median by more than `config.max_deviation` (relative) is
/// trimmed; if fewer than `min_sources` survive trimming the reconciliation
/// fails rather than silently degrading confidence. `confidence` is
/// `(survivors / sources) * (1 - max_relative_deviation_of_survivors)`,
/// clamped to `[0, 1]`, so a trimmed outlier lowers confidence even when the
/// survivors agree perfectly.
pub fn reconcile(readings: &[SourceReading], config: &ReconcileConfig) -> Result<Reconciled, ProviderError> {
    if readings.len() < config.min_sources {
        return Err(ProviderError::InsufficientSources { have: readings.len(), need: config.min_sources });
    }

    let mut sorted: Vec<f64> = readings.iter().map(|r| r.value).collect();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let pivot = median(&sorted);

    let survivors: Vec<f64> = sorted
        .iter()
        .copied()
        .filter(|v| pivot.abs() < f64::EPSILON || ((v - pivot).abs() / pivot.abs()) <= config.max_deviation)
        .collect();
    let trimmed = sorted.len() - survivors.len();

    if survivors.len() < config.min_sources {
        return Err(ProviderError::InsufficientAfterTrim { have: survivors.len(), need: config.min_sources });
    }

    let value = if config.use_trimmed_mean {
        survivors.iter().sum::<f64>() / survivors.len() as f64
    } else {
        median(&survivors)
    };

    let max_rel_dev = survivors
        .iter()
        .map(|v| if value.abs() < f64::EPSILON { 0.0 } else { (v - value).abs() / value.abs() })
        .fold(0.0_f64, f64::max);
    let survivor_fraction = survivors.len() as f64 / readings.len() as f64;
    let confidence = (survivor_fraction * (1.0 - max_rel_dev)).clamp(0.0, 1.0);

    Ok(Reconciled { value, confidence, sources_used: survivors.len(), sources_trimmed: trimmed })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> ReconcileConfig {
        ReconcileConfig::default()
    }

    #[test]
    fn agreeing_sources_yield_high_confidence() {
        let readings = vec![
            SourceReading { venue: Venue::Kraken, value: 100.0 },
            SourceReading { venue: Venue::Binance, value: 100.05 },
            SourceReading { venue: Venue::Coinbase, value: 99.98 },
        ];
        let result = reconcile(&readings, &cfg()).unwrap();
        assert!(result.confidence > 0.99);
        assert_eq!(result.sources_trimmed, 0);
    }

    #[test]
    fn outlier_is_trimmed() {
        let readings = vec![
            SourceReading { venue: Venue::Kraken, value: 100.0 },
            SourceReading { venue: Venue::Binance, value: 100.1 },
            SourceReading { venue: Venue::Coinbase, value: 150.0 },
        ];
        let result = reconcile(&readings, &cfg()).unwrap();
        assert_eq!(result.sources_trimmed, 1);
        assert_eq!(result.sources_used, 2);
    }

    #[test]
    fn below_min_sources_fails() {
        let readings = vec![SourceReading { venue: Venue::Kraken, value: 100.0 }];
        assert!(matches!(reconcile(&readings, &cfg()), Err(ProviderError::InsufficientSources { .. })));
    }

    #[test]
    fn trimming_below_min_sources_fails() {
        let readings = vec![
            SourceReading { venue: Venue::Kraken, value: 100.0 },
            SourceReading { venue: Venue::Binance, value: 200.0 },
        ];
        assert!(matches!(reconcile(&readings, &cfg()), Err(ProviderError::InsufficientAfterTrim { .. })));
    }
}
