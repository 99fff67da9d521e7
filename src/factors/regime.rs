// =============================================================================
// Regime selector — maps ADX/BBW/Hurst into the three scoring buckets
// =============================================================================
//
// Picks one of the three weight-profile buckets the scorer and factor engine
// key off of (`bull` / `choppy` / `high_vol`). Selection is stable per scan:
// callers compute it once against the universe proxy series (e.g. BTCUSD)
// and pass the resulting [`Regime`] through the whole pipeline.

use crate::indicators::adx::calculate_adx;
use crate::indicators::bollinger::calculate_bollinger;
use crate::regime::hurst::calculate_hurst_exponent;
use crate::types::{Kline, Regime};

/// Classify the prevailing regime from a proxy symbol's klines and closes.
///
/// Returns `Regime::Choppy` (the most conservative weight profile) when the
/// underlying indicators can't be computed from insufficient data.
pub fn select_regime(candles: &[Kline], closes: &[f64]) -> Regime {
    let adx = calculate_adx(candles, 14).unwrap_or(15.0);
    let bbw = calculate_bollinger(closes, 20, 2.0).map(|b| b.width).unwrap_or(2.0);
    let hurst = calculate_hurst_exponent(closes).unwrap_or(0.50);

    classify(adx, bbw, hurst)
}

fn classify(adx: f64, bbw: f64, hurst: f64) -> Regime {
    // High volatility dominates: wide bands regardless of trend strength.
    if bbw > 5.0 {
        return Regime::HighVol;
    }
    // Persistent directional trend with above-average strength => bull
    // weighting (the name is a misnomer carried from the source profile;
    // it boosts short-timeframe weight for any strong trend, up or down).
    if adx > 25.0 && hurst > 0.55 {
        return Regime::Bull;
    }
    // Everything else - ranging, squeeze, or ambiguous - gets the
    // conservative choppy profile.
    Regime::Choppy
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn high_volatility_wins_over_trend() {
        assert_eq!(classify(40.0, 7.0, 0.70), Regime::HighVol);
    }

    #[test]
    fn strong_trend_selects_bull() {
        assert_eq!(classify(30.0, 2.0, 0.60), Regime::Bull);
    }

    #[test]
    fn ambiguous_defaults_to_choppy() {
        assert_eq!(classify(15.0, 2.0, 0.50), Regime::Choppy);
    }
}
