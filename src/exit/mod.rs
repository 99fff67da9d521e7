// =============================================================================
// Exit Evaluator — precedence-ordered, first-trigger-wins
// =============================================================================
//
// A pure function of `ExitInputs` and `ExitConfig`: no held-position state is
// owned here, unlike the teacher's stateful barrier tracker this module
// replaces. Every call re-derives the verdict from the position snapshot the
// caller passes in, which is what makes the scan pipeline's per-symbol
// evaluation embarrassingly parallel and trivially testable.

use serde::{Deserialize, Serialize};

use crate::config::ExitConfig;
use crate::types::ExitInputs;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitReason {
    HardStop,
    VenueHealthCut,
    TimeLimit,
    AccelerationReversal,
    MomentumFade,
    TrailingStop,
    ProfitTarget,
}

impl std::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::HardStop => "hard_stop",
            Self::VenueHealthCut => "venue_health_cut",
            Self::TimeLimit => "time_limit",
            Self::AccelerationReversal => "acceleration_reversal",
            Self::MomentumFade => "momentum_fade",
            Self::TrailingStop => "trailing_stop",
            Self::ProfitTarget => "profit_target",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExitResult {
    pub should_exit: bool,
    pub reason: Option<ExitReason>,
    pub triggered_by: String,
    pub unrealized_pnl_pct: f64,
    pub hours_held: f64,
    pub evaluation_ms: f64,
}

fn no_exit(inputs: &ExitInputs) -> ExitResult {
    ExitResult {
        should_exit: false,
        reason: None,
        triggered_by: String::new(),
        unrealized_pnl_pct: inputs.unrealized_pnl_pct(),
        hours_held: inputs.hours_held(),
        evaluation_ms: 0.0,
    }
}

fn exit(inputs: &ExitInputs, reason: ExitReason, triggered_by: impl Into<String>) -> ExitResult {
    ExitResult {
        should_exit: true,
        reason: Some(reason),
        triggered_by: triggered_by.into(),
        unrealized_pnl_pct: inputs.unrealized_pnl_pct(),
        hours_held: inputs.hours_held(),
        evaluation_ms: 0.0,
    }
}

/// Evaluate a held position against the seven precedence-ordered exit
/// conditions. The first condition that fires wins; later ones are not
/// evaluated (unlike the gate stack, the exit evaluator has no "explain all"
/// requirement).
pub fn evaluate(inputs: &ExitInputs, config: &ExitConfig) -> ExitResult {
    let long_stop = inputs.entry_price - config.hard_stop_atr_mult * inputs.atr_1h;

    // 1. Hard stop.
    if inputs.current_price <= long_stop {
        return exit(
            inputs,
            ExitReason::HardStop,
            format!("price {:.4} <= hard stop {:.4}", inputs.current_price, long_stop),
        );
    }

    // 2. Venue health cut: tighten the stop (raise it closer to price) and
    // re-check.
    if inputs.venue_health.is_degraded() {
        let tightened_stop = long_stop + config.venue_health_atr_tightener * inputs.atr_1h;
        if inputs.current_price <= tightened_stop {
            return exit(
                inputs,
                ExitReason::VenueHealthCut,
                format!(
                    "venue degraded, price {:.4} <= tightened stop {:.4}",
                    inputs.current_price, tightened_stop
                ),
            );
        }
    }

    // 3. Time limit.
    let hours_held = inputs.hours_held();
    if hours_held >= config.max_hold_hours {
        return exit(
            inputs,
            ExitReason::TimeLimit,
            format!("held {:.1}h >= max {:.1}h", hours_held, config.max_hold_hours),
        );
    }

    // 4. Acceleration reversal.
    if inputs.acceleration_4h < 0.0 {
        return exit(
            inputs,
            ExitReason::AccelerationReversal,
            format!("4h acceleration {:.4} < 0", inputs.acceleration_4h),
        );
    }

    // 5. Momentum fade.
    if inputs.momentum_1h < 0.0 && inputs.momentum_4h < 0.0 {
        return exit(
            inputs,
            ExitReason::MomentumFade,
            format!(
                "1h momentum {:.4} and 4h momentum {:.4} both negative",
                inputs.momentum_1h, inputs.momentum_4h
            ),
        );
    }

    // 6. Trailing stop: only once held long enough and not currently
    // accelerating.
    if hours_held >= config.min_hours_for_trailing && inputs.acceleration_4h <= 0.0 {
        let trailing_stop = inputs.high_water_mark - config.trailing_atr_mult * inputs.atr_1h;
        if inputs.current_price <= trailing_stop {
            return exit(
                inputs,
                ExitReason::TrailingStop,
                format!(
                    "price {:.4} <= trailing stop {:.4} (HWM {:.4})",
                    inputs.current_price, trailing_stop, inputs.high_water_mark
                ),
            );
        }
    }

    // 7. Profit target tiers — report the highest tier crossed.
    let pnl_pct = inputs.unrealized_pnl_pct();
    if let Some((tier, target)) = config
        .profit_targets
        .iter()
        .enumerate()
        .filter(|(_, target)| pnl_pct >= **target)
        .last()
    {
        return exit(
            inputs,
            ExitReason::ProfitTarget,
            format!("tier {} target {:.1}% reached (pnl {:.2}%)", tier + 1, target, pnl_pct),
        );
    }

    no_exit(inputs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{HealthStatus, ProviderHealth};

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

    fn base_inputs() -> ExitInputs {
        ExitInputs {
            symbol: "BTCUSD".to_string(),
            entry_price: 100.0,
            entry_time: 0,
            current_price: 101.0,
            now: 3_600_000,
            atr_1h: 2.0,
            high_water_mark: 101.0,
            venue_health: healthy(),
            momentum_1h: 0.5,
            momentum_4h: 0.5,
            acceleration_4h: 0.1,
        }
    }

    #[test]
    fn hard_stop_has_top_precedence() {
        let mut inputs = base_inputs();
        inputs.current_price = 96.0; // entry(100) - 1.5*atr(2) = 97, below it
        let config = ExitConfig::default();
        let result = evaluate(&inputs, &config);
        assert!(result.should_exit);
        assert_eq!(result.reason, Some(ExitReason::HardStop));
    }

    #[test]
    fn venue_health_cut_only_fires_when_degraded_and_tightened_stop_breached() {
        // Plain hard stop = 100 - 1.5*2 = 97. Degraded-venue tightened stop
        // = 97 + 0.3*2 = 97.6 (raised, closer to current price).
        let mut inputs = base_inputs();
        inputs.current_price = 98.0; // above both stops: no trigger.
        inputs.venue_health.status = HealthStatus::Degraded;
        let config = ExitConfig::default();
        let result = evaluate(&inputs, &config);
        assert!(!result.should_exit);

        inputs.current_price = 96.5; // below plain hard stop too, so HardStop still wins precedence.
        let result = evaluate(&inputs, &config);
        assert!(result.should_exit);
        assert_eq!(result.reason, Some(ExitReason::HardStop));

        // A price between the two stops only breaches when the venue is degraded.
        inputs.current_price = 97.3;
        inputs.venue_health.status = HealthStatus::Healthy;
        let result = evaluate(&inputs, &config);
        assert!(!result.should_exit);

        inputs.venue_health.status = HealthStatus::Degraded;
        let result = evaluate(&inputs, &config);
        assert_eq!(result.reason, Some(ExitReason::VenueHealthCut));
    }

    #[test]
    fn time_limit_fires_after_max_hold() {
        let mut inputs = base_inputs();
        inputs.now = (49.0 * 3_600_000.0) as i64;
        let config = ExitConfig::default();
        let result = evaluate(&inputs, &config);
        assert_eq!(result.reason, Some(ExitReason::TimeLimit));
    }

    #[test]
    fn acceleration_reversal_takes_precedence_over_momentum_fade() {
        let mut inputs = base_inputs();
        inputs.acceleration_4h = -0.1;
        inputs.momentum_1h = -0.2;
        inputs.momentum_4h = -0.2;
        let config = ExitConfig::default();
        let result = evaluate(&inputs, &config);
        assert_eq!(result.reason, Some(ExitReason::AccelerationReversal));
    }

    #[test]
    fn momentum_fade_requires_both_timeframes_negative() {
        let mut inputs = base_inputs();
        inputs.momentum_1h = -0.2;
        inputs.momentum_4h = 0.1;
        let config = ExitConfig::default();
        assert!(!evaluate(&inputs, &config).should_exit);

        inputs.momentum_4h = -0.1;
        let result = evaluate(&inputs, &config);
        assert_eq!(result.reason, Some(ExitReason::MomentumFade));
    }

    #[test]
    fn trailing_stop_requires_min_hold_time_and_no_acceleration() {
        let mut inputs = base_inputs();
        inputs.high_water_mark = 110.0;
        inputs.current_price = 105.0; // breaches 110 - 1.8*2 = 106.4
        inputs.acceleration_4h = 0.0; // not accelerating, but still clears step 4's < 0 check
        inputs.now = (6.0 * 3_600_000.0) as i64; // only 6h held, below 12h minimum
        let config = ExitConfig::default();
        assert!(!evaluate(&inputs, &config).should_exit);

        inputs.now = (13.0 * 3_600_000.0) as i64;
        let result = evaluate(&inputs, &config);
        assert_eq!(result.reason, Some(ExitReason::TrailingStop));

        // Past the min hold time, but still accelerating: trailing stop is
        // suppressed even though the trailing-stop price level is breached.
        inputs.acceleration_4h = 0.1;
        let result = evaluate(&inputs, &config);
        assert_ne!(result.reason, Some(ExitReason::TrailingStop));
    }

    #[test]
    fn profit_target_tier_reported() {
        let mut inputs = base_inputs();
        inputs.current_price = 116.0; // +16% pnl, crosses tier 2 (15%) not tier 3 (25%)
        let config = ExitConfig::default();
        let result = evaluate(&inputs, &config);
        assert_eq!(result.reason, Some(ExitReason::ProfitTarget));
        assert!(result.triggered_by.contains("tier 2"));
    }

    #[test]
    fn no_trigger_returns_should_exit_false() {
        let inputs = base_inputs();
        let config = ExitConfig::default();
        let result = evaluate(&inputs, &config);
        assert!(!result.should_exit);
        assert!(result.reason.is_none());
    }
}
