// =============================================================================
// Configuration surface
// =============================================================================
//
// These structs are what an external YAML loader would deserialize into --
// loading a config file from disk is out of scope here, so every block also
// implements `Default` with the enumerated defaults from the external
// interfaces contract, which keeps this crate independently testable.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::types::{Regime, Timeframe};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitConfig {
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    #[serde(default = "default_success_threshold")]
    pub success_threshold: u32,
    #[serde(default = "default_circuit_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: u32,
}

fn default_failure_threshold() -> u32 {
    5
}
fn default_success_threshold() -> u32 {
    3
}
fn default_circuit_timeout_ms() -> u64 {
    120_000
}
fn default_max_concurrent() -> u32 {
    10
}

impl Default for CircuitConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            success_threshold: default_success_threshold(),
            timeout_ms: default_circuit_timeout_ms(),
            max_concurrent: default_max_concurrent(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_hot_ttl_ms")]
    pub hot_ttl_ms: u64,
    #[serde(default = "default_warm_ttl_ms")]
    pub warm_ttl_ms: u64,
    #[serde(default = "default_cold_ttl_ms")]
    pub cold_ttl_ms: u64,
    #[serde(default = "default_degraded_ttl_ms")]
    pub degraded_ttl_ms: u64,
    #[serde(default = "default_max_size")]
    pub max_size: usize,
    #[serde(default)]
    pub compression: bool,
}

fn default_hot_ttl_ms() -> u64 {
    5_000
}
fn default_warm_ttl_ms() -> u64 {
    300_000
}
fn default_cold_ttl_ms() -> u64 {
    6 * 3_600_000
}
fn default_degraded_ttl_ms() -> u64 {
    30 * 3_600_000
}
fn default_max_size() -> usize {
    10_000
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            hot_ttl_ms: default_hot_ttl_ms(),
            warm_ttl_ms: default_warm_ttl_ms(),
            cold_ttl_ms: default_cold_ttl_ms(),
            degraded_ttl_ms: default_degraded_ttl_ms(),
            max_size: default_max_size(),
            compression: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthConfig {
    #[serde(default = "default_max_error_rate")]
    pub max_error_rate: f64,
    #[serde(default = "default_max_latency_ms")]
    pub max_latency_ms: f64,
}

fn default_max_error_rate() -> f64 {
    0.05
}
fn default_max_latency_ms() -> f64 {
    2000.0
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            max_error_rate: default_max_error_rate(),
            max_latency_ms: default_max_latency_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default = "default_rps")]
    pub rps: f64,
    #[serde(default = "default_burst")]
    pub burst: u32,
    #[serde(default = "default_day_limit")]
    pub day_limit: u64,
    #[serde(default = "default_month_limit")]
    pub month_limit: u64,
    #[serde(default = "default_warn_ratio")]
    pub warn_ratio: f64,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default)]
    pub circuit: CircuitConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub health: HealthConfig,
}

fn default_rps() -> f64 {
    10.0
}
fn default_burst() -> u32 {
    20
}
fn default_day_limit() -> u64 {
    100_000
}
fn default_month_limit() -> u64 {
    2_000_000
}
fn default_warn_ratio() -> f64 {
    0.8
}
fn default_request_timeout_ms() -> u64 {
    10_000
}
fn default_max_retries() -> u32 {
    3
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            rps: default_rps(),
            burst: default_burst(),
            day_limit: default_day_limit(),
            month_limit: default_month_limit(),
            warn_ratio: default_warn_ratio(),
            request_timeout_ms: default_request_timeout_ms(),
            max_retries: default_max_retries(),
            circuit: CircuitConfig::default(),
            cache: CacheConfig::default(),
            health: HealthConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringWeights {
    #[serde(default = "default_w_momentum")]
    pub momentum: f64,
    #[serde(default = "default_w_volume")]
    pub volume: f64,
    #[serde(default = "default_w_social")]
    pub social: f64,
    #[serde(default = "default_w_volatility")]
    pub volatility: f64,
}

fn default_w_momentum() -> f64 {
    0.60
}
fn default_w_volume() -> f64 {
    0.25
}
fn default_w_social() -> f64 {
    0.10
}
fn default_w_volatility() -> f64 {
    0.05
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            momentum: default_w_momentum(),
            volume: default_w_volume(),
            social: default_w_social(),
            volatility: default_w_volatility(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    #[serde(default)]
    pub weights: ScoringWeights,
    #[serde(default = "default_social_cap")]
    pub social_cap: f64,
    #[serde(default = "default_score_entry_threshold")]
    pub score_entry_threshold: f64,
}

fn default_social_cap() -> f64 {
    10.0
}
fn default_score_entry_threshold() -> f64 {
    75.0
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            weights: ScoringWeights::default(),
            social_cap: default_social_cap(),
            score_entry_threshold: default_score_entry_threshold(),
        }
    }
}

/// `{tf -> weight}`, summing to 1 for a single regime profile.
pub type TimeframeWeights = HashMap<Timeframe, f64>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegimeWeightsConfig {
    pub profiles: HashMap<Regime, TimeframeWeights>,
}

impl Default for RegimeWeightsConfig {
    fn default() -> Self {
        let even = |boost_short: f64| {
            let rest = (1.0 - boost_short) / 4.0;
            HashMap::from([
                (Timeframe::H1, boost_short),
                (Timeframe::H4, rest),
                (Timeframe::H12, rest),
                (Timeframe::H24, rest),
                (Timeframe::D7, rest),
            ])
        };
        Self {
            profiles: HashMap::from([
                (Regime::Bull, even(0.40)),
                (Regime::Choppy, even(0.15)),
                (Regime::HighVol, even(0.10)),
            ]),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExitConfig {
    #[serde(default = "default_hard_stop_atr_mult")]
    pub hard_stop_atr_mult: f64,
    #[serde(default = "default_venue_health_atr_tightener")]
    pub venue_health_atr_tightener: f64,
    #[serde(default = "default_max_hold_hours")]
    pub max_hold_hours: f64,
    #[serde(default = "default_trailing_atr_mult")]
    pub trailing_atr_mult: f64,
    #[serde(default = "default_min_hours_for_trailing")]
    pub min_hours_for_trailing: f64,
    #[serde(default = "default_profit_targets")]
    pub profit_targets: Vec<f64>,
}

fn default_hard_stop_atr_mult() -> f64 {
    1.5
}
fn default_venue_health_atr_tightener() -> f64 {
    0.3
}
fn default_max_hold_hours() -> f64 {
    48.0
}
fn default_trailing_atr_mult() -> f64 {
    1.8
}
fn default_min_hours_for_trailing() -> f64 {
    12.0
}
fn default_profit_targets() -> Vec<f64> {
    vec![8.0, 15.0, 25.0]
}

impl Default for ExitConfig {
    fn default() -> Self {
        Self {
            hard_stop_atr_mult: default_hard_stop_atr_mult(),
            venue_health_atr_tightener: default_venue_health_atr_tightener(),
            max_hold_hours: default_max_hold_hours(),
            trailing_atr_mult: default_trailing_atr_mult(),
            min_hours_for_trailing: default_min_hours_for_trailing(),
            profit_targets: default_profit_targets(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateConfig {
    #[serde(default = "default_movement_pct")]
    pub movement_pct: f64,
    #[serde(default = "default_vadr_min")]
    pub vadr_min: f64,
    #[serde(default = "default_freshness_max_bars")]
    pub freshness_max_bars: u32,
    #[serde(default = "default_freshness_atr_mult")]
    pub freshness_atr_mult: f64,
    #[serde(default = "default_fatigue_return_pct")]
    pub fatigue_return_pct: f64,
    #[serde(default = "default_fatigue_rsi")]
    pub fatigue_rsi: f64,
    #[serde(default = "default_late_fill_base_ms")]
    pub late_fill_base_ms: u64,
    #[serde(default = "default_late_fill_grace_ms")]
    pub late_fill_grace_ms: u64,
    #[serde(default = "default_p99_threshold_ms")]
    pub p99_threshold_ms: f64,
    #[serde(default = "default_late_fill_cooldown_ms")]
    pub late_fill_cooldown_ms: i64,
    #[serde(default = "default_spread_max_bps")]
    pub spread_max_bps: f64,
    #[serde(default = "default_depth_min_usd")]
    pub depth_min_usd: f64,
    #[serde(default = "default_funding_divergence_min")]
    pub funding_divergence_min: f64,
    #[serde(default = "default_oi_residual_min_usd")]
    pub oi_residual_min_usd: f64,
    #[serde(default = "default_etf_flow_tint_min")]
    pub etf_flow_tint_min: f64,
}

fn default_movement_pct() -> f64 {
    3.0
}
fn default_vadr_min() -> f64 {
    1.75
}
fn default_freshness_max_bars() -> u32 {
    2
}
fn default_freshness_atr_mult() -> f64 {
    1.2
}
fn default_fatigue_return_pct() -> f64 {
    12.0
}
fn default_fatigue_rsi() -> f64 {
    70.0
}
fn default_late_fill_base_ms() -> u64 {
    30_000
}
fn default_late_fill_grace_ms() -> u64 {
    30_000
}
fn default_p99_threshold_ms() -> f64 {
    400.0
}
fn default_late_fill_cooldown_ms() -> i64 {
    30 * 60_000
}
fn default_spread_max_bps() -> f64 {
    50.0
}
fn default_depth_min_usd() -> f64 {
    100_000.0
}
fn default_funding_divergence_min() -> f64 {
    2.0
}
fn default_oi_residual_min_usd() -> f64 {
    1_000_000.0
}
fn default_etf_flow_tint_min() -> f64 {
    0.3
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            movement_pct: default_movement_pct(),
            vadr_min: default_vadr_min(),
            freshness_max_bars: default_freshness_max_bars(),
            freshness_atr_mult: default_freshness_atr_mult(),
            fatigue_return_pct: default_fatigue_return_pct(),
            fatigue_rsi: default_fatigue_rsi(),
            late_fill_base_ms: default_late_fill_base_ms(),
            late_fill_grace_ms: default_late_fill_grace_ms(),
            p99_threshold_ms: default_p99_threshold_ms(),
            late_fill_cooldown_ms: default_late_fill_cooldown_ms(),
            spread_max_bps: default_spread_max_bps(),
            depth_min_usd: default_depth_min_usd(),
            funding_divergence_min: default_funding_divergence_min(),
            oi_residual_min_usd: default_oi_residual_min_usd(),
            etf_flow_tint_min: default_etf_flow_tint_min(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileConfig {
    #[serde(default = "default_min_sources")]
    pub min_sources: usize,
    #[serde(default = "default_max_deviation")]
    pub max_deviation: f64,
    #[serde(default)]
    pub use_trimmed_mean: bool,
}

fn default_min_sources() -> usize {
    2
}
fn default_max_deviation() -> f64 {
    0.01
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            min_sources: default_min_sources(),
            max_deviation: default_max_deviation(),
            use_trimmed_mean: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CryptoRunConfig {
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub regime_weights: RegimeWeightsConfig,
    #[serde(default)]
    pub exit: ExitConfig,
    #[serde(default)]
    pub gates: GateConfig,
    #[serde(default)]
    pub reconcile: ReconcileConfig,
}
