// =============================================================================
// Regime Detection Module
// =============================================================================
//
// Houses the Hurst exponent estimator used by `factors::regime::classify`
// alongside ADX and Bollinger Band Width. The teacher's original
// position-sizing detector (regime state machine, Shannon entropy filter)
// had no counterpart in this scanner (no order execution, no position
// sizing) and was removed in the final trim pass.

pub mod hurst;

pub use hurst::calculate_hurst_exponent;
