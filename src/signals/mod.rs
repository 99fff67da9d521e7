// =============================================================================
// Signals Module — reference weighted-scoring and decay machinery
// =============================================================================
//
// Kept as the grounding source for `scoring.rs` (regime-keyed weight maps,
// per-component contribution breakdown) and a future freshness gate
// (`signal_decay.rs`'s half-life model). Neither is wired into the scan
// pipeline directly; `scoring.rs` and `gates/` implement the spec's own
// four-component composite and ten-gate stack instead of calling these.

pub mod signal_decay;
pub mod weighted_score;

pub use signal_decay::SignalDecayManager;
pub use weighted_score::{ScoringResult, SignalInput, WeightedScorer};
