// =============================================================================
// Factor Engine — multi-timeframe momentum, RSI/ATR, regime, residualization
// =============================================================================

pub mod momentum;
pub mod regime;
pub mod residual;

pub use momentum::{average_volume, build_snapshot, momentum_pct, MomentumSnapshot};
pub use regime::select_regime;
pub use residual::residualize;
