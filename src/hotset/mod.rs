// =============================================================================
// Hot Set Manager — §4.J: multi-venue WS streaming with staged latency
// =============================================================================

pub mod adapter;
pub mod manager;

pub use adapter::{BinanceHotSetVenue, HotSetVenue, KrakenHotSetVenue};
pub use manager::{HotSetManager, StageLatency};
