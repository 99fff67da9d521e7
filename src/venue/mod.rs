// =============================================================================
// Venue adapters — exchange-native market data, one capability-set trait
// =============================================================================

pub mod guard;
pub mod rest;

use async_trait::async_trait;

use crate::error::ProviderError;
use crate::types::{BookL2Snapshot, Kline, Trade, Venue, ProviderHealth};

/// Everything the scan pipeline needs from one exchange. No inheritance
/// hierarchy — a venue either implements the whole set or doesn't register.
#[async_trait]
pub trait VenueAdapter: Send + Sync {
    fn venue(&self) -> Venue;

    /// Map a canonical symbol (`BTCUSD`) to this venue's native symbol
    /// (`XBT/USD`, `BTCUSDT`, ...).
    fn normalize_symbol(&self, canonical: &str) -> String;

    /// Map a canonical interval label (`1h`) to this venue's native interval
    /// string.
    fn normalize_interval(&self, canonical: &str) -> String;

    async fn get_klines(&self, symbol: &str, interval: &str, limit: u32) -> Result<Vec<Kline>, ProviderError>;

    async fn get_trades(&self, symbol: &str, limit: u32) -> Result<Vec<Trade>, ProviderError>;

    async fn get_book_l2(&self, symbol: &str, depth: u32) -> Result<BookL2Snapshot, ProviderError>;

    fn health(&self) -> ProviderHealth;
}
