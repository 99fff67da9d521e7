// =============================================================================
// Order Book Manager — latest per-symbol spread/imbalance snapshot cache
// =============================================================================

use std::collections::HashMap;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Cached top-of-book summary for a single symbol, refreshed by the hot set
/// manager as ticks arrive and read by the microstructure processor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderBookState {
    pub symbol: String,
    pub best_bid: f64,
    pub best_ask: f64,
    pub bid_depth: f64,
    pub ask_depth: f64,
    pub spread_bps: f64,
    pub imbalance: f64,
    pub last_update_id: u64,
}

pub struct OrderBookManager {
    books: RwLock<HashMap<String, OrderBookState>>,
}

impl OrderBookManager {
    pub fn new() -> Self {
        Self { books: RwLock::new(HashMap::new()) }
    }

    pub fn update(&self, symbol: &str, best_bid: f64, best_ask: f64, bid_depth: f64, ask_depth: f64, update_id: u64) {
        let mid = (best_bid + best_ask) / 2.0;
        let spread_bps = if mid > 0.0 { (best_ask - best_bid) / mid * 10_000.0 } else { 0.0 };

        let total_depth = bid_depth + ask_depth;
        let imbalance = if total_depth > 0.0 { (bid_depth - ask_depth) / total_depth } else { 0.0 };

        let state = OrderBookState {
            symbol: symbol.to_string(),
            best_bid,
            best_ask,
            bid_depth,
            ask_depth,
            spread_bps,
            imbalance,
            last_update_id: update_id,
        };

        self.books.write().insert(symbol.to_string(), state);
    }

    pub fn get(&self, symbol: &str) -> Option<OrderBookState> {
        self.books.read().get(symbol).cloned()
    }

    pub fn spread_bps(&self, symbol: &str) -> Option<f64> {
        self.books.read().get(symbol).map(|s| s.spread_bps)
    }

    pub fn imbalance(&self, symbol: &str) -> Option<f64> {
        self.books.read().get(symbol).map(|s| s.imbalance)
    }

    pub fn symbols(&self) -> Vec<String> {
        self.books.read().keys().cloned().collect()
    }
}

impl Default for OrderBookManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_computes_spread_and_imbalance() {
        let manager = OrderBookManager::new();
        manager.update("BTCUSD", 100.0, 100.2, 5.0, 3.0, 1);
        let state = manager.get("BTCUSD").unwrap();
        assert!(state.spread_bps > 0.0);
        assert!(state.imbalance > 0.0);
    }

    #[test]
    fn unknown_symbol_returns_none() {
        let manager = OrderBookManager::new();
        assert!(manager.get("ETHUSD").is_none());
    }
}
