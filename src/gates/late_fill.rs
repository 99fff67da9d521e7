// =============================================================================
// Late-fill cooldown — single-fire relaxation per symbol within a window
// =============================================================================

use std::collections::HashMap;

use parking_lot::RwLock;

/// Tracks the last time each symbol used its late-fill grace relaxation, so
/// a symbol can't relax the gate on every scan while latency stays elevated.
pub struct LateFillCooldown {
    last_relax_at: RwLock<HashMap<String, i64>>,
}

impl LateFillCooldown {
    pub fn new() -> Self {
        Self { last_relax_at: RwLock::new(HashMap::new()) }
    }

    pub fn can_relax(&self, symbol: &str, now_ms: i64, cooldown_ms: i64) -> bool {
        match self.last_relax_at.read().get(symbol) {
            Some(&last) => now_ms - last >= cooldown_ms,
            None => true,
        }
    }

    pub fn record_relax(&self, symbol: &str, now_ms: i64) {
        self.last_relax_at.write().insert(symbol.to_string(), now_ms);
    }
}

impl Default for LateFillCooldown {
    fn default() -> Self {
        Self::new()
    }
}
