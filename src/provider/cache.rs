// =============================================================================
// Cache — hot/warm/cold TTL tiers + point-in-time snapshot store
// =============================================================================
//
// Three TTL tiers per spec: hot (seconds, order book / trades), warm
// (minutes, klines), cold (hours, reference data). A per-key `degraded` flag
// both marks an entry as stale-serve-eligible and, while set, extends the
// TTL applied to that key's subsequent writes to `degraded_ttl_ms` -- a
// provider that's circuit-open gets longer-lived cache entries instead of
// refetching on every request. Entries above 1KB are marked `compressed`
// (the actual compression happens at the transport layer, this struct just
// records that it occurred) so callers can recover raw size accounting. The
// map is bounded to `max_size`: an insert of a brand-new key while full
// evicts the entry nearest to expiry, i.e. LRU by TTL.

use std::collections::HashMap;

use parking_lot::RwLock;
use tracing::debug;

use crate::clock::Clock;
use crate::types::{CacheEntry, CacheTier, PitSnapshot};

const COMPRESS_THRESHOLD_BYTES: usize = 1024;

pub struct CacheTierConfig {
    pub hot_ttl_ms: i64,
    pub warm_ttl_ms: i64,
    pub cold_ttl_ms: i64,
    pub degraded_ttl_ms: i64,
    pub max_size: usize,
}

impl Default for CacheTierConfig {
    fn default() -> Self {
        Self {
            hot_ttl_ms: 5_000,
            warm_ttl_ms: 5 * 60_000,
            cold_ttl_ms: 6 * 3_600_000,
            degraded_ttl_ms: 30 * 3_600_000,
            max_size: 10_000,
        }
    }
}

struct Entry {
    cache: CacheEntry,
    degraded: bool,
}

pub struct Cache {
    config: CacheTierConfig,
    entries: RwLock<HashMap<String, Entry>>,
    pit: RwLock<HashMap<String, Vec<PitSnapshot>>>,
}

impl Cache {
    pub fn new(config: CacheTierConfig) -> Self {
        Self {
            config,
            entries: RwLock::new(HashMap::new()),
            pit: RwLock::new(HashMap::new()),
        }
    }

    fn ttl_for(&self, tier: CacheTier) -> i64 {
        match tier {
            CacheTier::Hot => self.config.hot_ttl_ms,
            CacheTier::Warm => self.config.warm_ttl_ms,
            CacheTier::Cold => self.config.cold_ttl_ms,
        }
    }

    /// Evict the entry nearest to expiry (effectively LRU by TTL). Used only
    /// when `put` is about to grow the map past `max_size`.
    fn evict_nearest_to_expiry(entries: &mut HashMap<String, Entry>) {
        if let Some(key) = entries.iter().min_by_key(|(_, e)| e.cache.expires_at).map(|(k, _)| k.clone()) {
            entries.remove(&key);
        }
    }

    pub fn put(&self, key: &str, payload: serde_json::Value, tier: CacheTier, clock: &dyn Clock) {
        let size = payload.to_string().len();
        let mut entries = self.entries.write();

        let degraded = entries.get(key).map(|e| e.degraded).unwrap_or(false);
        let ttl = if degraded { self.config.degraded_ttl_ms } else { self.ttl_for(tier) };
        let expires_at = clock.now_ms() + ttl;

        if !entries.contains_key(key) && entries.len() >= self.config.max_size {
            Self::evict_nearest_to_expiry(&mut entries);
        }

        let entry = Entry {
            cache: CacheEntry {
                key: key.to_string(),
                payload,
                expires_at,
                tier,
                compressed: size > COMPRESS_THRESHOLD_BYTES,
            },
            degraded,
        };
        entries.insert(key.to_string(), entry);
    }

    /// Fresh hit only (not expired, not degraded-stale).
    pub fn get(&self, key: &str, clock: &dyn Clock) -> Option<CacheEntry> {
        let entries = self.entries.read();
        let entry = entries.get(key)?;
        if entry.cache.expires_at > clock.now_ms() {
            Some(entry.cache.clone())
        } else {
            None
        }
    }

    /// Returns a stale entry regardless of TTL, used only when the provider
    /// backing this key is circuit-open or budget-exhausted.
    pub fn get_degraded(&self, key: &str) -> Option<CacheEntry> {
        self.entries.read().get(key).map(|e| e.cache.clone())
    }

    pub fn set_degraded(&self, key: &str, degraded: bool) {
        if let Some(entry) = self.entries.write().get_mut(key) {
            entry.degraded = degraded;
            if degraded {
                debug!(key, "cache entry marked degraded-serve-eligible");
            }
        }
    }

    pub fn is_degraded(&self, key: &str) -> bool {
        self.entries.read().get(key).map(|e| e.degraded).unwrap_or(false)
    }

    /// Evict every entry whose TTL has elapsed. Intended to run on a timer;
    /// cheap enough to call inline too since it only touches expired keys.
    pub fn evict_expired(&self, clock: &dyn Clock) -> usize {
        let now = clock.now_ms();
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, e| e.cache.expires_at > now || e.degraded);
        before - entries.len()
    }

    /// Append a new point-in-time snapshot for `key`. Never overwrites a
    /// prior snapshot -- history for a key grows monotonically so
    /// `get_pit` can replay any past point in time.
    pub fn snapshot_pit(&self, key: &str, payload: serde_json::Value, source: &str, clock: &dyn Clock) {
        let snapshot = PitSnapshot { key: key.to_string(), payload, captured_at: clock.now_ms(), source: source.to_string() };
        self.pit.write().entry(key.to_string()).or_default().push(snapshot);
    }

    /// The latest snapshot with `captured_at <= at_time`, or `None` if every
    /// snapshot for this key was captured after `at_time`.
    pub fn get_pit(&self, key: &str, at_time: i64) -> Option<PitSnapshot> {
        self.pit.read().get(key)?.iter().filter(|s| s.captured_at <= at_time).max_by_key(|s| s.captured_at).cloned()
    }
}
