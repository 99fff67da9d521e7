// =============================================================================
// Rate Limiter — per (provider, host) token bucket
// =============================================================================
//
// One `governor` token bucket per (provider, host). `wait` suspends until a
// token is available or the backoff window created by a 429 is still active;
// `try_acquire` is the non-blocking variant.

use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use governor::{Quota, RateLimiter as GovernorRateLimiter};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::error::ProviderError;

type InnerLimiter = GovernorRateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

struct Backoff {
    until_ms: i64,
    window_ms: i64,
}

/// Rate limiter for a single `(provider, host)` pair.
pub struct HostLimiter {
    provider: String,
    limiter: InnerLimiter,
    backoff: Mutex<Option<Backoff>>,
    backoff_max_ms: i64,
}

impl HostLimiter {
    pub fn new(provider: impl Into<String>, rps: f64, burst: u32, backoff_max_ms: i64) -> Self {
        let rps = rps.max(0.01);
        let quota = Quota::per_second(NonZeroU32::new(rps.ceil() as u32).unwrap())
            .allow_burst(NonZeroU32::new(burst.max(1)).unwrap());
        Self {
            provider: provider.into(),
            limiter: GovernorRateLimiter::direct(quota),
            backoff: Mutex::new(None),
            backoff_max_ms,
        }
    }

    fn active_backoff(&self, clock: &dyn Clock) -> Option<i64> {
        let guard = self.backoff.lock();
        match &*guard {
            Some(b) if clock.now_ms() < b.until_ms => Some(b.until_ms),
            _ => None,
        }
    }

    /// Record a 429 with an optional `Retry-After` hint (seconds). Enters or
    /// extends an exponential backoff window, capped by `backoff_max_ms`.
    pub fn record_rate_limited(&self, clock: &dyn Clock, retry_after_secs: Option<u64>) {
        let now = clock.now_ms();
        let mut guard = self.backoff.lock();
        let prev_window = guard.as_ref().map(|b| b.window_ms).unwrap_or(1_000);
        let hinted = retry_after_secs.map(|s| (s as i64) * 1_000);
        let window_ms = hinted
            .unwrap_or_else(|| (prev_window * 2).min(self.backoff_max_ms))
            .min(self.backoff_max_ms);
        warn!(provider = %self.provider, window_ms, "entering rate-limit backoff");
        *guard = Some(Backoff {
            until_ms: now + window_ms,
            window_ms,
        });
    }

    /// Non-blocking: `Ok(())` if a token is immediately available and no
    /// backoff is active, `Err(RateLimited)` otherwise.
    pub fn try_acquire(&self, clock: &dyn Clock) -> Result<(), ProviderError> {
        if let Some(until) = self.active_backoff(clock) {
            return Err(ProviderError::RateLimited {
                provider: self.provider.clone(),
                until,
            });
        }
        self.limiter.check().map_err(|_| ProviderError::RateLimited {
            provider: self.provider.clone(),
            until: clock.now_ms(),
        })
    }

    /// Suspend until a token is available, or fail fast if a backoff window
    /// from a prior 429 is still active.
    pub async fn wait(&self, clock: &dyn Clock) -> Result<(), ProviderError> {
        if let Some(until) = self.active_backoff(clock) {
            return Err(ProviderError::RateLimited {
                provider: self.provider.clone(),
                until,
            });
        }
        self.limiter.until_ready().await;
        debug!(provider = %self.provider, "rate-limit token acquired");
        Ok(())
    }
}

/// Registry of [`HostLimiter`]s keyed by `(provider, host)`.
pub struct RateLimiterRegistry {
    limiters: RwLock<HashMap<(String, String), Arc<HostLimiter>>>,
    backoff_max_ms: i64,
}

impl RateLimiterRegistry {
    pub fn new(backoff_max: Duration) -> Self {
        Self {
            limiters: RwLock::new(HashMap::new()),
            backoff_max_ms: backoff_max.as_millis() as i64,
        }
    }

    pub fn get_or_create(&self, provider: &str, host: &str, rps: f64, burst: u32) -> Arc<HostLimiter> {
        let key = (provider.to_string(), host.to_string());
        if let Some(existing) = self.limiters.read().get(&key) {
            return existing.clone();
        }
        let mut write = self.limiters.write();
        write
            .entry(key)
            .or_insert_with(|| {
                Arc::new(HostLimiter::new(provider, rps, burst, self.backoff_max_ms))
            })
            .clone()
    }
}
