// =============================================================================
// Provider middleware — composes rate limiter + budget + circuit + cache
// =============================================================================
//
// Fixed request pipeline for every outbound provider call:
//   1. cache lookup (GET-shaped requests only)
//   2. budget check (non-consuming)
//   3. rate-limit wait
//   4. circuit-breaker admit
//   5. transport roundtrip
//   6. classify HTTP status, report outcome to the circuit breaker
//   7. consume budget, store cache entry on success
// A circuit-open or budget-exhausted provider still serves degraded cache
// entries for GET-shaped reads, trading staleness for availability.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use reqwest::{Client, Method, StatusCode};
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::config::ProviderConfig;
use crate::error::ProviderError;
use crate::provider::budget::{BudgetDecision, BudgetTracker};
use crate::provider::cache::{Cache, CacheTierConfig};
use crate::provider::circuit::CircuitBreaker;
use crate::provider::rate_limiter::HostLimiter;
use crate::types::CacheTier;

const USER_AGENT: &str = concat!("cryptorun/", env!("CARGO_PKG_VERSION"));

pub struct ProviderMiddleware {
    name: String,
    http: Client,
    limiter: HostLimiter,
    budget: BudgetTracker,
    circuit: CircuitBreaker,
    cache: Cache,
    request_timeout: Duration,
}

pub struct FetchOutcome {
    pub body: serde_json::Value,
    pub from_cache: bool,
    pub degraded: bool,
}

impl ProviderMiddleware {
    pub fn new(name: impl Into<String>, config: &ProviderConfig, clock: &dyn Clock) -> Self {
        let name = name.into();
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .expect("reqwest client config is static and valid");
        Self {
            limiter: HostLimiter::new(&name, config.rps, config.burst, 5 * 60_000),
            budget: BudgetTracker::new(&name, config.day_limit, config.month_limit, config.warn_ratio, clock),
            circuit: CircuitBreaker::new(
                &name,
                config.circuit.failure_threshold,
                config.circuit.success_threshold,
                config.circuit.timeout_ms as i64,
                config.circuit.max_concurrent,
            ),
            cache: Cache::new(CacheTierConfig {
                hot_ttl_ms: config.cache.hot_ttl_ms as i64,
                warm_ttl_ms: config.cache.warm_ttl_ms as i64,
                cold_ttl_ms: config.cache.cold_ttl_ms as i64,
                degraded_ttl_ms: config.cache.degraded_ttl_ms as i64,
                max_size: config.cache.max_size,
            }),
            http,
            request_timeout: Duration::from_millis(config.request_timeout_ms),
            name,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn cache(&self) -> &Cache {
        &self.cache
    }

    /// `cache_key = None` skips the cache entirely (non-GET or non-cacheable
    /// calls); `cache_tier` selects which TTL bucket a successful response is
    /// stored under.
    pub async fn get_json(
        &self,
        url: &str,
        cache_key: Option<&str>,
        cache_tier: CacheTier,
        clock: &dyn Clock,
    ) -> Result<FetchOutcome, ProviderError> {
        if let Some(key) = cache_key {
            if let Some(entry) = self.cache.get(key, clock) {
                debug!(provider = %self.name, key, "cache hit");
                return Ok(FetchOutcome { body: entry.payload, from_cache: true, degraded: false });
            }
        }

        match self.budget.allow(clock) {
            Ok(BudgetDecision::Warning { used, limit }) => {
                warn!(provider = %self.name, used, limit, "budget warning threshold crossed");
            }
            Ok(BudgetDecision::Ok) => {}
            Err(e) => return self.degraded_or_err(cache_key, e),
        }

        if let Err(e) = self.limiter.wait(clock).await {
            return self.degraded_or_err(cache_key, e);
        }

        if let Err(e) = self.circuit.admit(clock) {
            return self.degraded_or_err(cache_key, e);
        }

        let result = self.http.request(Method::GET, url).send().await;
        let outcome = match result {
            Ok(resp) => self.classify(resp, clock).await,
            Err(e) => {
                self.circuit.on_failure(clock);
                Err(ProviderError::TransportError { provider: self.name.clone(), message: e.to_string() })
            }
        };

        match outcome {
            Ok(body) => {
                self.budget.consume(clock);
                if let Some(key) = cache_key {
                    self.cache.put(key, body.clone(), cache_tier, clock);
                    self.cache.set_degraded(key, false);
                }
                Ok(FetchOutcome { body, from_cache: false, degraded: false })
            }
            Err(e) => self.degraded_or_err(cache_key, e),
        }
    }

    async fn classify(&self, resp: reqwest::Response, clock: &dyn Clock) -> Result<serde_json::Value, ProviderError> {
        let status = resp.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = resp
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok());
            self.limiter.record_rate_limited(clock, retry_after);
            self.circuit.on_failure(clock);
            return Err(ProviderError::RateLimited { provider: self.name.clone(), until: clock.now_ms() });
        }
        if status.is_server_error() {
            self.circuit.on_failure(clock);
            return Err(ProviderError::HttpError { provider: self.name.clone(), status: status.as_u16() });
        }
        if !status.is_success() {
            self.circuit.on_failure(clock);
            return Err(ProviderError::HttpError { provider: self.name.clone(), status: status.as_u16() });
        }
        match resp.json::<serde_json::Value>().await {
            Ok(body) => {
                self.circuit.on_success(clock);
                Ok(body)
            }
            Err(e) => {
                self.circuit.on_failure(clock);
                Err(ProviderError::TransportError { provider: self.name.clone(), message: e.to_string() })
            }
        }
    }

    fn degraded_or_err(&self, cache_key: Option<&str>, err: ProviderError) -> Result<FetchOutcome, ProviderError> {
        if let Some(key) = cache_key {
            if let Some(entry) = self.cache.get_degraded(key) {
                warn!(provider = %self.name, key, error = %err, "serving degraded cache entry");
                self.cache.set_degraded(key, true);
                return Ok(FetchOutcome { body: entry.payload, from_cache: true, degraded: true });
            }
        }
        Err(err)
    }
}

/// Registry of middleware instances keyed by provider name, composed once at
/// startup from config and then shared (never a global singleton) through
/// whatever owns the scan pipeline.
pub struct ProviderFabric {
    providers: RwLock<HashMap<String, Arc<ProviderMiddleware>>>,
}

impl ProviderFabric {
    pub fn new() -> Self {
        Self { providers: RwLock::new(HashMap::new()) }
    }

    pub fn register(&self, name: &str, config: &ProviderConfig, clock: &dyn Clock) {
        self.providers
            .write()
            .insert(name.to_string(), Arc::new(ProviderMiddleware::new(name, config, clock)));
    }

    pub fn get(&self, name: &str) -> Option<Arc<ProviderMiddleware>> {
        self.providers.read().get(name).cloned()
    }
}

impl Default for ProviderFabric {
    fn default() -> Self {
        Self::new()
    }
}
