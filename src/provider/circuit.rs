// =============================================================================
// Circuit Breaker — per-provider 3-state machine
// =============================================================================
//
// Closed -> Open on `failure_threshold` consecutive failures. Open rejects
// everything until `timeout_ms` elapses, then moves to Half-Open, which lets
// a bounded number of probes through (`max_concurrent`); `success_threshold`
// consecutive probe successes closes the circuit again, a single probe
// failure reopens it.

use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};

use parking_lot::Mutex;
use tracing::{info, warn};

use crate::clock::Clock;
use crate::error::ProviderError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

struct Inner {
    state: CircuitState,
    consecutive_failures: u32,
    consecutive_successes: u32,
    opened_at_ms: i64,
    half_open_inflight: u32,
}

pub struct CircuitBreaker {
    provider: String,
    failure_threshold: u32,
    success_threshold: u32,
    timeout_ms: i64,
    max_concurrent_probes: u32,
    inner: Mutex<Inner>,
    // Fast-path state readable without locking, kept in sync with `inner`.
    state_hint: AtomicU32,
    opened_hint_ms: AtomicI64,
}

const STATE_CLOSED: u32 = 0;
const STATE_OPEN: u32 = 1;
const STATE_HALF_OPEN: u32 = 2;

fn state_to_u32(s: CircuitState) -> u32 {
    match s {
        CircuitState::Closed => STATE_CLOSED,
        CircuitState::Open => STATE_OPEN,
        CircuitState::HalfOpen => STATE_HALF_OPEN,
    }
}

impl CircuitBreaker {
    pub fn new(
        provider: impl Into<String>,
        failure_threshold: u32,
        success_threshold: u32,
        timeout_ms: i64,
        max_concurrent_probes: u32,
    ) -> Self {
        Self {
            provider: provider.into(),
            failure_threshold: failure_threshold.max(1),
            success_threshold: success_threshold.max(1),
            timeout_ms,
            max_concurrent_probes: max_concurrent_probes.max(1),
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                consecutive_successes: 0,
                opened_at_ms: 0,
                half_open_inflight: 0,
            }),
            state_hint: AtomicU32::new(STATE_CLOSED),
            opened_hint_ms: AtomicI64::new(0),
        }
    }

    pub fn state(&self) -> CircuitState {
        match self.state_hint.load(Ordering::Acquire) {
            STATE_OPEN => CircuitState::Open,
            STATE_HALF_OPEN => CircuitState::HalfOpen,
            _ => CircuitState::Closed,
        }
    }

    /// Call before issuing a request. Returns a permit token that must be
    /// released via [`on_success`]/[`on_failure`] exactly once.
    pub fn admit(&self, clock: &dyn Clock) -> Result<(), ProviderError> {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => Ok(()),
            CircuitState::Open => {
                let now = clock.now_ms();
                if now - inner.opened_at_ms >= self.timeout_ms {
                    inner.state = CircuitState::HalfOpen;
                    inner.consecutive_successes = 0;
                    inner.half_open_inflight = 0;
                    self.state_hint.store(STATE_HALF_OPEN, Ordering::Release);
                    info!(provider = %self.provider, "circuit half-open, probing");
                    self.admit_half_open(&mut inner)
                } else {
                    Err(ProviderError::CircuitOpen {
                        provider: self.provider.clone(),
                        retry_at: inner.opened_at_ms + self.timeout_ms,
                    })
                }
            }
            CircuitState::HalfOpen => self.admit_half_open(&mut inner),
        }
    }

    fn admit_half_open(&self, inner: &mut Inner) -> Result<(), ProviderError> {
        if inner.half_open_inflight >= self.max_concurrent_probes {
            return Err(ProviderError::ConcurrencyExceeded {
                provider: self.provider.clone(),
            });
        }
        inner.half_open_inflight += 1;
        Ok(())
    }

    pub fn on_success(&self, clock: &dyn Clock) {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => {
                inner.consecutive_failures = 0;
            }
            CircuitState::HalfOpen => {
                inner.half_open_inflight = inner.half_open_inflight.saturating_sub(1);
                inner.consecutive_successes += 1;
                if inner.consecutive_successes >= self.success_threshold {
                    inner.state = CircuitState::Closed;
                    inner.consecutive_failures = 0;
                    inner.consecutive_successes = 0;
                    self.state_hint.store(STATE_CLOSED, Ordering::Release);
                    info!(provider = %self.provider, "circuit closed after successful probes");
                }
            }
            CircuitState::Open => {}
        }
        let _ = clock;
    }

    pub fn on_failure(&self, clock: &dyn Clock) {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.failure_threshold {
                    self.open(&mut inner, clock);
                }
            }
            CircuitState::HalfOpen => {
                inner.half_open_inflight = inner.half_open_inflight.saturating_sub(1);
                self.open(&mut inner, clock);
            }
            CircuitState::Open => {}
        }
    }

    fn open(&self, inner: &mut Inner, clock: &dyn Clock) {
        let now = clock.now_ms();
        inner.state = CircuitState::Open;
        inner.opened_at_ms = now;
        inner.consecutive_failures = 0;
        inner.consecutive_successes = 0;
        inner.half_open_inflight = 0;
        self.opened_hint_ms.store(now, Ordering::Release);
        self.state_hint.store(STATE_OPEN, Ordering::Release);
        warn!(provider = %self.provider, "circuit opened");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use chrono::Utc;

    #[test]
    fn opens_after_consecutive_failures() {
        let clock = FixedClock::new(Utc::now());
        let breaker = CircuitBreaker::new("test", 3, 2, 10_000, 1);
        for _ in 0..3 {
            breaker.admit(&clock).unwrap();
            breaker.on_failure(&clock);
        }
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(breaker.admit(&clock).is_err());
    }

    #[test]
    fn half_open_after_timeout_then_closes_on_success_run() {
        let clock = FixedClock::new(Utc::now());
        let breaker = CircuitBreaker::new("test", 2, 2, 1_000, 1);
        breaker.admit(&clock).unwrap();
        breaker.on_failure(&clock);
        breaker.admit(&clock).unwrap();
        breaker.on_failure(&clock);
        assert_eq!(breaker.state(), CircuitState::Open);

        clock.advance_ms(1_001);
        breaker.admit(&clock).unwrap();
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        breaker.on_success(&clock);
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        breaker.admit(&clock).unwrap();
        breaker.on_success(&clock);
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn half_open_probe_failure_reopens() {
        let clock = FixedClock::new(Utc::now());
        let breaker = CircuitBreaker::new("test", 1, 2, 1_000, 1);
        breaker.admit(&clock).unwrap();
        breaker.on_failure(&clock);
        clock.advance_ms(1_001);
        breaker.admit(&clock).unwrap();
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        breaker.on_failure(&clock);
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[test]
    fn half_open_respects_max_concurrent_probes() {
        let clock = FixedClock::new(Utc::now());
        let breaker = CircuitBreaker::new("test", 1, 3, 1_000, 1);
        breaker.admit(&clock).unwrap();
        breaker.on_failure(&clock);
        clock.advance_ms(1_001);
        breaker.admit(&clock).unwrap();
        assert!(matches!(
            breaker.admit(&clock),
            Err(ProviderError::ConcurrencyExceeded { .. })
        ));
    }
}
