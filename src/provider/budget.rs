// =============================================================================
// Budget Tracker — daily + monthly request budgets
// =============================================================================

use chrono::{DateTime, Datelike, Duration as ChronoDuration, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::error::ProviderError;
use crate::types::BudgetSnapshot;

#[derive(Debug)]
struct Inner {
    used_today: u64,
    used_month: u64,
    day_anchor: DateTime<Utc>,
    month_anchor: DateTime<Utc>,
}

/// Outcome of a non-consuming [`BudgetTracker::allow`] check.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum BudgetDecision {
    Ok,
    Warning { used: u64, limit: u64 },
}

pub struct BudgetTracker {
    provider: String,
    day_limit: u64,
    month_limit: u64,
    warn_ratio: f64,
    inner: RwLock<Inner>,
}

fn day_boundary(at: DateTime<Utc>) -> DateTime<Utc> {
    at.date_naive().and_hms_opt(0, 0, 0).unwrap().and_utc()
}

fn month_boundary(at: DateTime<Utc>) -> DateTime<Utc> {
    at.date_naive()
        .with_day(1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
        .and_utc()
}

impl BudgetTracker {
    pub fn new(provider: impl Into<String>, day_limit: u64, month_limit: u64, warn_ratio: f64, clock: &dyn Clock) -> Self {
        let now = clock.now();
        Self {
            provider: provider.into(),
            day_limit,
            month_limit,
            warn_ratio,
            inner: RwLock::new(Inner {
                used_today: 0,
                used_month: 0,
                day_anchor: day_boundary(now),
                month_anchor: month_boundary(now),
            }),
        }
    }

    fn maybe_reset(&self, clock: &dyn Clock) {
        let now = clock.now();
        let today = day_boundary(now);
        let this_month = month_boundary(now);
        let needs_reset = {
            let inner = self.inner.read();
            inner.day_anchor != today || inner.month_anchor != this_month
        };
        if needs_reset {
            let mut inner = self.inner.write();
            if inner.day_anchor != today {
                inner.used_today = 0;
                inner.day_anchor = today;
            }
            if inner.month_anchor != this_month {
                inner.used_month = 0;
                inner.month_anchor = this_month;
            }
        }
    }

    /// Check (without consuming) whether a request would be allowed.
    pub fn allow(&self, clock: &dyn Clock) -> Result<BudgetDecision, ProviderError> {
        self.maybe_reset(clock);
        let inner = self.inner.read();
        if inner.used_today >= self.day_limit || inner.used_month >= self.month_limit {
            let eta = (inner.day_anchor + ChronoDuration::days(1)).timestamp_millis();
            return Err(ProviderError::BudgetExhausted {
                provider: self.provider.clone(),
                eta_reset: eta,
            });
        }
        let ratio = inner.used_today as f64 / self.day_limit.max(1) as f64;
        if ratio >= self.warn_ratio {
            return Ok(BudgetDecision::Warning {
                used: inner.used_today,
                limit: self.day_limit,
            });
        }
        Ok(BudgetDecision::Ok)
    }

    /// Atomically decrement the remaining budget. Callers must have called
    /// [`allow`] first; `consume` itself does not re-check the limit so that
    /// the middleware can refuse a request *only* after rate-limit succeeds,
    /// per the ordering in the external-interfaces contract.
    pub fn consume(&self, clock: &dyn Clock) {
        self.maybe_reset(clock);
        let mut inner = self.inner.write();
        inner.used_today += 1;
        inner.used_month += 1;
        debug!(
            provider = %self.provider,
            used_today = inner.used_today,
            used_month = inner.used_month,
            "budget consumed"
        );
    }

    pub fn snapshot(&self, clock: &dyn Clock) -> BudgetSnapshot {
        self.maybe_reset(clock);
        let inner = self.inner.read();
        let exhausted = inner.used_today >= self.day_limit || inner.used_month >= self.month_limit;
        if exhausted {
            warn!(provider = %self.provider, "budget exhausted");
        }
        BudgetSnapshot {
            used_today: inner.used_today,
            used_month: inner.used_month,
            limit_day: self.day_limit,
            limit_month: self.month_limit,
            warn_at_ratio: self.warn_ratio,
            exhausted,
            reset_eta: (inner.day_anchor + ChronoDuration::days(1)).timestamp_millis(),
        }
    }
}
