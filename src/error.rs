// =============================================================================
// Provider error taxonomy
// =============================================================================
//
// A closed, matchable error type for anything that flows back out of the
// provider fabric. Internal glue code still uses `anyhow` with `.context()`;
// this enum exists specifically for the cases adapters and gates need to
// match on (rate limit vs circuit-open vs transport, etc).

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    RateLimit,
    Budget,
    Circuit,
    Transport,
    HttpError,
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("{provider}: rate limited until {until}")]
    RateLimited { provider: String, until: i64 },

    #[error("{provider}: budget exhausted, resets at {eta_reset}")]
    BudgetExhausted { provider: String, eta_reset: i64 },

    #[error("{provider}: circuit open, retry at {retry_at}")]
    CircuitOpen { provider: String, retry_at: i64 },

    #[error("{provider}: concurrency limit exceeded")]
    ConcurrencyExceeded { provider: String },

    #[error("{provider}: transport error: {message}")]
    TransportError { provider: String, message: String },

    #[error("{provider}: http error {status}")]
    HttpError { provider: String, status: u16 },

    #[error("aggregator violation: {source} is not permitted for {data_type} ({reason})")]
    AggregatorViolation {
        source: String,
        data_type: String,
        reason: String,
    },

    #[error("insufficient data for {symbol}: {reason}")]
    InsufficientData { symbol: String, reason: String },

    #[error("stale data discarded for {symbol}, age_ms={age_ms}")]
    StaleData { symbol: String, age_ms: i64 },

    #[error("invariant violation: {detail}")]
    InvariantViolation { detail: String },

    #[error("insufficient reconciliation sources: have {have}, need {need}")]
    InsufficientSources { have: usize, need: usize },

    #[error("insufficient reconciliation sources after trimming outliers: have {have}, need {need}")]
    InsufficientAfterTrim { have: usize, need: usize },
}

impl ProviderError {
    /// The provider-error `kind` tag from the external-interfaces contract, or
    /// `None` for errors that aren't part of the tagged `ProviderError{...}`
    /// family (e.g. aggregator/invariant failures, which are fatal and never
    /// recovered rather than retried).
    pub fn kind(&self) -> Option<ProviderErrorKind> {
        match self {
            ProviderError::RateLimited { .. } => Some(ProviderErrorKind::RateLimit),
            ProviderError::BudgetExhausted { .. } => Some(ProviderErrorKind::Budget),
            ProviderError::CircuitOpen { .. } | ProviderError::ConcurrencyExceeded { .. } => {
                Some(ProviderErrorKind::Circuit)
            }
            ProviderError::TransportError { .. } => Some(ProviderErrorKind::Transport),
            ProviderError::HttpError { .. } => Some(ProviderErrorKind::HttpError),
            _ => None,
        }
    }

    /// A one-line, deterministic, user-visible reason (<= 80 chars where the
    /// interpolated fields allow it), matching the error-handling design's
    /// requirement for golden-file-stable failure text.
    pub fn user_reason(&self) -> String {
        self.to_string()
    }
}
