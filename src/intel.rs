// =============================================================================
// Intel — funding, open interest, and ETF flow signals for the entry gate stack
// =============================================================================
//
// Supplies the provider-sourced numbers consumed by gates 8-10 (funding
// divergence, OI residual, ETF flow tint). Each fetcher goes through the same
// `ProviderMiddleware` pipeline as venue adapters: cache, budget, rate limit,
// circuit breaker. A provider outage degrades to "gate fails, data
// unavailable" rather than aborting the scan.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::clock::Clock;
use crate::error::ProviderError;
use crate::provider::ProviderMiddleware;
use crate::types::{CacheTier, Venue};

/// Per-venue funding rate reading, percent.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FundingReading {
    pub venue: Venue,
    pub rate_pct: f64,
}

/// Result of the cross-venue funding divergence check (gate 8).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FundingDivergence {
    pub max_divergence: f64,
    pub readings: Vec<FundingReading>,
}

/// Result of the OI residual check (gate 9).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct OpenInterestResidual {
    pub current_oi_usd: f64,
    pub residual_usd: f64,
}

/// Result of the ETF flow tint check (gate 10), when applicable to the symbol.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EtfFlowTint {
    pub tint: f64,
}

fn funding_endpoint(venue: Venue, symbol: &str) -> (&'static str, String) {
    match venue {
        Venue::Binance => (
            "binance_futures",
            format!("https://fapi.binance.com/fapi/v1/fundingRate?symbol={symbol}&limit=1"),
        ),
        Venue::Okx => (
            "okx_futures",
            format!("https://www.okx.com/api/v5/public/funding-rate?instId={symbol}-SWAP"),
        ),
        Venue::Kraken | Venue::Coinbase => {
            // Neither venue publishes a perpetual funding rate; spot-only.
            ("", String::new())
        }
    }
}

fn parse_funding_rate_pct(venue: Venue, body: &serde_json::Value) -> Option<f64> {
    match venue {
        Venue::Binance => {
            let entry = body.as_array()?.first()?;
            let rate: f64 = entry["fundingRate"].as_str()?.parse().ok()?;
            Some(rate * 100.0)
        }
        Venue::Okx => {
            let entry = body["data"].as_array()?.first()?;
            let rate: f64 = entry["fundingRate"].as_str()?.parse().ok()?;
            Some(rate * 100.0)
        }
        _ => None,
    }
}

/// Fetches funding rate from every venue that publishes one for `symbol` and
/// reports the maximum pairwise divergence. Fails with
/// [`ProviderError::InsufficientData`] (surfaced by the gate as "data
/// unavailable") when fewer than two venues answer.
pub async fn funding_divergence(
    middlewares: &HashMap<Venue, Arc<ProviderMiddleware>>,
    symbol: &str,
    clock: &dyn Clock,
) -> Result<FundingDivergence, ProviderError> {
    let mut readings = Vec::new();

    for (&venue, mw) in middlewares {
        let (provider_tag, url) = funding_endpoint(venue, symbol);
        if provider_tag.is_empty() {
            continue;
        }
        let cache_key = format!("funding:{venue}:{symbol}");
        let outcome = mw.get_json(&url, Some(&cache_key), CacheTier::Hot, clock).await;
        if let Ok(fetch) = outcome {
            if let Some(rate_pct) = parse_funding_rate_pct(venue, &fetch.body) {
                readings.push(FundingReading { venue, rate_pct });
            }
        }
    }

    if readings.len() < 2 {
        debug!(symbol, count = readings.len(), "funding divergence: insufficient venues");
        return Err(ProviderError::InsufficientData {
            symbol: symbol.to_string(),
            reason: "funding divergence requires at least 2 reporting venues".into(),
        });
    }

    let mut max_divergence: f64 = 0.0;
    for i in 0..readings.len() {
        for j in (i + 1)..readings.len() {
            let d = (readings[i].rate_pct - readings[j].rate_pct).abs();
            if d > max_divergence {
                max_divergence = d;
            }
        }
    }

    Ok(FundingDivergence { max_divergence, readings })
}

fn oi_endpoint(venue: Venue, symbol: &str) -> (&'static str, String) {
    match venue {
        Venue::Binance => (
            "binance_futures",
            format!("https://fapi.binance.com/fapi/v1/openInterest?symbol={symbol}"),
        ),
        _ => ("", String::new()),
    }
}

/// Fetches current open interest (in quote-currency USD) and compares it
/// against `baseline_usd` (e.g. a trailing average supplied by the caller) to
/// produce the residual consumed by gate 9.
pub async fn open_interest_residual(
    mw: &ProviderMiddleware,
    venue: Venue,
    symbol: &str,
    last_price: f64,
    baseline_usd: f64,
    clock: &dyn Clock,
) -> Result<OpenInterestResidual, ProviderError> {
    let (provider_tag, url) = oi_endpoint(venue, symbol);
    if provider_tag.is_empty() {
        return Err(ProviderError::InsufficientData {
            symbol: symbol.to_string(),
            reason: format!("{venue} does not publish open interest"),
        });
    }

    let cache_key = format!("oi:{venue}:{symbol}");
    let fetch = mw.get_json(&url, Some(&cache_key), CacheTier::Hot, clock).await?;

    let contracts: f64 = fetch
        .body
        .get("openInterest")
        .and_then(|v| v.as_str())
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| ProviderError::InsufficientData {
            symbol: symbol.to_string(),
            reason: "open interest response missing openInterest field".into(),
        })?;

    let current_oi_usd = contracts * last_price;
    Ok(OpenInterestResidual {
        current_oi_usd,
        residual_usd: current_oi_usd - baseline_usd,
    })
}

/// ETF flow is a coarse daily signal; most symbols have no associated ETF and
/// the gate treats that as "not applicable" rather than a failure.
pub fn etf_flow_tint(_symbol: &str) -> Option<EtfFlowTint> {
    None
}

/// Open interest residual against a trailing baseline, tracked across calls
/// via the middleware's point-in-time snapshot store rather than requiring
/// the caller to carry a baseline forward itself. The baseline is the latest
/// OI reading captured at least `lookback_ms` ago; a symbol's first call has
/// no such reading and bootstraps with a zero residual rather than failing.
pub async fn open_interest_residual_tracked(
    mw: &ProviderMiddleware,
    venue: Venue,
    symbol: &str,
    last_price: f64,
    lookback_ms: i64,
    clock: &dyn Clock,
) -> Result<OpenInterestResidual, ProviderError> {
    let pit_key = format!("oi_baseline:{venue}:{symbol}");
    let baseline_usd = mw
        .cache()
        .get_pit(&pit_key, clock.now_ms() - lookback_ms)
        .and_then(|snap| snap.payload.as_f64());

    let result = open_interest_residual(mw, venue, symbol, last_price, baseline_usd.unwrap_or(0.0), clock).await?;
    mw.cache().snapshot_pit(&pit_key, serde_json::json!(result.current_oi_usd), "intel::open_interest_residual_tracked", clock);
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn divergence_is_max_pairwise_difference() {
        let readings = vec![
            FundingReading { venue: Venue::Binance, rate_pct: 0.01 },
            FundingReading { venue: Venue::Okx, rate_pct: -0.04 },
        ];
        let mut max_divergence: f64 = 0.0;
        for i in 0..readings.len() {
            for j in (i + 1)..readings.len() {
                let d = (readings[i].rate_pct - readings[j].rate_pct).abs();
                if d > max_divergence {
                    max_divergence = d;
                }
            }
        }
        assert!((max_divergence - 0.05).abs() < 1e-9);
    }

    #[test]
    fn etf_flow_defaults_to_not_applicable() {
        assert!(etf_flow_tint("BTCUSD").is_none());
    }

    #[test]
    fn parse_binance_funding_rate() {
        let body = serde_json::json!([{"fundingRate": "0.0001", "fundingTime": 123}]);
        let pct = parse_funding_rate_pct(Venue::Binance, &body).unwrap();
        assert!((pct - 0.01).abs() < 1e-9);
    }
}
