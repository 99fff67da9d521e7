// =============================================================================
// CryptoRun — Main Entry Point
// =============================================================================

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use cryptorun::clock::SystemClock;
use cryptorun::config::CryptoRunConfig;
use cryptorun::facade::DataFacade;
use cryptorun::factors::select_regime;
use cryptorun::market_data::{CandleBuffer, CandleKey};
use cryptorun::microstructure::MicrostructureProcessor;
use cryptorun::provider::ProviderFabric;
use cryptorun::scan::{self, ScanPipelineConfig};
use cryptorun::types::{Kline, Venue};
use cryptorun::venue::guard::AggregatorGuard;
use cryptorun::venue::rest::RestVenueAdapter;

const VENUE_BASE_URLS: &[(Venue, &str)] =
    &[(Venue::Binance, "https://api.binance.com"), (Venue::Kraken, "https://api.kraken.com"), (Venue::Okx, "https://www.okx.com")];

fn load_config(path: &str) -> CryptoRunConfig {
    match std::fs::read_to_string(path) {
        Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
            warn!(error = %e, path, "failed to parse config file, using defaults");
            CryptoRunConfig::default()
        }),
        Err(_) => {
            info!(path, "no config file found, using defaults");
            CryptoRunConfig::default()
        }
    }
}

fn default_universe() -> Vec<String> {
    std::env::var("CRYPTORUN_SYMBOLS")
        .ok()
        .map(|syms| syms.split(',').map(|s| s.trim().to_uppercase()).filter(|s| !s.is_empty()).collect())
        .filter(|v: &Vec<String>| !v.is_empty())
        .unwrap_or_else(|| vec!["BTCUSD".to_string(), "ETHUSD".to_string(), "SOLUSD".to_string()])
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("CryptoRun scanner starting up");
    AggregatorGuard::self_test();

    let config = load_config("cryptorun.json");
    let clock = SystemClock;

    let fabric = ProviderFabric::new();
    for (venue, _) in VENUE_BASE_URLS {
        let provider_cfg = config.providers.get(venue.name()).cloned().unwrap_or_default();
        fabric.register(venue.name(), &provider_cfg, &clock);
    }

    let mut facade = DataFacade::new(config.reconcile.clone());
    let mut intel_middlewares = std::collections::HashMap::new();
    for (venue, base_url) in VENUE_BASE_URLS {
        let middleware = fabric.get(venue.name()).expect("just registered above");
        intel_middlewares.insert(*venue, middleware.clone());
        facade.register(Arc::new(RestVenueAdapter::new(*venue, *base_url, middleware)));
    }

    let universe = default_universe();
    let buffer = CandleBuffer::new(400);
    let microstructure = MicrostructureProcessor::new(20);

    // Seed the regime proxy series from the facade's primary symbol before
    // the scan so the selected regime is stable for every candidate.
    let proxy_symbol = universe.first().cloned().unwrap_or_else(|| "BTCUSD".to_string());
    let regime = match facade.warm_klines(&proxy_symbol, "1h", 200).await {
        Ok(bars) => {
            let closes: Vec<f64> = bars.iter().map(|k: &Kline| k.close).collect();
            let key = CandleKey { symbol: proxy_symbol.clone(), interval: "1h".to_string() };
            for bar in &bars {
                buffer.push(key.clone(), bar.clone());
            }
            select_regime(&bars, &closes)
        }
        Err(e) => {
            warn!(error = %e, "failed to seed regime proxy series, defaulting to choppy");
            cryptorun::types::Regime::Choppy
        }
    };
    info!(%regime, "regime selected for this scan");

    let pipeline_config = ScanPipelineConfig { universe: universe.clone(), max_concurrency: 8, lookback_bars: 200, top_n: 10 };

    let started_at = Utc::now();
    let result = scan::run_scan(&facade, &buffer, &microstructure, &intel_middlewares, &config, &pipeline_config, regime, &clock, |event| {
        let line = cryptorun::audit::trace_line(&event);
        println!("{}", serde_json::to_string(&line).unwrap_or_default());
    })
    .await;
    let finished_at = Utc::now();

    let report = cryptorun::audit::build_explain_report(
        uuid::Uuid::new_v4().to_string(),
        started_at,
        finished_at,
        universe.len(),
        &config,
        &result,
    );

    println!("{}", serde_json::to_string_pretty(&report)?);
    info!(
        candidates = report.summary.candidates_analyzed,
        selected = report.summary.candidates_selected,
        failed = report.summary.symbols_failed,
        "scan complete"
    );

    Ok(())
}
