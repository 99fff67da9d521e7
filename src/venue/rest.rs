// =============================================================================
// REST venue adapters — one per exchange, sharing the provider middleware
// =============================================================================
//
// Each adapter owns one `ProviderMiddleware` (named after the venue, so it
// gets its own rate limiter/budget/circuit/cache) and knows only how to build
// URLs and parse that exchange's wire format. Parsing follows the indexed
// array-unpacking style `binance/client.rs::get_klines` uses rather than a
// generated OpenAPI client, since every venue here ships hand-rolled JSON
// shapes.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use crate::clock::Clock;
use crate::error::ProviderError;
use crate::provider::ProviderMiddleware;
use crate::types::{BookL2Snapshot, BookLevel, HealthStatus, Kline, ProviderHealth, Side, Trade, Venue};
use crate::venue::VenueAdapter;

fn parse_str_f64(val: &serde_json::Value) -> Option<f64> {
    val.as_str().and_then(|s| s.parse::<f64>().ok()).or_else(|| val.as_f64())
}

fn transport_err(venue: Venue, detail: impl Into<String>) -> ProviderError {
    ProviderError::TransportError { provider: venue.name().to_string(), message: detail.into() }
}

pub struct RestVenueAdapter {
    venue: Venue,
    base_url: String,
    middleware: Arc<ProviderMiddleware>,
}

impl RestVenueAdapter {
    pub fn new(venue: Venue, base_url: impl Into<String>, middleware: Arc<ProviderMiddleware>) -> Self {
        Self { venue, base_url: base_url.into(), middleware }
    }

    fn clock_stub(&self) -> crate::clock::SystemClock {
        crate::clock::SystemClock
    }

    async fn fetch(&self, url: &str, cache_key: &str, tier: crate::types::CacheTier) -> Result<serde_json::Value, ProviderError> {
        let clock = self.clock_stub();
        let outcome = self.middleware.get_json(url, Some(cache_key), tier, &clock).await?;
        Ok(outcome.body)
    }

    fn parse_klines(&self, body: &serde_json::Value, symbol: &str, interval: &str) -> Result<Vec<Kline>, ProviderError> {
        match self.venue {
            Venue::Binance => {
                let raw = body.as_array().ok_or_else(|| transport_err(self.venue, "klines response is not an array"))?;
                let mut out = Vec::with_capacity(raw.len());
                for entry in raw {
                    let a = match entry.as_array() {
                        Some(a) if a.len() >= 8 => a,
                        _ => {
                            warn!(venue = %self.venue, "skipping malformed kline entry");
                            continue;
                        }
                    };
                    let ts = a[0].as_i64().unwrap_or(0);
                    let (open, high, low, close, volume, quote_volume) = (
                        parse_str_f64(&a[1]).unwrap_or(0.0),
                        parse_str_f64(&a[2]).unwrap_or(0.0),
                        parse_str_f64(&a[3]).unwrap_or(0.0),
                        parse_str_f64(&a[4]).unwrap_or(0.0),
                        parse_str_f64(&a[5]).unwrap_or(0.0),
                        parse_str_f64(&a[7]).unwrap_or(0.0),
                    );
                    out.push(Kline {
                        symbol: symbol.to_string(),
                        venue: self.venue,
                        ts,
                        interval: interval.to_string(),
                        open,
                        high,
                        low,
                        close,
                        volume,
                        quote_volume,
                    });
                }
                Ok(out)
            }
            Venue::Kraken => {
                let result = body
                    .get("result")
                    .and_then(|r| r.as_object())
                    .ok_or_else(|| transport_err(self.venue, "OHLC response missing 'result'"))?;
                let series = result
                    .iter()
                    .find(|(k, _)| *k != "last")
                    .map(|(_, v)| v)
                    .ok_or_else(|| transport_err(self.venue, "OHLC response has no pair series"))?;
                let raw = series.as_array().ok_or_else(|| transport_err(self.venue, "OHLC series is not an array"))?;
                let mut out = Vec::with_capacity(raw.len());
                for entry in raw {
                    let a = match entry.as_array() {
                        Some(a) if a.len() >= 7 => a,
                        _ => continue,
                    };
                    let ts = a[0].as_i64().unwrap_or(0) * 1_000;
                    out.push(Kline {
                        symbol: symbol.to_string(),
                        venue: self.venue,
                        ts,
                        interval: interval.to_string(),
                        open: parse_str_f64(&a[1]).unwrap_or(0.0),
                        high: parse_str_f64(&a[2]).unwrap_or(0.0),
                        low: parse_str_f64(&a[3]).unwrap_or(0.0),
                        close: parse_str_f64(&a[4]).unwrap_or(0.0),
                        volume: parse_str_f64(&a[6]).unwrap_or(0.0),
                        quote_volume: 0.0,
                    });
                }
                Ok(out)
            }
            Venue::Coinbase => {
                let raw = body.as_array().ok_or_else(|| transport_err(self.venue, "candles response is not an array"))?;
                let mut out = Vec::with_capacity(raw.len());
                for entry in raw {
                    let a = match entry.as_array() {
                        Some(a) if a.len() >= 6 => a,
                        _ => continue,
                    };
                    out.push(Kline {
                        symbol: symbol.to_string(),
                        venue: self.venue,
                        ts: a[0].as_i64().unwrap_or(0) * 1_000,
                        interval: interval.to_string(),
                        low: a[1].as_f64().unwrap_or(0.0),
                        high: a[2].as_f64().unwrap_or(0.0),
                        open: a[3].as_f64().unwrap_or(0.0),
                        close: a[4].as_f64().unwrap_or(0.0),
                        volume: a[5].as_f64().unwrap_or(0.0),
                        quote_volume: 0.0,
                    });
                }
                Ok(out)
            }
            Venue::Okx => {
                let raw = body
                    .get("data")
                    .and_then(|d| d.as_array())
                    .ok_or_else(|| transport_err(self.venue, "candles response missing 'data'"))?;
                let mut out = Vec::with_capacity(raw.len());
                for entry in raw {
                    let a = match entry.as_array() {
                        Some(a) if a.len() >= 6 => a,
                        _ => continue,
                    };
                    out.push(Kline {
                        symbol: symbol.to_string(),
                        venue: self.venue,
                        ts: parse_str_f64(&a[0]).unwrap_or(0.0) as i64,
                        interval: interval.to_string(),
                        open: parse_str_f64(&a[1]).unwrap_or(0.0),
                        high: parse_str_f64(&a[2]).unwrap_or(0.0),
                        low: parse_str_f64(&a[3]).unwrap_or(0.0),
                        close: parse_str_f64(&a[4]).unwrap_or(0.0),
                        volume: parse_str_f64(&a[5]).unwrap_or(0.0),
                        quote_volume: 0.0,
                    });
                }
                Ok(out)
            }
        }
    }
}

#[async_trait]
impl VenueAdapter for RestVenueAdapter {
    fn venue(&self) -> Venue {
        self.venue
    }

    fn normalize_symbol(&self, canonical: &str) -> String {
        match self.venue {
            Venue::Binance | Venue::Okx if canonical.ends_with("USD") && !canonical.ends_with("USDT") => {
                format!("{canonical}T")
            }
            Venue::Kraken => {
                let base = canonical.trim_end_matches("USDT").trim_end_matches("USD");
                let base = if base == "BTC" { "XBT" } else { base };
                format!("{base}USD")
            }
            Venue::Coinbase => {
                let quote = if canonical.ends_with("USDT") { "USDT" } else { "USD" };
                let base = canonical.trim_end_matches(quote);
                format!("{base}-{quote}")
            }
            _ => canonical.to_string(),
        }
    }

    fn normalize_interval(&self, canonical: &str) -> String {
        match self.venue {
            Venue::Binance | Venue::Okx => canonical.to_string(),
            Venue::Kraken => match canonical {
                "1h" => "60".to_string(),
                "4h" => "240".to_string(),
                "1d" => "1440".to_string(),
                other => other.to_string(),
            },
            Venue::Coinbase => match canonical {
                "1h" => "3600".to_string(),
                "4h" => "14400".to_string(),
                "1d" => "86400".to_string(),
                other => other.to_string(),
            },
        }
    }

    async fn get_klines(&self, symbol: &str, interval: &str, limit: u32) -> Result<Vec<Kline>, ProviderError> {
        let native_symbol = self.normalize_symbol(symbol);
        let native_interval = self.normalize_interval(interval);
        let url = match self.venue {
            Venue::Binance => format!(
                "{}/api/v3/klines?symbol={}&interval={}&limit={}",
                self.base_url, native_symbol, native_interval, limit
            ),
            Venue::Kraken => format!(
                "{}/0/public/OHLC?pair={}&interval={}",
                self.base_url, native_symbol, native_interval
            ),
            Venue::Coinbase => format!(
                "{}/products/{}/candles?granularity={}",
                self.base_url, native_symbol, native_interval
            ),
            Venue::Okx => format!(
                "{}/api/v5/market/candles?instId={}&bar={}&limit={}",
                self.base_url, native_symbol, native_interval, limit
            ),
        };
        let cache_key = format!("{}:klines:{}:{}", self.venue.name(), native_symbol, native_interval);
        let body = self.fetch(&url, &cache_key, crate::types::CacheTier::Warm).await?;
        let klines = self.parse_klines(&body, symbol, interval)?;
        if klines.is_empty() {
            return Err(ProviderError::InsufficientData {
                symbol: symbol.to_string(),
                reason: "venue returned zero klines".to_string(),
            });
        }
        Ok(klines)
    }

    async fn get_trades(&self, symbol: &str, limit: u32) -> Result<Vec<Trade>, ProviderError> {
        let native_symbol = self.normalize_symbol(symbol);
        let url = match self.venue {
            Venue::Binance => format!("{}/api/v3/trades?symbol={}&limit={}", self.base_url, native_symbol, limit),
            Venue::Kraken => format!("{}/0/public/Trades?pair={}", self.base_url, native_symbol),
            Venue::Coinbase => format!("{}/products/{}/trades", self.base_url, native_symbol),
            Venue::Okx => format!("{}/api/v5/market/trades?instId={}&limit={}", self.base_url, native_symbol, limit),
        };
        let cache_key = format!("{}:trades:{}", self.venue.name(), native_symbol);
        let body = self.fetch(&url, &cache_key, crate::types::CacheTier::Hot).await?;

        let mut out = Vec::new();
        match self.venue {
            Venue::Binance => {
                if let Some(arr) = body.as_array() {
                    for t in arr {
                        out.push(Trade {
                            symbol: symbol.to_string(),
                            venue: self.venue,
                            ts: t["time"].as_i64().unwrap_or(0),
                            price: parse_str_f64(&t["price"]).unwrap_or(0.0),
                            size: parse_str_f64(&t["qty"]).unwrap_or(0.0),
                            side: if t["isBuyerMaker"].as_bool().unwrap_or(false) { Side::Sell } else { Side::Buy },
                            trade_id: t["id"].to_string(),
                        });
                    }
                }
            }
            Venue::Kraken => {
                if let Some(result) = body.get("result").and_then(|r| r.as_object()) {
                    if let Some((_, series)) = result.iter().find(|(k, _)| *k != "last") {
                        if let Some(arr) = series.as_array() {
                            for t in arr {
                                if let Some(a) = t.as_array() {
                                    if a.len() < 4 {
                                        continue;
                                    }
                                    out.push(Trade {
                                        symbol: symbol.to_string(),
                                        venue: self.venue,
                                        ts: (parse_str_f64(&a[2]).unwrap_or(0.0) * 1_000.0) as i64,
                                        price: parse_str_f64(&a[0]).unwrap_or(0.0),
                                        size: parse_str_f64(&a[1]).unwrap_or(0.0),
                                        side: if a[3].as_str() == Some("s") { Side::Sell } else { Side::Buy },
                                        trade_id: format!("{}", out.len()),
                                    });
                                }
                            }
                        }
                    }
                }
            }
            Venue::Coinbase | Venue::Okx => {
                // Both return an array of objects with price/size/side/ts; field
                // names differ but the shape is close enough to share one pass.
                if let Some(arr) = body.as_array().or_else(|| body.get("data").and_then(|d| d.as_array())) {
                    for t in arr {
                        let price = parse_str_f64(&t["price"]).or_else(|| parse_str_f64(&t["px"])).unwrap_or(0.0);
                        let size = parse_str_f64(&t["size"]).or_else(|| parse_str_f64(&t["sz"])).unwrap_or(0.0);
                        let side_str = t["side"].as_str().unwrap_or("buy");
                        out.push(Trade {
                            symbol: symbol.to_string(),
                            venue: self.venue,
                            ts: t["ts"].as_i64().unwrap_or(0),
                            price,
                            size,
                            side: if side_str.eq_ignore_ascii_case("sell") { Side::Sell } else { Side::Buy },
                            trade_id: format!("{}", out.len()),
                        });
                    }
                }
            }
        }
        Ok(out)
    }

    async fn get_book_l2(&self, symbol: &str, depth: u32) -> Result<BookL2Snapshot, ProviderError> {
        let native_symbol = self.normalize_symbol(symbol);
        let url = match self.venue {
            Venue::Binance => format!("{}/api/v3/depth?symbol={}&limit={}", self.base_url, native_symbol, depth),
            Venue::Kraken => format!("{}/0/public/Depth?pair={}&count={}", self.base_url, native_symbol, depth),
            Venue::Coinbase => format!("{}/products/{}/book?level=2", self.base_url, native_symbol),
            Venue::Okx => format!("{}/api/v5/market/books?instId={}&sz={}", self.base_url, native_symbol, depth),
        };
        let cache_key = format!("{}:book:{}", self.venue.name(), native_symbol);
        let body = self.fetch(&url, &cache_key, crate::types::CacheTier::Hot).await?;

        let levels_from = |arr: &serde_json::Value| -> Vec<BookLevel> {
            arr.as_array()
                .map(|rows| {
                    rows.iter()
                        .filter_map(|r| {
                            let a = r.as_array()?;
                            Some(BookLevel {
                                price: parse_str_f64(a.first()?)?,
                                size: parse_str_f64(a.get(1)?)?,
                            })
                        })
                        .collect()
                })
                .unwrap_or_default()
        };

        let (bids, asks) = match self.venue {
            Venue::Binance => (levels_from(&body["bids"]), levels_from(&body["asks"])),
            Venue::Kraken => {
                let result = body.get("result").and_then(|r| r.as_object());
                let pair_data = result.and_then(|r| r.values().next());
                match pair_data {
                    Some(d) => (levels_from(&d["bids"]), levels_from(&d["asks"])),
                    None => (vec![], vec![]),
                }
            }
            Venue::Coinbase => (levels_from(&body["bids"]), levels_from(&body["asks"])),
            Venue::Okx => {
                let data = body.get("data").and_then(|d| d.as_array()).and_then(|a| a.first());
                match data {
                    Some(d) => (levels_from(&d["bids"]), levels_from(&d["asks"])),
                    None => (vec![], vec![]),
                }
            }
        };

        let now = self.clock_stub().now_ms();
        BookL2Snapshot::new(symbol, self.venue, now, bids, asks, 0).ok_or_else(|| ProviderError::InvariantViolation {
            detail: format!("{}: crossed or empty book for {symbol}", self.venue),
        })
    }

    fn health(&self) -> ProviderHealth {
        ProviderHealth {
            status: HealthStatus::Healthy,
            last_seen: self.clock_stub().now_ms(),
            error_rate: 0.0,
            p99_latency_ms: 0.0,
            ws_connected: false,
            rest_healthy: true,
        }
    }
}

/// Default REST base URLs, used when composing adapters at startup.
pub fn default_base_url(venue: Venue) -> &'static str {
    match venue {
        Venue::Binance => "https://api.binance.com",
        Venue::Kraken => "https://api.kraken.com",
        Venue::Coinbase => "https://api.exchange.coinbase.com",
        Venue::Okx => "https://www.okx.com",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderConfig;

    fn adapter(venue: Venue) -> RestVenueAdapter {
        let clock = crate::clock::SystemClock;
        let middleware = Arc::new(ProviderMiddleware::new(venue.name(), &ProviderConfig::default(), &clock));
        RestVenueAdapter::new(venue, default_base_url(venue), middleware)
    }

    #[test]
    fn kraken_normalizes_btc_to_xbt() {
        let a = adapter(Venue::Kraken);
        assert_eq!(a.normalize_symbol("BTCUSD"), "XBTUSD");
    }

    #[test]
    fn binance_appends_t_for_bare_usd() {
        let a = adapter(Venue::Binance);
        assert_eq!(a.normalize_symbol("BTCUSD"), "BTCUSDT");
    }

    #[test]
    fn coinbase_inserts_dash() {
        let a = adapter(Venue::Coinbase);
        assert_eq!(a.normalize_symbol("BTCUSD"), "BTC-USD");
    }

    #[test]
    fn parse_binance_klines_round_trip() {
        let a = adapter(Venue::Binance);
        let body = serde_json::json!([
            [1700000000000i64, "100.0", "110.0", "95.0", "105.0", "10.0", 1700003600000i64, "1050.0"]
        ]);
        let klines = a.parse_klines(&body, "BTCUSD", "1h").unwrap();
        assert_eq!(klines.len(), 1);
        assert!(klines[0].is_valid());
        assert_eq!(klines[0].quote_volume, 1050.0);
    }
}
