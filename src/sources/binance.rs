// =============================================================================
// Binance source — 24h ticker, klines REST endpoint, WebSocket ticker parsing
// =============================================================================
//
// All endpoints used here are public; no signing.  Binance encodes most
// numeric values as JSON strings, so every field goes through a defensive
// string-or-number parse and non-finite values are treated as missing (they
// trigger fallback, never a distinct error kind).
// =============================================================================

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{debug, instrument, warn};

use crate::config::FeedConfig;
use crate::types::{Candle, PriceSnapshot};

/// Client for the exchange's public REST market-data endpoints.
#[derive(Debug, Clone)]
pub struct ExchangeClient {
    base_url: String,
    symbol: String,
    client: reqwest::Client,
}

impl ExchangeClient {
    /// Create a client from the feed config, re-using a shared HTTP client.
    pub fn new(config: &FeedConfig, client: reqwest::Client) -> Self {
        Self {
            base_url: config.exchange_base_url.clone(),
            symbol: config.symbol.clone(),
            client,
        }
    }

    /// GET /api/v3/ticker/24hr — current price with 24h statistics.
    ///
    /// The exchange does not report market cap, so `market_cap` is `None`.
    #[instrument(skip(self), name = "binance::fetch_ticker")]
    pub async fn fetch_ticker(&self) -> Result<PriceSnapshot> {
        let url = format!(
            "{}/api/v3/ticker/24hr?symbol={}",
            self.base_url, self.symbol
        );

        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .context("GET /api/v3/ticker/24hr request failed")?;

        let status = resp.status();
        let body: serde_json::Value = resp
            .json()
            .await
            .context("failed to parse ticker response")?;

        if !status.is_success() {
            anyhow::bail!("Binance GET /api/v3/ticker/24hr returned {}: {}", status, body);
        }

        let snapshot = parse_ticker(&body)?;
        debug!(price = snapshot.price, "exchange ticker fetched");
        Ok(snapshot)
    }

    /// GET /api/v3/klines — native OHLCV as an array-of-arrays.
    ///
    /// Array indices: [0] openTime (ms), [1] open, [2] high, [3] low,
    /// [4] close, [5] volume; the remaining elements are ignored.
    #[instrument(skip(self), name = "binance::fetch_klines")]
    pub async fn fetch_klines(&self, interval: &str, limit: u32) -> Result<Vec<Candle>> {
        let url = format!(
            "{}/api/v3/klines?symbol={}&interval={}&limit={}",
            self.base_url, self.symbol, interval, limit
        );

        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .context("GET /api/v3/klines request failed")?;

        let status = resp.status();
        let body: serde_json::Value = resp
            .json()
            .await
            .context("failed to parse klines response")?;

        if !status.is_success() {
            anyhow::bail!("Binance GET /api/v3/klines returned {}: {}", status, body);
        }

        let candles = parse_klines(&body)?;
        debug!(interval, count = candles.len(), "klines fetched");
        Ok(candles)
    }
}

// ---------------------------------------------------------------------------
// Payload parsers (pure)
// ---------------------------------------------------------------------------

/// Parse a 24h ticker REST body into a snapshot.
///
/// `lastPrice` is the required field; a missing or non-numeric value is an
/// error so the caller falls through to the next source.
pub fn parse_ticker(body: &serde_json::Value) -> Result<PriceSnapshot> {
    let price = parse_str_f64(&body["lastPrice"]).context("missing field lastPrice")?;
    if price <= 0.0 {
        anyhow::bail!("ticker lastPrice is not positive: {price}");
    }

    // Secondary fields degrade to 0 rather than failing the whole snapshot.
    let price_change_24h = parse_str_f64(&body["priceChangePercent"]).unwrap_or(0.0);
    let volume_24h = parse_str_f64(&body["quoteVolume"]).unwrap_or(0.0);

    Ok(PriceSnapshot {
        price,
        price_change_24h,
        volume_24h,
        market_cap: None,
        last_updated: Utc::now(),
    })
}

/// Parse a klines array-of-arrays body.
pub fn parse_klines(body: &serde_json::Value) -> Result<Vec<Candle>> {
    let raw = body.as_array().context("klines response is not an array")?;

    let mut candles = Vec::with_capacity(raw.len());
    for entry in raw {
        let arr = entry.as_array().context("kline entry is not an array")?;

        if arr.len() < 6 {
            warn!("skipping malformed kline entry with {} elements", arr.len());
            continue;
        }

        let open_time_ms = arr[0].as_i64().context("kline openTime is not an integer")?;
        let open = parse_str_f64(&arr[1])?;
        let high = parse_str_f64(&arr[2])?;
        let low = parse_str_f64(&arr[3])?;
        let close = parse_str_f64(&arr[4])?;
        let volume = parse_str_f64(&arr[5])?;

        candles.push(Candle {
            time: open_time_ms / 1000,
            open,
            high,
            low,
            close,
            volume,
        });
    }

    Ok(candles)
}

/// Parse a WebSocket `@ticker` stream message.
///
/// Expected shape:
/// ```json
/// { "e": "24hrTicker", "s": "BTCUSDT", "c": "37000.00", "P": "1.25", "v": "12345.6" }
/// ```
/// `v` is base-asset volume; dollar volume is `v * price`.  The push feed
/// carries no market cap.
pub fn parse_stream_ticker(text: &str) -> Result<PriceSnapshot> {
    let root: serde_json::Value =
        serde_json::from_str(text).context("failed to parse ticker JSON")?;

    let price = parse_str_f64(&root["c"]).context("missing field c")?;
    if price <= 0.0 {
        anyhow::bail!("stream ticker price is not positive: {price}");
    }
    let price_change_24h = parse_str_f64(&root["P"]).context("missing field P")?;
    let base_volume = parse_str_f64(&root["v"]).context("missing field v")?;

    Ok(PriceSnapshot {
        price,
        price_change_24h,
        volume_24h: base_volume * price,
        market_cap: None,
        last_updated: Utc::now(),
    })
}

/// Parse a JSON value that may be either a string or a number into a finite
/// `f64`.  NaN and infinities count as missing.
fn parse_str_f64(val: &serde_json::Value) -> Result<f64> {
    let parsed = if let Some(s) = val.as_str() {
        s.parse::<f64>()
            .with_context(|| format!("failed to parse '{s}' as f64"))?
    } else if let Some(n) = val.as_f64() {
        n
    } else {
        anyhow::bail!("expected string or number, got: {val}")
    };

    if !parsed.is_finite() {
        anyhow::bail!("numeric field is not finite: {parsed}");
    }
    Ok(parsed)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_ticker_ok() {
        let body = serde_json::json!({
            "symbol": "BTCUSDT",
            "lastPrice": "37000.50",
            "priceChangePercent": "-1.23",
            "quoteVolume": "987654321.0"
        });
        let snap = parse_ticker(&body).expect("should parse");
        assert!((snap.price - 37000.50).abs() < f64::EPSILON);
        assert!((snap.price_change_24h + 1.23).abs() < f64::EPSILON);
        assert_eq!(snap.market_cap, None);
    }

    #[test]
    fn parse_ticker_missing_price_is_error() {
        let body = serde_json::json!({ "symbol": "BTCUSDT" });
        assert!(parse_ticker(&body).is_err());
    }

    #[test]
    fn parse_ticker_non_numeric_price_is_error() {
        let body = serde_json::json!({ "lastPrice": "not-a-number" });
        assert!(parse_ticker(&body).is_err());
    }

    #[test]
    fn parse_ticker_tolerates_missing_secondary_fields() {
        let body = serde_json::json!({ "lastPrice": "42000.0" });
        let snap = parse_ticker(&body).expect("should parse");
        assert!((snap.price_change_24h).abs() < f64::EPSILON);
        assert!((snap.volume_24h).abs() < f64::EPSILON);
    }

    #[test]
    fn parse_klines_ok() {
        let body = serde_json::json!([
            [1700000000000i64, "36900.0", "37100.0", "36800.0", "37000.0", "120.5",
             1700003599999i64, "4.4e6", 1500, "60.1", "2.2e6", "0"],
            [1700003600000i64, "37000.0", "37200.0", "36950.0", "37150.0", "98.2",
             1700007199999i64, "3.6e6", 1100, "44.0", "1.6e6", "0"]
        ]);
        let candles = parse_klines(&body).expect("should parse");
        assert_eq!(candles.len(), 2);
        assert_eq!(candles[0].time, 1_700_000_000);
        assert!((candles[1].close - 37150.0).abs() < f64::EPSILON);
    }

    #[test]
    fn parse_klines_skips_short_entries() {
        let body = serde_json::json!([
            [1700000000000i64, "36900.0"],
            [1700003600000i64, "37000.0", "37200.0", "36950.0", "37150.0", "98.2"]
        ]);
        let candles = parse_klines(&body).expect("should parse");
        assert_eq!(candles.len(), 1);
    }

    #[test]
    fn parse_klines_rejects_non_array_root() {
        let body = serde_json::json!({ "code": -1121, "msg": "Invalid symbol." });
        assert!(parse_klines(&body).is_err());
    }

    #[test]
    fn parse_stream_ticker_ok() {
        let json = r#"{
            "e": "24hrTicker",
            "s": "BTCUSDT",
            "c": "37000.00",
            "P": "1.25",
            "v": "1000.0"
        }"#;
        let snap = parse_stream_ticker(json).expect("should parse");
        assert!((snap.price - 37000.0).abs() < f64::EPSILON);
        assert!((snap.volume_24h - 37_000_000.0).abs() < f64::EPSILON);
        assert_eq!(snap.market_cap, None);
    }

    #[test]
    fn parse_stream_ticker_missing_field_is_error() {
        let json = r#"{ "e": "24hrTicker", "c": "37000.00" }"#;
        assert!(parse_stream_ticker(json).is_err());
    }
}
