// =============================================================================
// CoinGecko source — simple/price, OHLC and market-chart endpoint parsing
// =============================================================================
//
// The aggregator is the second tier of the fallback chain.  Its payload
// shapes differ per endpoint: simple/price is an object keyed by coin id,
// OHLC is an array-of-arrays without volume, and market_chart is a pair of
// parallel [timestamp_ms, value] arrays carrying only close prices.  The
// market-chart path synthesizes OHLC from closes; the OHLC path synthesizes
// volume.  There is no hourly OHLC endpoint, which is why the 1h view uses
// market_chart.
// =============================================================================

use anyhow::{Context, Result};
use chrono::Utc;
use rand::Rng;
use tracing::{debug, instrument};

use crate::config::FeedConfig;
use crate::types::{Candle, PriceSnapshot, Timeframe};

/// Fixed high/low band applied to close-only data when the raw series is too
/// sparse to observe real wicks (±0.5%).
const SPARSE_WICK_PCT: f64 = 0.005;

/// Client for the aggregator's public REST endpoints.
#[derive(Debug, Clone)]
pub struct AggregatorClient {
    base_url: String,
    coin_id: String,
    vs_currency: String,
    client: reqwest::Client,
}

impl AggregatorClient {
    /// Create a client from the feed config, re-using a shared HTTP client.
    pub fn new(config: &FeedConfig, client: reqwest::Client) -> Self {
        Self {
            base_url: config.aggregator_base_url.clone(),
            coin_id: config.coin_id.clone(),
            vs_currency: config.vs_currency.clone(),
            client,
        }
    }

    /// GET /simple/price — current price with 24h stats and market cap.
    #[instrument(skip(self), name = "coingecko::fetch_simple_price")]
    pub async fn fetch_simple_price(&self) -> Result<PriceSnapshot> {
        let url = format!(
            "{}/simple/price?ids={}&vs_currencies={}&include_24hr_change=true&include_market_cap=true&include_24hr_vol=true",
            self.base_url, self.coin_id, self.vs_currency
        );

        let body = self.get_json(&url, "simple/price").await?;
        let snapshot = parse_simple_price(&body, &self.coin_id, &self.vs_currency)?;
        debug!(price = snapshot.price, "aggregator price fetched");
        Ok(snapshot)
    }

    /// GET /coins/{id}/ohlc — daily/weekly/monthly OHLC without volume.
    #[instrument(skip(self), name = "coingecko::fetch_ohlc")]
    pub async fn fetch_ohlc(&self, timeframe: Timeframe) -> Result<Vec<Candle>> {
        let url = format!(
            "{}/coins/{}/ohlc?vs_currency={}&days={}",
            self.base_url,
            self.coin_id,
            self.vs_currency,
            timeframe.chart_days_param()
        );

        let body = self.get_json(&url, "ohlc").await?;
        let candles = parse_ohlc(&body)?;
        debug!(timeframe = %timeframe, count = candles.len(), "aggregator OHLC fetched");
        Ok(candles)
    }

    /// GET /coins/{id}/market_chart — close-only series, used for the 1h view
    /// because the aggregator has no hourly OHLC endpoint.
    #[instrument(skip(self), name = "coingecko::fetch_market_chart")]
    pub async fn fetch_market_chart(&self, timeframe: Timeframe) -> Result<Vec<Candle>> {
        let url = format!(
            "{}/coins/{}/market_chart?vs_currency={}&days={}&interval=hourly",
            self.base_url,
            self.coin_id,
            self.vs_currency,
            timeframe.chart_days_param()
        );

        let body = self.get_json(&url, "market_chart").await?;
        let interval_ms = if timeframe == Timeframe::H1 {
            3_600_000
        } else {
            86_400_000
        };
        let candles = parse_market_chart(&body, interval_ms)?;
        debug!(timeframe = %timeframe, count = candles.len(), "aggregator market chart fetched");
        Ok(candles)
    }

    async fn get_json(&self, url: &str, endpoint: &str) -> Result<serde_json::Value> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("GET {endpoint} request failed"))?;

        let status = resp.status();
        let body: serde_json::Value = resp
            .json()
            .await
            .with_context(|| format!("failed to parse {endpoint} response"))?;

        if !status.is_success() {
            anyhow::bail!("CoinGecko {endpoint} returned {}: {}", status, body);
        }
        Ok(body)
    }
}

// ---------------------------------------------------------------------------
// Payload parsers (pure)
// ---------------------------------------------------------------------------

/// Parse a simple/price body.  The root key (coin id) must be present; a
/// positive price is required, the 24h stats degrade to 0 when absent.
pub fn parse_simple_price(
    body: &serde_json::Value,
    coin_id: &str,
    vs_currency: &str,
) -> Result<PriceSnapshot> {
    let coin = body
        .get(coin_id)
        .with_context(|| format!("response missing root key '{coin_id}'"))?;

    let price = finite(coin[vs_currency].as_f64()).context("missing price field")?;
    if price <= 0.0 {
        anyhow::bail!("aggregator price is not positive: {price}");
    }

    let change_key = format!("{vs_currency}_24h_change");
    let cap_key = format!("{vs_currency}_market_cap");
    let vol_key = format!("{vs_currency}_24h_vol");

    Ok(PriceSnapshot {
        price,
        price_change_24h: finite(coin[change_key.as_str()].as_f64()).unwrap_or(0.0),
        volume_24h: finite(coin[vol_key.as_str()].as_f64()).unwrap_or(0.0),
        market_cap: Some(finite(coin[cap_key.as_str()].as_f64()).unwrap_or(0.0)),
        last_updated: Utc::now(),
    })
}

/// Parse an OHLC array-of-arrays body: `[[ms, open, high, low, close], ...]`.
/// The endpoint carries no volume, so one is synthesized per candle.
pub fn parse_ohlc(body: &serde_json::Value) -> Result<Vec<Candle>> {
    let raw = body.as_array().context("ohlc response is not an array")?;
    let mut rng = rand::thread_rng();

    let mut candles = Vec::with_capacity(raw.len());
    for entry in raw {
        let arr = entry.as_array().context("ohlc entry is not an array")?;
        if arr.len() < 5 {
            continue;
        }

        let time_ms = arr[0].as_i64().context("ohlc timestamp is not an integer")?;
        let open = finite(arr[1].as_f64()).context("ohlc open missing")?;
        let high = finite(arr[2].as_f64()).context("ohlc high missing")?;
        let low = finite(arr[3].as_f64()).context("ohlc low missing")?;
        let close = finite(arr[4].as_f64()).context("ohlc close missing")?;

        candles.push(Candle {
            time: time_ms / 1000,
            open,
            high,
            low,
            close,
            volume: rng.gen_range(500_000.0..1_500_000.0),
        });
    }

    Ok(candles)
}

/// Parse a market-chart body (`prices` and `total_volumes` parallel arrays of
/// `[ms, value]`) into candles.
///
/// Close-only synthesis: open is the previous point's close (the first point
/// opens at its own close); high/low are the true max/min of raw closes that
/// fall inside the candle's interval window when the series is dense enough,
/// otherwise a fixed ±0.5% band around the body.  Volume comes from
/// `total_volumes` when present, else it is synthesized.
pub fn parse_market_chart(body: &serde_json::Value, interval_ms: i64) -> Result<Vec<Candle>> {
    let prices = parse_pair_array(&body["prices"]).context("market_chart missing 'prices'")?;
    if prices.is_empty() {
        anyhow::bail!("market_chart 'prices' array is empty");
    }
    // Volumes are optional — absence degrades to synthesis, not failure.
    let volumes = parse_pair_array(&body["total_volumes"]).unwrap_or_default();

    let mut rng = rand::thread_rng();
    let mut candles = Vec::with_capacity(prices.len());

    for (i, &(ts_ms, close)) in prices.iter().enumerate() {
        let open = if i > 0 { prices[i - 1].1 } else { close };

        // True wicks when enough raw points fall inside this candle's window.
        let window_start = ts_ms - interval_ms;
        let in_window: Vec<f64> = prices
            .iter()
            .filter(|(t, _)| *t >= window_start && *t <= ts_ms)
            .map(|(_, p)| *p)
            .collect();

        let (high, low) = if in_window.is_empty() {
            (
                open.max(close) * (1.0 + SPARSE_WICK_PCT),
                open.min(close) * (1.0 - SPARSE_WICK_PCT),
            )
        } else {
            let hi = in_window.iter().cloned().fold(f64::MIN, f64::max);
            let lo = in_window.iter().cloned().fold(f64::MAX, f64::min);
            (hi, lo)
        };

        let volume = volumes
            .get(i)
            .map(|&(_, v)| v)
            .unwrap_or_else(|| rng.gen_range(500_000.0..1_500_000.0));

        candles.push(Candle {
            time: ts_ms / 1000,
            open,
            high,
            low,
            close,
            volume,
        });
    }

    Ok(candles)
}

/// Parse a `[[ms, value], ...]` array, skipping malformed rows.
fn parse_pair_array(val: &serde_json::Value) -> Result<Vec<(i64, f64)>> {
    let raw = val.as_array().context("expected an array of pairs")?;
    let mut out = Vec::with_capacity(raw.len());
    for entry in raw {
        let (Some(ts), Some(v)) = (
            entry.get(0).and_then(|t| t.as_i64()),
            entry.get(1).and_then(|p| p.as_f64()),
        ) else {
            continue;
        };
        if v.is_finite() {
            out.push((ts, v));
        }
    }
    Ok(out)
}

fn finite(v: Option<f64>) -> Option<f64> {
    v.filter(|x| x.is_finite())
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_simple_price_ok() {
        let body = serde_json::json!({
            "bitcoin": {
                "usd": 36500.0,
                "usd_24h_change": 2.1,
                "usd_market_cap": 7.1e11,
                "usd_24h_vol": 1.9e10
            }
        });
        let snap = parse_simple_price(&body, "bitcoin", "usd").expect("should parse");
        assert!((snap.price - 36500.0).abs() < f64::EPSILON);
        assert_eq!(snap.market_cap, Some(7.1e11));
    }

    #[test]
    fn parse_simple_price_missing_root_key_is_error() {
        let body = serde_json::json!({ "ethereum": { "usd": 2000.0 } });
        assert!(parse_simple_price(&body, "bitcoin", "usd").is_err());
    }

    #[test]
    fn parse_simple_price_degrades_secondary_fields() {
        let body = serde_json::json!({ "bitcoin": { "usd": 36500.0 } });
        let snap = parse_simple_price(&body, "bitcoin", "usd").expect("should parse");
        assert!((snap.price_change_24h).abs() < f64::EPSILON);
        assert_eq!(snap.market_cap, Some(0.0));
    }

    #[test]
    fn parse_ohlc_ok_and_synthesizes_volume() {
        let body = serde_json::json!([
            [1700000000000i64, 36000.0, 36500.0, 35800.0, 36200.0],
            [1700086400000i64, 36200.0, 36900.0, 36100.0, 36800.0]
        ]);
        let candles = parse_ohlc(&body).expect("should parse");
        assert_eq!(candles.len(), 2);
        assert_eq!(candles[0].time, 1_700_000_000);
        for c in &candles {
            assert!(c.volume >= 500_000.0 && c.volume < 1_500_000.0);
        }
    }

    #[test]
    fn parse_ohlc_rejects_object_root() {
        let body = serde_json::json!({ "error": "rate limited" });
        assert!(parse_ohlc(&body).is_err());
    }

    #[test]
    fn market_chart_open_chains_from_previous_close() {
        let body = serde_json::json!({
            "prices": [
                [1700000000000i64, 36000.0],
                [1700003600000i64, 36100.0],
                [1700007200000i64, 36050.0]
            ],
            "total_volumes": [
                [1700000000000i64, 1.0e9],
                [1700003600000i64, 1.1e9],
                [1700007200000i64, 0.9e9]
            ]
        });
        let candles = parse_market_chart(&body, 3_600_000).expect("should parse");
        assert_eq!(candles.len(), 3);
        assert!((candles[0].open - 36000.0).abs() < f64::EPSILON);
        assert!((candles[1].open - 36000.0).abs() < f64::EPSILON);
        assert!((candles[2].open - 36100.0).abs() < f64::EPSILON);
        assert!((candles[1].volume - 1.1e9).abs() < f64::EPSILON);
    }

    #[test]
    fn market_chart_dense_window_uses_true_wicks() {
        // Three points inside one hour: the last candle's window covers all.
        let body = serde_json::json!({
            "prices": [
                [1700000000000i64, 36000.0],
                [1700001200000i64, 36500.0],
                [1700002400000i64, 36100.0]
            ],
            "total_volumes": []
        });
        let candles = parse_market_chart(&body, 3_600_000).expect("should parse");
        let last = candles.last().unwrap();
        assert!((last.high - 36500.0).abs() < f64::EPSILON);
        assert!((last.low - 36000.0).abs() < f64::EPSILON);
    }

    #[test]
    fn market_chart_missing_volumes_are_synthesized() {
        let body = serde_json::json!({
            "prices": [[1700000000000i64, 36000.0], [1700003600000i64, 36100.0]]
        });
        let candles = parse_market_chart(&body, 3_600_000).expect("should parse");
        for c in &candles {
            assert!(c.volume >= 500_000.0 && c.volume < 1_500_000.0);
        }
    }

    #[test]
    fn market_chart_empty_prices_is_error() {
        let body = serde_json::json!({ "prices": [] });
        assert!(parse_market_chart(&body, 3_600_000).is_err());
    }

    #[test]
    fn market_chart_skips_malformed_rows() {
        let body = serde_json::json!({
            "prices": [
                [1700000000000i64, 36000.0],
                ["bad", null],
                [1700003600000i64, 36100.0]
            ]
        });
        let candles = parse_market_chart(&body, 3_600_000).expect("should parse");
        assert_eq!(candles.len(), 2);
    }
}
