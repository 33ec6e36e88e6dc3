// =============================================================================
// Historical Series Client — candle series with ordered source fallback
// =============================================================================
//
// Tier order per timeframe:
//   1. exchange klines (native OHLCV — no synthesis needed)
//   2. aggregator OHLC for daily/weekly/monthly views, or aggregator
//      market-chart for 1h (no hourly OHLC endpoint exists there)
//   3. synthetic generator (never fails, floor of 30 points)
//
// A tier is accepted only when it yields at least MIN_LIVE_POINTS candles;
// an error, an empty result and a too-short result all mean the same thing:
// try the next tier.  Every accepted series passes through the normalizer
// before it reaches the caller.
// =============================================================================

use tracing::{info, instrument, warn};

use crate::config::FeedConfig;
use crate::normalize;
use crate::sources::{self, AggregatorClient, ExchangeClient};
use crate::synthetic;
use crate::types::{Candle, SeriesProvenance, Timeframe};

/// A live series shorter than this is considered unusable and triggers the
/// next fallback tier.
const MIN_LIVE_POINTS: usize = 5;

/// Stateless call-and-return client for candle series.
#[derive(Debug, Clone)]
pub struct HistoricalSeriesClient {
    exchange: ExchangeClient,
    aggregator: AggregatorClient,
}

impl HistoricalSeriesClient {
    /// Create a client with its own HTTP client built from the config.
    pub fn new(config: &FeedConfig) -> Self {
        Self::with_client(config, sources::http_client(config))
    }

    /// Create a client that re-uses an existing HTTP client.
    pub fn with_client(config: &FeedConfig, client: reqwest::Client) -> Self {
        Self {
            exchange: ExchangeClient::new(config, client.clone()),
            aggregator: AggregatorClient::new(config, client),
        }
    }

    /// Fetch a normalized candle series for `timeframe`. Never fails; the
    /// result is non-empty, sorted ascending by time and at least 10 points.
    pub async fn fetch_series(&self, timeframe: Timeframe) -> Vec<Candle> {
        self.fetch_series_tagged(timeframe).await.0
    }

    /// Like [`fetch_series`](Self::fetch_series) but also reports which tier
    /// produced the data, for callers that surface provenance in telemetry.
    #[instrument(skip(self), name = "series::fetch_series")]
    pub async fn fetch_series_tagged(
        &self,
        timeframe: Timeframe,
    ) -> (Vec<Candle>, SeriesProvenance) {
        let spec = timeframe.spec();

        // Tier 1: exchange klines.
        let klines = self
            .exchange
            .fetch_klines(spec.kline_interval, spec.kline_limit)
            .await;
        if let Some(series) = accept("exchange klines", klines) {
            return self.finish(timeframe, series, SeriesProvenance::Exchange);
        }

        // Tier 2: aggregator. The 1h view has no OHLC endpoint upstream, so
        // it goes through the close-only market-chart path instead.
        let aggregated = if timeframe == Timeframe::H1 {
            self.aggregator.fetch_market_chart(timeframe).await
        } else {
            self.aggregator.fetch_ohlc(timeframe).await
        };
        if let Some(series) = accept("aggregator", aggregated) {
            return self.finish(timeframe, series, SeriesProvenance::Aggregator);
        }

        // Tier 3: synthetic. Guaranteed usable even with zero connectivity.
        let series = synthetic::generate(timeframe, timeframe.lookback_days());
        self.finish(timeframe, series, SeriesProvenance::Synthetic)
    }

    fn finish(
        &self,
        timeframe: Timeframe,
        series: Vec<Candle>,
        provenance: SeriesProvenance,
    ) -> (Vec<Candle>, SeriesProvenance) {
        let series = normalize::normalize(series);
        info!(
            timeframe = %timeframe,
            points = series.len(),
            provenance = %provenance,
            "candle series produced"
        );
        (series, provenance)
    }
}

/// Apply the acceptance predicate to one tier's outcome.
///
/// Errors, empty results and series below [`MIN_LIVE_POINTS`] are all logged
/// and collapsed into `None` so the chain moves on to the next tier.
fn accept(tier: &str, result: anyhow::Result<Vec<Candle>>) -> Option<Vec<Candle>> {
    match result {
        Ok(series) if series.len() >= MIN_LIVE_POINTS => Some(series),
        Ok(series) => {
            warn!(
                tier,
                points = series.len(),
                "series below sanity threshold — trying next tier"
            );
            None
        }
        Err(e) => {
            warn!(tier, error = %e, "series fetch failed — trying next tier");
            None
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FeedConfig;

    fn candles(n: usize) -> Vec<Candle> {
        (0..n)
            .map(|i| Candle {
                time: 1_700_000_000 + i as i64 * 3600,
                open: 100.0,
                high: 101.0,
                low: 99.0,
                close: 100.5,
                volume: 1000.0,
            })
            .collect()
    }

    #[test]
    fn accept_takes_a_well_formed_series() {
        // A failing first tier followed by a 40-point second tier must yield
        // exactly the second tier's data — fallback ordering, not synthesis.
        assert!(accept("first", Err(anyhow::anyhow!("HTTP 500"))).is_none());
        let out = accept("second", Ok(candles(40))).expect("should accept");
        assert_eq!(out.len(), 40);
    }

    #[test]
    fn accept_rejects_short_and_empty_series() {
        assert!(accept("tier", Ok(candles(4))).is_none());
        assert!(accept("tier", Ok(Vec::new())).is_none());
        assert!(accept("tier", Ok(candles(5))).is_some());
    }

    /// Config whose endpoints point at a local port nothing listens on, so
    /// every live tier fails fast with a connection error.
    fn unreachable_config() -> FeedConfig {
        FeedConfig {
            exchange_base_url: "http://127.0.0.1:9".into(),
            aggregator_base_url: "http://127.0.0.1:9".into(),
            request_timeout_secs: 1,
            ..FeedConfig::default()
        }
    }

    #[tokio::test]
    async fn total_failure_falls_back_to_synthetic() {
        let client = HistoricalSeriesClient::new(&unreachable_config());
        let (series, provenance) = client.fetch_series_tagged(Timeframe::W1).await;

        assert_eq!(provenance, SeriesProvenance::Synthetic);
        assert!(series.len() >= 30);
        for pair in series.windows(2) {
            assert!(pair[0].time < pair[1].time);
        }
        for c in &series {
            assert!(c.high >= c.open.max(c.close));
            assert!(c.low <= c.open.min(c.close));
            assert!(c.close.is_finite() && c.close > 0.0);
        }
    }

    #[tokio::test]
    async fn every_timeframe_meets_the_output_contract() {
        let client = HistoricalSeriesClient::new(&unreachable_config());
        for tf in Timeframe::ALL {
            let series = client.fetch_series(tf).await;
            assert!(series.len() >= 10, "{tf}: only {} points", series.len());
            for pair in series.windows(2) {
                assert!(pair[0].time < pair[1].time, "{tf}: duplicate or unsorted time");
            }
        }
    }
}
