// =============================================================================
// Shared types used across the btcfeed acquisition layer
// =============================================================================

use anyhow::bail;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An instantaneous price quote with 24h statistics.
///
/// Produced fresh on every fetch and never mutated afterwards; the caller
/// owns the value outright.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceSnapshot {
    /// Last traded price in USD. Always > 0.
    pub price: f64,
    /// 24-hour price change in percent.
    pub price_change_24h: f64,
    /// 24-hour traded volume in USD.
    pub volume_24h: f64,
    /// Market capitalisation in USD. `None` when the source does not carry it
    /// (the exchange ticker and the push feed do not).
    pub market_cap: Option<f64>,
    /// When this snapshot was produced.
    pub last_updated: DateTime<Utc>,
}

impl PriceSnapshot {
    /// Documented last-resort snapshot returned when every live source fails.
    /// Callers render a value unconditionally, so the contract is infallible.
    pub fn fallback() -> Self {
        Self {
            price: 30_000.0,
            price_change_24h: 0.0,
            volume_24h: 0.0,
            market_cap: Some(0.0),
            last_updated: Utc::now(),
        }
    }
}

/// One OHLCV record for a time bucket.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    /// Bucket start, seconds since the UNIX epoch.
    pub time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Where a produced series came from. Logged so synthetic output is
/// distinguishable in telemetry; the `Candle` schema itself stays source-free.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeriesProvenance {
    /// Native OHLCV from the exchange kline endpoint.
    Exchange,
    /// Aggregator OHLC or market-chart data.
    Aggregator,
    /// Generated locally because every live source failed.
    Synthetic,
}

impl std::fmt::Display for SeriesProvenance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Exchange => write!(f, "exchange"),
            Self::Aggregator => write!(f, "aggregator"),
            Self::Synthetic => write!(f, "synthetic"),
        }
    }
}

// =============================================================================
// Timeframe
// =============================================================================

/// A named chart granularity. Closed set — anything else is rejected at the
/// boundary by [`std::str::FromStr`], never mapped to a guessed default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    H1,
    D1,
    W1,
    M1,
    All,
}

/// Static per-timeframe request parameters. This is a configuration table,
/// not a computed value.
#[derive(Debug, Clone, Copy)]
pub struct TimeframeSpec {
    /// Exchange kline interval name.
    pub kline_interval: &'static str,
    /// Exchange kline point limit.
    pub kline_limit: u32,
    /// Aggregator lookback window in days; `None` means "max".
    pub chart_days: Option<u32>,
    /// Synthetic candle spacing in seconds.
    pub synthetic_interval_secs: i64,
}

impl Timeframe {
    pub const ALL: [Timeframe; 5] = [Self::H1, Self::D1, Self::W1, Self::M1, Self::All];

    pub fn spec(&self) -> TimeframeSpec {
        match self {
            Self::H1 => TimeframeSpec {
                kline_interval: "1h",
                kline_limit: 24,
                chart_days: Some(1),
                synthetic_interval_secs: 5 * 60,
            },
            Self::D1 => TimeframeSpec {
                kline_interval: "1d",
                kline_limit: 30,
                chart_days: Some(30),
                synthetic_interval_secs: 60 * 60,
            },
            Self::W1 => TimeframeSpec {
                kline_interval: "1w",
                kline_limit: 52,
                chart_days: Some(90),
                synthetic_interval_secs: 24 * 60 * 60,
            },
            Self::M1 => TimeframeSpec {
                kline_interval: "1M",
                kline_limit: 12,
                chart_days: Some(180),
                synthetic_interval_secs: 24 * 60 * 60,
            },
            Self::All => TimeframeSpec {
                kline_interval: "1M",
                kline_limit: 60,
                chart_days: None,
                synthetic_interval_secs: 24 * 60 * 60,
            },
        }
    }

    /// Aggregator `days` query parameter ("max" for the unbounded view).
    pub fn chart_days_param(&self) -> String {
        match self.spec().chart_days {
            Some(d) => d.to_string(),
            None => "max".to_string(),
        }
    }

    /// Lookback window in days used to seed the synthetic generator.
    pub fn lookback_days(&self) -> u32 {
        self.spec().chart_days.unwrap_or(30)
    }

    /// Number of synthetic points for a given lookback window, before the
    /// generator applies its 30-point floor.
    pub fn synthetic_points(&self, lookback_days: u32) -> usize {
        match self {
            // One point every 5 minutes across 24 hours.
            Self::H1 => 24 * 12,
            // Hourly points, at most 30 days worth.
            Self::D1 => (lookback_days.saturating_mul(24)).min(30 * 24) as usize,
            // Daily points.
            Self::W1 => lookback_days.min(90) as usize,
            Self::M1 => lookback_days.min(180) as usize,
            Self::All => 30,
        }
    }
}

impl std::fmt::Display for Timeframe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::H1 => write!(f, "1h"),
            Self::D1 => write!(f, "1d"),
            Self::W1 => write!(f, "1w"),
            Self::M1 => write!(f, "1m"),
            Self::All => write!(f, "all"),
        }
    }
}

impl std::str::FromStr for Timeframe {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1h" => Ok(Self::H1),
            "1d" => Ok(Self::D1),
            "1w" => Ok(Self::W1),
            "1m" => Ok(Self::M1),
            "all" => Ok(Self::All),
            other => bail!("unknown timeframe '{other}' (expected 1h, 1d, 1w, 1m or all)"),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn timeframe_round_trips_through_wire_names() {
        for tf in Timeframe::ALL {
            let parsed = Timeframe::from_str(&tf.to_string()).expect("should parse");
            assert_eq!(parsed, tf);
        }
    }

    #[test]
    fn unknown_timeframe_is_rejected() {
        assert!(Timeframe::from_str("15m").is_err());
        assert!(Timeframe::from_str("").is_err());
        assert!(Timeframe::from_str("1H").is_err());
    }

    #[test]
    fn spec_table_matches_upstream_contracts() {
        assert_eq!(Timeframe::H1.spec().kline_interval, "1h");
        assert_eq!(Timeframe::M1.spec().kline_interval, "1M");
        assert_eq!(Timeframe::All.chart_days_param(), "max");
        assert_eq!(Timeframe::D1.chart_days_param(), "30");
        assert_eq!(Timeframe::All.spec().kline_limit, 60);
    }

    #[test]
    fn synthetic_point_counts() {
        assert_eq!(Timeframe::H1.synthetic_points(1), 288);
        assert_eq!(Timeframe::D1.synthetic_points(30), 720);
        // Caps engage when the lookback is doubled past the window.
        assert_eq!(Timeframe::D1.synthetic_points(60), 720);
        assert_eq!(Timeframe::W1.synthetic_points(180), 90);
        assert_eq!(Timeframe::All.synthetic_points(9999), 30);
    }

    #[test]
    fn fallback_snapshot_is_renderable() {
        let snap = PriceSnapshot::fallback();
        assert!(snap.price > 0.0);
        assert_eq!(snap.market_cap, Some(0.0));
    }
}
