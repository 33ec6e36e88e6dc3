// =============================================================================
// Candle Normalizer — single funnel for every upstream candle shape
// =============================================================================
//
// All three upstream formats (exchange klines, aggregator OHLC, aggregator
// market-chart) pass through here before a series reaches the caller, so
// downstream consumers never special-case source origin.
//
// Guarantees on output:
//   * all five numeric fields are finite (non-finite coerced to 0)
//   * strictly ascending `time`, no duplicate timestamps (first wins)
//   * `high >= max(open, close)` and `low <= min(open, close)` (clamped)
// =============================================================================

use tracing::debug;

use crate::types::Candle;

/// Normalize a raw candle series into the canonical shape.
pub fn normalize(raw: Vec<Candle>) -> Vec<Candle> {
    let input_len = raw.len();

    let mut out: Vec<Candle> = raw.into_iter().map(sanitize).collect();

    // Stable sort keeps the first-seen candle ahead of any duplicate so the
    // dedup pass below is deterministic.
    out.sort_by_key(|c| c.time);
    out.dedup_by_key(|c| c.time);

    if out.len() != input_len {
        debug!(
            input = input_len,
            output = out.len(),
            "normalizer dropped duplicate-timestamp candles"
        );
    }

    out
}

/// Coerce non-finite fields to 0 and clamp high/low to envelope open/close.
fn sanitize(mut c: Candle) -> Candle {
    c.open = finite_or_zero(c.open);
    c.high = finite_or_zero(c.high);
    c.low = finite_or_zero(c.low);
    c.close = finite_or_zero(c.close);
    c.volume = finite_or_zero(c.volume);

    // Some upstreams occasionally report a high below the open or a low above
    // the close; clamp rather than reject.
    let body_high = c.open.max(c.close);
    let body_low = c.open.min(c.close);
    if c.high < body_high {
        c.high = body_high;
    }
    if c.low > body_low {
        c.low = body_low;
    }

    c
}

fn finite_or_zero(v: f64) -> f64 {
    if v.is_finite() { v } else { 0.0 }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn candle(time: i64, open: f64, high: f64, low: f64, close: f64) -> Candle {
        Candle {
            time,
            open,
            high,
            low,
            close,
            volume: 1000.0,
        }
    }

    #[test]
    fn sorts_ascending_by_time() {
        let raw = vec![
            candle(300, 10.0, 11.0, 9.0, 10.5),
            candle(100, 10.0, 11.0, 9.0, 10.5),
            candle(200, 10.0, 11.0, 9.0, 10.5),
        ];
        let out = normalize(raw);
        let times: Vec<i64> = out.iter().map(|c| c.time).collect();
        assert_eq!(times, vec![100, 200, 300]);
    }

    #[test]
    fn drops_duplicate_timestamps_keeping_first() {
        let raw = vec![
            candle(100, 1.0, 2.0, 0.5, 1.5),
            candle(100, 9.0, 10.0, 8.0, 9.5),
            candle(200, 1.0, 2.0, 0.5, 1.5),
        ];
        let out = normalize(raw);
        assert_eq!(out.len(), 2);
        assert!((out[0].open - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn clamps_high_and_low_to_body() {
        let raw = vec![candle(100, 10.0, 9.0, 11.0, 10.5)];
        let out = normalize(raw);
        assert!(out[0].high >= out[0].open.max(out[0].close));
        assert!(out[0].low <= out[0].open.min(out[0].close));
    }

    #[test]
    fn non_finite_fields_become_zero() {
        let raw = vec![Candle {
            time: 100,
            open: f64::NAN,
            high: f64::INFINITY,
            low: f64::NEG_INFINITY,
            close: 5.0,
            volume: f64::NAN,
        }];
        let out = normalize(raw);
        assert!(out[0].open.is_finite());
        assert!(out[0].volume.is_finite());
        assert!((out[0].volume - 0.0).abs() < f64::EPSILON);
        // Clamp still applies after coercion.
        assert!(out[0].high >= out[0].close);
    }

    #[test]
    fn empty_input_is_empty_output() {
        assert!(normalize(Vec::new()).is_empty());
    }
}
