// =============================================================================
// btcfeed — resilient market-data acquisition layer
// =============================================================================
//
// Supplies a consumer (typically a charting dashboard) with a current price
// snapshot and a normalized candle series per timeframe, and keeps a live
// price updated in near-real-time.  Every public operation is infallible:
// upstream failures degrade through an ordered fallback chain (exchange ->
// aggregator -> synthetic/default) and are observable only in logs.
// =============================================================================

pub mod config;
pub mod normalize;
pub mod realtime;
pub mod series;
pub mod snapshot;
pub mod sources;
pub mod synthetic;
pub mod types;

pub use config::FeedConfig;
pub use realtime::{RealtimeSubscription, SubscriptionHandle};
pub use series::HistoricalSeriesClient;
pub use snapshot::PriceSnapshotClient;
pub use types::{Candle, PriceSnapshot, SeriesProvenance, Timeframe};
