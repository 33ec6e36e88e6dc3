// =============================================================================
// btcfeed — Demo Entry Point
// =============================================================================
//
// Exercises the acquisition layer the way the consuming dashboard would:
// fetch one snapshot, fetch a candle series for the requested timeframe, then
// keep a realtime subscription open until Ctrl+C.
// =============================================================================

use std::str::FromStr;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use btcfeed::{FeedConfig, HistoricalSeriesClient, PriceSnapshotClient, RealtimeSubscription, Timeframe};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Environment & config ──────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config_path =
        std::env::var("BTCFEED_CONFIG").unwrap_or_else(|_| "feed_config.json".into());
    let mut config = FeedConfig::load(&config_path).unwrap_or_else(|e| {
        warn!(error = %e, "failed to load config, using defaults");
        FeedConfig::default()
    });

    if let Ok(symbol) = std::env::var("BTCFEED_SYMBOL") {
        config.symbol = symbol.trim().to_uppercase();
    }

    // Timeframe comes from the first CLI argument; anything outside the
    // enumerated set is rejected here, before it reaches the core.
    let timeframe = match std::env::args().nth(1) {
        Some(raw) => Timeframe::from_str(&raw)?,
        None => Timeframe::D1,
    };

    info!(symbol = %config.symbol, timeframe = %timeframe, "btcfeed starting");

    // ── 2. One-off snapshot ──────────────────────────────────────────────
    let snapshots = PriceSnapshotClient::new(&config);
    let snapshot = snapshots.fetch_current_price().await;
    info!(
        price = snapshot.price,
        change_24h = snapshot.price_change_24h,
        volume_24h = snapshot.volume_24h,
        "current price"
    );

    // ── 3. Candle series ─────────────────────────────────────────────────
    let series_client = HistoricalSeriesClient::new(&config);
    let (series, provenance) = series_client.fetch_series_tagged(timeframe).await;
    info!(
        points = series.len(),
        provenance = %provenance,
        first = series.first().map(|c| c.time).unwrap_or_default(),
        last = series.last().map(|c| c.time).unwrap_or_default(),
        "candle series fetched"
    );

    // ── 4. Realtime subscription until Ctrl+C ────────────────────────────
    let feed = RealtimeSubscription::new(&config);
    let handle = feed.subscribe(|update| {
        info!(
            price = update.price,
            change_24h = update.price_change_24h,
            "price update"
        );
    });

    info!("streaming price updates — press Ctrl+C to stop");
    tokio::signal::ctrl_c().await?;

    handle.cancel();
    if let Err(e) = config.save(&config_path) {
        warn!(error = %e, "failed to save feed config on shutdown");
    }
    info!("btcfeed shut down complete");
    Ok(())
}
