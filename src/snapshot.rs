// =============================================================================
// Price Snapshot Client — current price with ordered source fallback
// =============================================================================
//
// Source order: exchange 24h ticker (fast, no market cap) -> aggregator
// simple/price (slower, carries market cap) -> documented default snapshot.
// The contract is infallible: callers render a value unconditionally, so
// degradation is logged, never surfaced.
// =============================================================================

use tracing::{instrument, warn};

use crate::config::FeedConfig;
use crate::sources::{self, AggregatorClient, ExchangeClient};
use crate::types::PriceSnapshot;

/// Stateless call-and-return client for one-off price snapshots.
#[derive(Debug, Clone)]
pub struct PriceSnapshotClient {
    exchange: ExchangeClient,
    aggregator: AggregatorClient,
}

impl PriceSnapshotClient {
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

    /// Fetch one current-price snapshot. Never fails.
    ///
    /// Transport failures and malformed payloads are treated identically:
    /// fall through to the next source, ultimately to
    /// [`PriceSnapshot::fallback`].
    #[instrument(skip(self), name = "snapshot::fetch_current_price")]
    pub async fn fetch_current_price(&self) -> PriceSnapshot {
        match self.exchange.fetch_ticker().await {
            Ok(snapshot) => return snapshot,
            Err(e) => {
                warn!(error = %e, "exchange ticker failed — trying aggregator");
            }
        }

        match self.aggregator.fetch_simple_price().await {
            Ok(snapshot) => return snapshot,
            Err(e) => {
                warn!(error = %e, "aggregator price failed — returning default snapshot");
            }
        }

        PriceSnapshot::fallback()
    }
}
