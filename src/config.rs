// =============================================================================
// Feed Configuration — upstream endpoints and retry/poll tuning
// =============================================================================
//
// Every tunable of the acquisition layer lives here: which symbol/coin to
// track, where the upstream APIs live, and how aggressively to reconnect and
// poll.  All fields carry `#[serde(default)]` so that adding new fields never
// breaks loading an older config file.
//
// Persistence uses an atomic tmp + rename pattern to prevent corruption on
// crash.
// =============================================================================

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_symbol() -> String {
    "BTCUSDT".to_string()
}

fn default_coin_id() -> String {
    "bitcoin".to_string()
}

fn default_vs_currency() -> String {
    "usd".to_string()
}

fn default_exchange_base_url() -> String {
    "https://api.binance.com".to_string()
}

fn default_aggregator_base_url() -> String {
    "https://api.coingecko.com/api/v3".to_string()
}

fn default_stream_base_url() -> String {
    "wss://stream.binance.com:9443".to_string()
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_reconnect_backoff_secs() -> u64 {
    3
}

fn default_max_reconnect_attempts() -> u32 {
    5
}

fn default_poll_interval_secs() -> u64 {
    10
}

// =============================================================================
// FeedConfig
// =============================================================================

/// Configuration for the market-data acquisition layer.
///
/// Every field has a serde default so that older JSON files missing new fields
/// will still deserialise correctly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    // --- Instrument ----------------------------------------------------------

    /// Exchange symbol for REST and WebSocket requests.
    #[serde(default = "default_symbol")]
    pub symbol: String,

    /// Aggregator coin identifier (path segment of its REST endpoints).
    #[serde(default = "default_coin_id")]
    pub coin_id: String,

    /// Quote currency for aggregator requests.
    #[serde(default = "default_vs_currency")]
    pub vs_currency: String,

    // --- Endpoints -----------------------------------------------------------

    /// Exchange REST base URL.
    #[serde(default = "default_exchange_base_url")]
    pub exchange_base_url: String,

    /// Aggregator REST base URL.
    #[serde(default = "default_aggregator_base_url")]
    pub aggregator_base_url: String,

    /// Exchange WebSocket base URL.
    #[serde(default = "default_stream_base_url")]
    pub stream_base_url: String,

    // --- Timing --------------------------------------------------------------

    /// Per-request HTTP timeout in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Fixed wait between WebSocket reconnect attempts, in seconds.
    #[serde(default = "default_reconnect_backoff_secs")]
    pub reconnect_backoff_secs: u64,

    /// Consecutive connect failures tolerated before demoting to polling.
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,

    /// Snapshot polling cadence once demoted, in seconds.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            symbol: default_symbol(),
            coin_id: default_coin_id(),
            vs_currency: default_vs_currency(),
            exchange_base_url: default_exchange_base_url(),
            aggregator_base_url: default_aggregator_base_url(),
            stream_base_url: default_stream_base_url(),
            request_timeout_secs: default_request_timeout_secs(),
            reconnect_backoff_secs: default_reconnect_backoff_secs(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
            poll_interval_secs: default_poll_interval_secs(),
        }
    }
}

impl FeedConfig {
    /// Load configuration from a JSON file at `path`.
    ///
    /// If the file does not exist, returns an error so the caller can fall
    /// back to defaults with a warning.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read feed config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse feed config from {}", path.display()))?;

        info!(
            path = %path.display(),
            symbol = %config.symbol,
            coin_id = %config.coin_id,
            "feed config loaded"
        );

        Ok(config)
    }

    /// Persist the current configuration to `path` using an atomic write
    /// (write to `.tmp`, then rename).
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let content =
            serde_json::to_string_pretty(self).context("failed to serialise feed config to JSON")?;

        // Atomic write: write to a temporary sibling file, then rename.
        let tmp_path = path.with_extension("json.tmp");

        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp config to {}", tmp_path.display()))?;

        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to rename tmp config to {}", path.display()))?;

        info!(path = %path.display(), "feed config saved (atomic)");
        Ok(())
    }

    /// Lowercased symbol as used in WebSocket stream names.
    pub fn stream_symbol(&self) -> String {
        self.symbol.to_lowercase()
    }
}
