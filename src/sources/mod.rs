pub mod binance;
pub mod coingecko;

pub use binance::ExchangeClient;
pub use coingecko::AggregatorClient;

use crate::config::FeedConfig;

/// Build the shared HTTP client used by every REST source.
pub fn http_client(config: &FeedConfig) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(config.request_timeout_secs))
        .build()
        .expect("failed to build reqwest client")
}
