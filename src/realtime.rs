// =============================================================================
// Realtime Subscription — push price updates with polling demotion
// =============================================================================
//
// Each subscription owns its WebSocket connection and timers exclusively; no
// process-wide singletons, so any number of subscriptions can run and be
// cancelled independently.
//
// State machine per subscription:
//
//   Connecting -> Streaming -> (ReconnectPending <-> Connecting) -> Polling
//                                                                      |
//   Cancelled  <---------------- reachable from every state ------------+
//
// The attempt counter resets on a successful connect, so demotion to polling
// requires max_reconnect_attempts *consecutive* failures.  Polling is sticky:
// once demoted, a subscription never returns to streaming.  Cancellation is
// cooperative: it does not interrupt an in-flight fetch, but a response that
// arrives after cancellation is discarded, never delivered.
// =============================================================================

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures_util::StreamExt;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time::Duration;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::FeedConfig;
use crate::snapshot::PriceSnapshotClient;
use crate::sources::binance::parse_stream_ticker;
use crate::types::PriceSnapshot;

/// Opaque cancellation token for one subscription.
///
/// `cancel` is idempotent: the first call tears the subscription down, any
/// later call is a safe no-op.
pub struct SubscriptionHandle {
    id: Uuid,
    cancelled: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl SubscriptionHandle {
    /// Cancel the subscription: close the socket, clear pending timers, and
    /// guarantee no further `on_update` invocations.
    pub fn cancel(&self) {
        if !self.cancelled.swap(true, Ordering::SeqCst) {
            self.notify.notify_one();
            info!(subscription = %self.id, "subscription cancelled");
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Factory for realtime price subscriptions.
#[derive(Debug, Clone)]
pub struct RealtimeSubscription {
    config: FeedConfig,
    snapshots: PriceSnapshotClient,
}

impl RealtimeSubscription {
    pub fn new(config: &FeedConfig) -> Self {
        Self {
            config: config.clone(),
            snapshots: PriceSnapshotClient::new(config),
        }
    }

    /// Open a subscription. `on_update` receives a fresh [`PriceSnapshot`]
    /// per price change until the returned handle is cancelled.
    ///
    /// Deliveries within one subscription are strictly sequential (a single
    /// task drives the whole state machine).
    pub fn subscribe<F>(&self, on_update: F) -> SubscriptionHandle
    where
        F: Fn(PriceSnapshot) + Send + Sync + 'static,
    {
        let cancelled = Arc::new(AtomicBool::new(false));
        let notify = Arc::new(Notify::new());
        let id = Uuid::new_v4();

        let worker = SubscriptionWorker {
            id,
            config: self.config.clone(),
            snapshots: self.snapshots.clone(),
            on_update,
            last_price: Mutex::new(None),
            cancelled: cancelled.clone(),
            notify: notify.clone(),
        };

        info!(subscription = %id, symbol = %self.config.symbol, "subscription opened");
        tokio::spawn(worker.run());

        SubscriptionHandle {
            id,
            cancelled,
            notify,
        }
    }
}

/// True when a newly parsed price should be delivered: the push feed dedups
/// runs of identical prices to avoid redundant downstream churn.
fn should_emit(last_emitted: Option<f64>, price: f64) -> bool {
    match last_emitted {
        Some(last) => price != last,
        None => true,
    }
}

// ---------------------------------------------------------------------------
// Worker task — owns the socket and timers for one subscription
// ---------------------------------------------------------------------------

enum StreamEnd {
    /// Connection closed or errored; caller decides on reconnect/demotion.
    Dropped,
    /// Cancellation observed; tear everything down.
    Cancelled,
}

struct SubscriptionWorker<F> {
    id: Uuid,
    config: FeedConfig,
    snapshots: PriceSnapshotClient,
    on_update: F,
    last_price: Mutex<Option<f64>>,
    cancelled: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl<F> SubscriptionWorker<F>
where
    F: Fn(PriceSnapshot) + Send + Sync + 'static,
{
    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    async fn run(self) {
        let mut attempts: u32 = 0;

        // Streaming phase with capped reconnects.
        while !self.is_cancelled() {
            match self.stream_once().await {
                Some(StreamEnd::Cancelled) => return,
                Some(StreamEnd::Dropped) => {
                    // We did connect: this drop starts a fresh failure run.
                    attempts = 1;
                }
                None => {
                    // Never connected.
                    attempts += 1;
                }
            }

            if attempts >= self.config.max_reconnect_attempts {
                warn!(
                    subscription = %self.id,
                    attempts,
                    "reconnect cap reached — demoting to polling"
                );
                break;
            }

            info!(
                subscription = %self.id,
                attempt = attempts,
                max = self.config.max_reconnect_attempts,
                backoff_secs = self.config.reconnect_backoff_secs,
                "reconnect pending"
            );
            if self
                .cancellable_sleep(Duration::from_secs(self.config.reconnect_backoff_secs))
                .await
            {
                return;
            }
        }

        if self.is_cancelled() {
            return;
        }

        self.poll_forever().await;
    }

    /// One Connecting -> Streaming cycle.
    ///
    /// Returns `None` when the connection could not be established at all,
    /// `Some(Dropped)` after a connected stream closed or errored, and
    /// `Some(Cancelled)` when cancellation was observed.
    async fn stream_once(&self) -> Option<StreamEnd> {
        let url = format!(
            "{}/ws/{}@ticker",
            self.config.stream_base_url,
            self.config.stream_symbol()
        );

        let ws_stream = tokio::select! {
            _ = self.notify.notified() => return Some(StreamEnd::Cancelled),
            res = connect_async(&url) => match res {
                Ok((ws, _response)) => ws,
                Err(e) => {
                    warn!(subscription = %self.id, error = %e, "ticker WebSocket connect failed");
                    return None;
                }
            },
        };

        info!(subscription = %self.id, url = %url, "ticker WebSocket connected");
        let (_write, mut read) = ws_stream.split();

        loop {
            tokio::select! {
                // Dropping the read half on return closes the socket.
                _ = self.notify.notified() => return Some(StreamEnd::Cancelled),
                msg = read.next() => match msg {
                    Some(Ok(Message::Text(text))) => match parse_stream_ticker(&text) {
                        Ok(snapshot) => self.emit_streamed(snapshot),
                        Err(e) => {
                            // Malformed tick: log and ignore, no state change.
                            warn!(subscription = %self.id, error = %e, "failed to parse ticker message");
                        }
                    },
                    // Ping/Pong/Binary frames — tungstenite answers pings itself.
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        error!(subscription = %self.id, error = %e, "ticker WebSocket read error");
                        return Some(StreamEnd::Dropped);
                    }
                    None => {
                        warn!(subscription = %self.id, "ticker WebSocket stream ended");
                        return Some(StreamEnd::Dropped);
                    }
                },
            }
        }
    }

    /// Sticky polling phase: one immediate snapshot, then a fixed cadence.
    async fn poll_forever(&self) {
        info!(
            subscription = %self.id,
            interval_secs = self.config.poll_interval_secs,
            "polling for price updates"
        );

        loop {
            if self.is_cancelled() {
                return;
            }

            // Deliberately not cancellable mid-flight: a fetch finishes on
            // its own, and the result is dropped below if cancel raced it.
            let snapshot = self.snapshots.fetch_current_price().await;
            self.deliver(snapshot);

            if self
                .cancellable_sleep(Duration::from_secs(self.config.poll_interval_secs))
                .await
            {
                return;
            }
        }
    }

    /// Deliver a streamed tick, deduplicating runs of identical prices.
    fn emit_streamed(&self, snapshot: PriceSnapshot) {
        let mut last = self.last_price.lock();
        if !should_emit(*last, snapshot.price) {
            return;
        }
        *last = Some(snapshot.price);
        drop(last);
        self.deliver(snapshot);
    }

    /// Invoke the callback unless the subscription was cancelled in the
    /// meantime — a late result must be discarded, not delivered.
    fn deliver(&self, snapshot: PriceSnapshot) {
        if self.is_cancelled() {
            return;
        }
        (self.on_update)(snapshot);
    }

    /// Sleep that wakes early on cancellation. Returns true when cancelled.
    async fn cancellable_sleep(&self, duration: Duration) -> bool {
        tokio::select! {
            _ = self.notify.notified() => true,
            _ = tokio::time::sleep(duration) => self.is_cancelled(),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
