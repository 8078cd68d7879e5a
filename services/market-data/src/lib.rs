//! Market data cache service
//!
//! Maintains the latest-known order book per subscribed instrument by
//! bridging a one-shot snapshot fetch with the continuous streaming
//! updates delivered by the exchange link. Every accepted update
//! replaces the cached book wholesale and is forwarded to the single
//! registered listener channel.

#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod channel;
pub mod sim;

use std::sync::Arc;

use anyhow::Result;
use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use services_common::{ExchangeLink, Lifecycle, Orderbook};

use crate::channel::{instrument_from_channel, DEFAULT_DEPTH};

/// Order book cache over an exchange link.
///
/// The subscription set and the book map are guarded independently and
/// the two locks are never held at the same time; the update channel is
/// only written with neither lock held.
pub struct MarketDataService {
    link: Arc<dyn ExchangeLink>,
    lifecycle: Mutex<Lifecycle>,
    subscriptions: Mutex<FxHashSet<String>>,
    books: Mutex<FxHashMap<String, Orderbook>>,
    updates: mpsc::UnboundedSender<Orderbook>,
}

impl MarketDataService {
    /// Create a cache that forwards accepted updates into `updates`.
    pub fn new(link: Arc<dyn ExchangeLink>, updates: mpsc::UnboundedSender<Orderbook>) -> Self {
        Self {
            link,
            lifecycle: Mutex::new(Lifecycle::Created),
            subscriptions: Mutex::new(FxHashSet::default()),
            books: Mutex::new(FxHashMap::default()),
            updates,
        }
    }

    /// Open the exchange link and replay subscriptions taken while
    /// stopped. Idempotent: a second `start` on a running service is a
    /// no-op.
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        {
            let mut state = self.lifecycle.lock();
            if state.is_running() {
                return Ok(());
            }
            *state = Lifecycle::Running;
        }

        let (tx, mut rx) = mpsc::unbounded_channel();
        if let Err(e) = self.link.connect(tx).await {
            *self.lifecycle.lock() = Lifecycle::Stopped;
            return Err(e.into());
        }
        info!("market data link connected");

        let this = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(raw) = rx.recv().await {
                this.ingest(&raw);
            }
            debug!("ingestion stream ended");
        });

        // Startup replay: instruments subscribed before start.
        for instrument in self.subscribed_instruments() {
            if let Err(e) = self.link.subscribe_orderbook(&instrument).await {
                warn!(%instrument, error = %e, "startup subscribe failed");
            }
        }
        Ok(())
    }

    /// Unsubscribe everything and close the link. Idempotent.
    pub async fn stop(&self) -> Result<()> {
        {
            let mut state = self.lifecycle.lock();
            if !state.is_running() {
                return Ok(());
            }
            *state = Lifecycle::Stopping;
        }

        for instrument in self.subscribed_instruments() {
            if let Err(e) = self.link.unsubscribe_orderbook(&instrument).await {
                warn!(%instrument, error = %e, "unsubscribe on stop failed");
            }
        }
        if let Err(e) = self.link.close().await {
            warn!(error = %e, "closing exchange link failed");
        }

        *self.lifecycle.lock() = Lifecycle::Stopped;
        info!("market data service stopped");
        Ok(())
    }

    /// Add an instrument to the subscription set.
    ///
    /// While running this first seeds the cache from a snapshot fetch —
    /// so a streaming update can never arrive before any book exists —
    /// then issues the streaming subscribe. A failed seed is logged and
    /// the instrument stays subscribed with no cached book.
    pub async fn subscribe(&self, instrument: &str) {
        let inserted = self.subscriptions.lock().insert(instrument.to_string());
        if !inserted {
            return;
        }
        if !self.lifecycle.lock().is_running() {
            return;
        }

        self.seed_book(instrument).await;
        if let Err(e) = self.link.subscribe_orderbook(instrument).await {
            warn!(%instrument, error = %e, "streaming subscribe failed");
        }
    }

    /// Remove an instrument from the subscription set and evict its book.
    pub async fn unsubscribe(&self, instrument: &str) {
        let removed = self.subscriptions.lock().remove(instrument);
        if !removed || !self.lifecycle.lock().is_running() {
            return;
        }

        if let Err(e) = self.link.unsubscribe_orderbook(instrument).await {
            warn!(%instrument, error = %e, "streaming unsubscribe failed");
        }
        self.books.lock().remove(instrument);
    }

    /// Currently subscribed instruments.
    #[must_use]
    pub fn subscribed_instruments(&self) -> Vec<String> {
        self.subscriptions.lock().iter().cloned().collect()
    }

    /// Latest cached book, or an empty book tagged with the instrument.
    /// Never fails.
    #[must_use]
    pub fn order_book(&self, instrument: &str) -> Orderbook {
        self.books
            .lock()
            .get(instrument)
            .cloned()
            .unwrap_or_else(|| Orderbook::empty(instrument))
    }

    /// Classify and apply one raw streaming frame.
    ///
    /// Only `subscription` notifications on `book.<instrument>.*`
    /// channels are book updates; anything else — and anything
    /// malformed — is dropped with a log line. Nothing propagates back
    /// across the trust boundary.
    pub fn ingest(&self, raw: &str) {
        if !self.lifecycle.lock().is_running() {
            return;
        }

        let value: Value = match serde_json::from_str(raw) {
            Ok(v) => v,
            Err(e) => {
                debug!(error = %e, "dropping undecodable frame");
                return;
            }
        };
        if value.get("method").and_then(Value::as_str) != Some("subscription") {
            return;
        }
        let Some(channel) = value.pointer("/params/channel").and_then(Value::as_str) else {
            debug!("dropping subscription frame without channel");
            return;
        };
        let Some(instrument) = instrument_from_channel(channel) else {
            // Not a book channel; nothing for this cache.
            return;
        };
        let Some(data) = value.pointer("/params/data") else {
            debug!(%channel, "dropping book frame without data");
            return;
        };

        let book = parse_book(instrument, data);
        self.store_and_publish(book);
    }

    /// Snapshot fetch for a fresh subscription.
    async fn seed_book(&self, instrument: &str) {
        match self.link.order_book_snapshot(instrument, DEFAULT_DEPTH).await {
            Ok(payload) => {
                let Some(result) = payload.get("result") else {
                    warn!(%instrument, "snapshot response carried no result");
                    return;
                };
                let book = parse_book(instrument, result);
                self.store_and_publish(book);
                debug!(%instrument, "seeded book from snapshot");
            }
            Err(e) => {
                // No retry here; the streaming feed will fill the gap.
                warn!(%instrument, error = %e, "initial snapshot fetch failed");
            }
        }
    }

    fn store_and_publish(&self, book: Orderbook) {
        {
            let mut books = self.books.lock();
            books.insert(book.instrument.clone(), book.clone());
        }
        // Listener notification happens with no lock held.
        let _ = self.updates.send(book);
    }
}

/// Build a book from a raw `bids`/`asks` payload.
///
/// Level arrays replace the cached state wholesale; individual entries
/// that are not `[price, size]` number pairs are skipped. The timestamp
/// is assigned locally, never taken from the source.
fn parse_book(instrument: &str, data: &Value) -> Orderbook {
    Orderbook {
        instrument: instrument.to_string(),
        bids: parse_levels(data.get("bids")),
        asks: parse_levels(data.get("asks")),
        timestamp: chrono::Utc::now().timestamp_millis(),
    }
}

fn parse_levels(side: Option<&Value>) -> Vec<(f64, f64)> {
    let Some(Value::Array(entries)) = side else {
        return Vec::new();
    };
    entries
        .iter()
        .filter_map(|entry| {
            let level = entry.as_array()?;
            if level.len() < 2 {
                return None;
            }
            Some((level[0].as_f64()?, level[1].as_f64()?))
        })
        .collect()
}
