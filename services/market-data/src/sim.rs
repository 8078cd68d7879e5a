//! Simulated exchange link
//!
//! Emits Deribit-shaped book frames for subscribed instruments on a
//! fixed interval and answers request calls with canned payloads, so
//! the whole pipeline can run without venue credentials. Prices follow
//! a bounded random walk around each instrument's mid.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rand::Rng;
use rustc_hash::FxHashMap;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use services_common::{ExchangeError, ExchangeLink};

use crate::channel::{book_channel, DEFAULT_DEPTH, DEFAULT_INTERVAL};

const LEVEL_STEP: f64 = 0.5;
const STARTING_MID: f64 = 50_000.0;

struct SimState {
    events: Option<mpsc::UnboundedSender<String>>,
    mids: FxHashMap<String, f64>,
    ticker: Option<JoinHandle<()>>,
}

/// In-process [`ExchangeLink`] producing randomized market data.
pub struct SimExchangeLink {
    tick: Duration,
    state: Arc<Mutex<SimState>>,
}

impl SimExchangeLink {
    /// Link emitting one frame per subscribed instrument every `tick`.
    #[must_use]
    pub fn new(tick: Duration) -> Self {
        Self {
            tick,
            state: Arc::new(Mutex::new(SimState {
                events: None,
                mids: FxHashMap::default(),
                ticker: None,
            })),
        }
    }
}

impl Default for SimExchangeLink {
    fn default() -> Self {
        Self::new(Duration::from_millis(250))
    }
}

#[async_trait]
impl ExchangeLink for SimExchangeLink {
    async fn connect(
        &self,
        events: mpsc::UnboundedSender<String>,
    ) -> Result<(), ExchangeError> {
        let mut state = self.state.lock();
        state.events = Some(events);

        let shared = Arc::clone(&self.state);
        let tick = self.tick;
        state.ticker = Some(tokio::spawn(async move {
            loop {
                tokio::time::sleep(tick).await;
                let (tx, frames) = {
                    let mut state = shared.lock();
                    let Some(tx) = state.events.clone() else { break };
                    let mut rng = rand::thread_rng();
                    let frames: Vec<String> = state
                        .mids
                        .iter_mut()
                        .map(|(instrument, mid)| {
                            *mid *= 1.0 + rng.gen_range(-0.0005..0.0005);
                            book_frame(instrument, *mid, &mut rng)
                        })
                        .collect();
                    (tx, frames)
                };
                for frame in frames {
                    if tx.send(frame).is_err() {
                        debug!("event receiver dropped; stopping sim ticker");
                        return;
                    }
                }
            }
        }));
        info!("sim exchange link connected");
        Ok(())
    }

    async fn subscribe_orderbook(&self, instrument: &str) -> Result<(), ExchangeError> {
        self.state
            .lock()
            .mids
            .entry(instrument.to_string())
            .or_insert(STARTING_MID);
        debug!(%instrument, channel = %book_channel(instrument, DEFAULT_DEPTH, DEFAULT_INTERVAL), "sim subscribe");
        Ok(())
    }

    async fn unsubscribe_orderbook(&self, instrument: &str) -> Result<(), ExchangeError> {
        self.state.lock().mids.remove(instrument);
        Ok(())
    }

    async fn close(&self) -> Result<(), ExchangeError> {
        let mut state = self.state.lock();
        state.events = None;
        if let Some(ticker) = state.ticker.take() {
            ticker.abort();
        }
        info!("sim exchange link closed");
        Ok(())
    }

    async fn place_order(
        &self,
        instrument: &str,
        is_buy: bool,
        price: f64,
        amount: f64,
        order_type: &str,
    ) -> Result<Value, ExchangeError> {
        Ok(json!({
            "result": {
                "order": {
                    "instrument_name": instrument,
                    "direction": if is_buy { "buy" } else { "sell" },
                    "price": price,
                    "amount": amount,
                    "order_type": order_type,
                    "order_state": "open",
                }
            }
        }))
    }

    async fn cancel_order(&self, _order_id: &str) -> Result<bool, ExchangeError> {
        Ok(true)
    }

    async fn modify_order(
        &self,
        _order_id: &str,
        _new_price: f64,
        _new_amount: f64,
    ) -> Result<bool, ExchangeError> {
        Ok(true)
    }

    async fn order_book_snapshot(
        &self,
        instrument: &str,
        depth: u32,
    ) -> Result<Value, ExchangeError> {
        let mid = self
            .state
            .lock()
            .mids
            .get(instrument)
            .copied()
            .unwrap_or(STARTING_MID);
        let mut rng = rand::thread_rng();
        let (bids, asks) = sides(mid, depth as usize, &mut rng);
        Ok(json!({"result": {"instrument_name": instrument, "bids": bids, "asks": asks}}))
    }

    async fn positions(&self) -> Result<Value, ExchangeError> {
        Ok(json!({"result": []}))
    }
}

fn sides(mid: f64, depth: usize, rng: &mut impl Rng) -> (Vec<(f64, f64)>, Vec<(f64, f64)>) {
    let bids = (0..depth)
        .map(|i| (mid - LEVEL_STEP * (i + 1) as f64, rng.gen_range(0.1..10.0)))
        .collect();
    let asks = (0..depth)
        .map(|i| (mid + LEVEL_STEP * (i + 1) as f64, rng.gen_range(0.1..10.0)))
        .collect();
    (bids, asks)
}

fn book_frame(instrument: &str, mid: f64, rng: &mut impl Rng) -> String {
    let (bids, asks) = sides(mid, DEFAULT_DEPTH as usize, rng);
    json!({
        "method": "subscription",
        "params": {
            "channel": book_channel(instrument, DEFAULT_DEPTH, DEFAULT_INTERVAL),
            "data": {"bids": bids, "asks": asks}
        }
    })
    .to_string()
}
