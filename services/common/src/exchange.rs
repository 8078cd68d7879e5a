//! Exchange link boundary
//!
//! The transport layer (session handshake, request signing, raw
//! send/receive) sits behind this trait and is not part of the core.
//! Implementations deliver every raw streaming frame through the
//! channel handed to [`ExchangeLink::connect`]; request calls return
//! the venue's structured payload, decoded defensively by the caller.

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::errors::ExchangeError;

/// Persistent session with the venue plus its request/response calls.
///
/// One processing context delivers streaming frames in arrival order;
/// there is no cross-instrument ordering guarantee beyond that.
#[async_trait]
pub trait ExchangeLink: Send + Sync {
    /// Open the streaming session. Raw frames are pushed into `events`
    /// until the link is closed or the receiver is dropped.
    async fn connect(
        &self,
        events: mpsc::UnboundedSender<String>,
    ) -> Result<(), ExchangeError>;

    /// Request streaming book updates for an instrument.
    async fn subscribe_orderbook(&self, instrument: &str) -> Result<(), ExchangeError>;

    /// Stop streaming book updates for an instrument.
    async fn unsubscribe_orderbook(&self, instrument: &str) -> Result<(), ExchangeError>;

    /// Tear down the streaming session.
    async fn close(&self) -> Result<(), ExchangeError>;

    /// Place an order; returns the venue's raw response payload.
    async fn place_order(
        &self,
        instrument: &str,
        is_buy: bool,
        price: f64,
        amount: f64,
        order_type: &str,
    ) -> Result<Value, ExchangeError>;

    /// Cancel an order; `Ok(true)` means the venue accepted the cancel.
    async fn cancel_order(&self, order_id: &str) -> Result<bool, ExchangeError>;

    /// Replace price and amount of a resting order.
    async fn modify_order(
        &self,
        order_id: &str,
        new_price: f64,
        new_amount: f64,
    ) -> Result<bool, ExchangeError>;

    /// One-shot book snapshot used to seed the cache on subscribe.
    async fn order_book_snapshot(
        &self,
        instrument: &str,
        depth: u32,
    ) -> Result<Value, ExchangeError>;

    /// Current positions as the venue reports them.
    async fn positions(&self) -> Result<Value, ExchangeError>;
}
