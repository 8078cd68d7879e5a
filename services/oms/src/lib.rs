//! Order registry service
//!
//! Local authoritative view of orders and positions. Placement is
//! optimistic: the registry records an order as `Open` as soon as the
//! synchronous placement call returns, then applies asynchronous
//! confirmations as they arrive. Positions are a whole-table snapshot
//! replaced on every position event.

#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod error;
pub mod order;

use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

use services_common::ExchangeLink;

pub use error::{OmsError, OmsResult};
pub use order::{Order, OrderStatus, OrderType, Side};

/// Order and position registry over an exchange link.
///
/// The orders table and the positions table are guarded independently;
/// queries hand out copies so no caller can observe a half-applied
/// mutation.
pub struct OrderManager {
    link: Arc<dyn ExchangeLink>,
    orders: RwLock<FxHashMap<String, Order>>,
    positions: RwLock<FxHashMap<String, f64>>,
}

impl OrderManager {
    /// Registry issuing its venue calls through `link`.
    pub fn new(link: Arc<dyn ExchangeLink>) -> Self {
        Self {
            link,
            orders: RwLock::new(FxHashMap::default()),
            positions: RwLock::new(FxHashMap::default()),
        }
    }

    /// Place an order and record it locally in `Open`.
    ///
    /// Returns the locally assigned id as soon as the synchronous call
    /// returns; asynchronous confirmations adjust the record later.
    pub async fn place_order(
        &self,
        instrument: &str,
        side: Side,
        price: f64,
        amount: f64,
        order_type: OrderType,
    ) -> OmsResult<String> {
        self.link
            .place_order(
                instrument,
                side == Side::Buy,
                price,
                amount,
                order_type.as_str(),
            )
            .await?;

        let id = format!("order-{}", Uuid::new_v4());
        let now = Utc::now();
        let order = Order {
            id: id.clone(),
            instrument: instrument.to_string(),
            side,
            order_type,
            price,
            amount,
            filled_amount: 0.0,
            status: OrderStatus::Open,
            error_message: None,
            created_at: now,
            updated_at: now,
        };
        self.orders.write().insert(id.clone(), order);

        info!(%id, %instrument, ?side, price, amount, "order placed");
        Ok(id)
    }

    /// Cancel an order on the venue.
    ///
    /// On venue success the local record becomes `Cancelled`
    /// unconditionally — there is deliberately no guard against a
    /// concurrently filled order; the venue's answer wins.
    pub async fn cancel_order(&self, id: &str) -> OmsResult<bool> {
        let accepted = self.link.cancel_order(id).await?;
        if accepted {
            let mut orders = self.orders.write();
            if let Some(order) = orders.get_mut(id) {
                order.status = OrderStatus::Cancelled;
                order.updated_at = Utc::now();
            }
            info!(%id, "order cancelled");
        }
        Ok(accepted)
    }

    /// Replace price and amount of an order in place.
    ///
    /// Filled amount and status are left untouched.
    pub async fn modify_order(&self, id: &str, new_price: f64, new_amount: f64) -> OmsResult<bool> {
        let accepted = self.link.modify_order(id, new_price, new_amount).await?;
        if accepted {
            let mut orders = self.orders.write();
            if let Some(order) = orders.get_mut(id) {
                order.price = new_price;
                order.amount = new_amount;
                order.updated_at = Utc::now();
            }
            info!(%id, new_price, new_amount, "order modified");
        }
        Ok(accepted)
    }

    /// Apply one asynchronous order update event.
    ///
    /// Requires an `order_id`; updates for ids this registry never
    /// issued are silently ignored. An absent or unrecognized `state`
    /// with `0 < filled < amount` infers a partial fill. Malformed
    /// payloads drop with a log line and affect nothing else.
    pub fn on_order_update(&self, raw: &str) {
        let data: Value = match serde_json::from_str(raw) {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "dropping undecodable order update");
                return;
            }
        };
        let Some(id) = data.get("order_id").and_then(Value::as_str) else {
            warn!("dropping order update without order_id");
            return;
        };

        let mut orders = self.orders.write();
        let Some(order) = orders.get_mut(id) else {
            debug!(%id, "order update for unknown id ignored");
            return;
        };

        if let Some(filled) = data.get("filled_amount").and_then(Value::as_f64) {
            order.filled_amount = filled;
        }
        match data
            .get("state")
            .and_then(Value::as_str)
            .and_then(OrderStatus::from_exchange)
        {
            Some(status) => {
                order.status = status;
                if status == OrderStatus::Rejected {
                    if let Some(reason) = data.get("error").and_then(Value::as_str) {
                        order.error_message = Some(reason.to_string());
                    }
                }
            }
            None => {
                if order.filled_amount > 0.0 && order.filled_amount < order.amount {
                    order.status = OrderStatus::PartiallyFilled;
                }
            }
        }
        order.updated_at = Utc::now();
    }

    /// Apply one position snapshot event.
    ///
    /// The payload is a full snapshot: the table is cleared and
    /// repopulated, never merged per instrument. Non-array payloads
    /// drop with a log line; entries missing fields are skipped.
    pub fn on_position_update(&self, raw: &str) {
        let data: Value = match serde_json::from_str(raw) {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "dropping undecodable position update");
                return;
            }
        };
        let Some(entries) = data.as_array() else {
            warn!("dropping non-array position update");
            return;
        };

        let mut positions = self.positions.write();
        positions.clear();
        for entry in entries {
            let Some(instrument) = entry.get("instrument_name").and_then(Value::as_str) else {
                debug!("skipping position entry without instrument_name");
                continue;
            };
            let Some(size) = entry.get("size").and_then(Value::as_f64) else {
                debug!(%instrument, "skipping position entry without size");
                continue;
            };
            positions.insert(instrument.to_string(), size);
        }
    }

    /// All orders ever recorded, newest creation first.
    #[must_use]
    pub fn orders(&self) -> Vec<Order> {
        let mut all: Vec<Order> = self.orders.read().values().cloned().collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        all
    }

    /// Orders still working (`Open` or `PartiallyFilled`), newest first.
    #[must_use]
    pub fn open_orders(&self) -> Vec<Order> {
        let mut open: Vec<Order> = self
            .orders
            .read()
            .values()
            .filter(|o| o.status.is_open())
            .cloned()
            .collect();
        open.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        open
    }

    /// Point lookup. Unknown ids answer a `Rejected` sentinel instead
    /// of an error.
    #[must_use]
    pub fn order(&self, id: &str) -> Order {
        self.orders
            .read()
            .get(id)
            .cloned()
            .unwrap_or_else(|| Order::not_found(id))
    }

    /// Copy of the current position table.
    #[must_use]
    pub fn positions(&self) -> FxHashMap<String, f64> {
        self.positions.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::json;
    use services_common::ExchangeError;
    use tokio::sync::mpsc;

    #[derive(Default)]
    struct StubLink {
        calls: Mutex<Vec<String>>,
        refuse_cancels: Mutex<bool>,
        fail_requests: Mutex<bool>,
    }

    #[async_trait]
    impl ExchangeLink for StubLink {
        async fn connect(
            &self,
            _events: mpsc::UnboundedSender<String>,
        ) -> Result<(), ExchangeError> {
            Ok(())
        }

        async fn subscribe_orderbook(&self, _instrument: &str) -> Result<(), ExchangeError> {
            Ok(())
        }

        async fn unsubscribe_orderbook(&self, _instrument: &str) -> Result<(), ExchangeError> {
            Ok(())
        }

        async fn close(&self) -> Result<(), ExchangeError> {
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
            if *self.fail_requests.lock() {
                return Err(ExchangeError::Request("placement refused".to_string()));
            }
            self.calls
                .lock()
                .push(format!("place {instrument} {is_buy} {price} {amount} {order_type}"));
            Ok(json!({"result": {"order": {"order_state": "open"}}}))
        }

        async fn cancel_order(&self, order_id: &str) -> Result<bool, ExchangeError> {
            self.calls.lock().push(format!("cancel {order_id}"));
            Ok(!*self.refuse_cancels.lock())
        }

        async fn modify_order(
            &self,
            order_id: &str,
            new_price: f64,
            new_amount: f64,
        ) -> Result<bool, ExchangeError> {
            self.calls
                .lock()
                .push(format!("modify {order_id} {new_price} {new_amount}"));
            Ok(true)
        }

        async fn order_book_snapshot(
            &self,
            _instrument: &str,
            _depth: u32,
        ) -> Result<Value, ExchangeError> {
            Ok(json!({"result": {"bids": [], "asks": []}}))
        }

        async fn positions(&self) -> Result<Value, ExchangeError> {
            Ok(json!({"result": []}))
        }
    }

    fn manager() -> (OrderManager, Arc<StubLink>) {
        let link = Arc::new(StubLink::default());
        (OrderManager::new(Arc::clone(&link) as Arc<dyn ExchangeLink>), link)
    }

    #[tokio::test]
    async fn placed_order_is_immediately_retrievable_and_open() {
        let (oms, _link) = manager();
        let id = oms
            .place_order("BTC-PERPETUAL", Side::Buy, 50_000.0, 0.1, OrderType::Limit)
            .await
            .unwrap();

        let order = oms.order(&id);
        assert_eq!(order.id, id);
        assert_eq!(order.instrument, "BTC-PERPETUAL");
        assert_eq!(order.side, Side::Buy);
        assert_eq!(order.order_type, OrderType::Limit);
        assert_eq!(order.price, 50_000.0);
        assert_eq!(order.amount, 0.1);
        assert_eq!(order.filled_amount, 0.0);
        assert_eq!(order.status, OrderStatus::Open);
    }

    #[tokio::test]
    async fn failed_placement_records_nothing() {
        let (oms, link) = manager();
        *link.fail_requests.lock() = true;

        let result = oms
            .place_order("BTC-PERPETUAL", Side::Sell, 50_000.0, 0.1, OrderType::Market)
            .await;

        assert!(result.is_err());
        assert!(oms.orders().is_empty());
    }

    #[tokio::test]
    async fn cancel_sets_cancelled_and_advances_update_timestamp() {
        let (oms, _link) = manager();
        let id = oms
            .place_order("BTC-PERPETUAL", Side::Buy, 50_000.0, 0.1, OrderType::Limit)
            .await
            .unwrap();

        assert!(oms.cancel_order(&id).await.unwrap());

        let order = oms.order(&id);
        assert_eq!(order.status, OrderStatus::Cancelled);
        assert!(order.updated_at >= order.created_at);
    }

    #[tokio::test]
    async fn refused_cancel_leaves_order_untouched() {
        let (oms, link) = manager();
        let id = oms
            .place_order("BTC-PERPETUAL", Side::Buy, 50_000.0, 0.1, OrderType::Limit)
            .await
            .unwrap();
        *link.refuse_cancels.lock() = true;

        assert!(!oms.cancel_order(&id).await.unwrap());
        assert_eq!(oms.order(&id).status, OrderStatus::Open);
    }

    #[tokio::test]
    async fn modify_overwrites_price_and_amount_only() {
        let (oms, _link) = manager();
        let id = oms
            .place_order("BTC-PERPETUAL", Side::Buy, 50_000.0, 0.1, OrderType::Limit)
            .await
            .unwrap();
        oms.on_order_update(
            &json!({"order_id": id, "filled_amount": 0.05}).to_string(),
        );

        assert!(oms.modify_order(&id, 49_500.0, 0.2).await.unwrap());

        let order = oms.order(&id);
        assert_eq!(order.price, 49_500.0);
        assert_eq!(order.amount, 0.2);
        assert_eq!(order.filled_amount, 0.05);
        assert_eq!(order.status, OrderStatus::PartiallyFilled);
    }

    #[tokio::test]
    async fn order_update_maps_terminal_states() {
        let (oms, _link) = manager();
        let id = oms
            .place_order("BTC-PERPETUAL", Side::Buy, 50_000.0, 0.1, OrderType::Limit)
            .await
            .unwrap();

        oms.on_order_update(
            &json!({"order_id": id, "state": "filled", "filled_amount": 0.1}).to_string(),
        );

        let order = oms.order(&id);
        assert_eq!(order.status, OrderStatus::Filled);
        assert_eq!(order.filled_amount, 0.1);
    }

    #[tokio::test]
    async fn rejected_update_carries_error_message() {
        let (oms, _link) = manager();
        let id = oms
            .place_order("BTC-PERPETUAL", Side::Buy, 50_000.0, 0.1, OrderType::Limit)
            .await
            .unwrap();

        oms.on_order_update(
            &json!({"order_id": id, "state": "rejected", "error": "price out of bounds"})
                .to_string(),
        );

        let order = oms.order(&id);
        assert_eq!(order.status, OrderStatus::Rejected);
        assert_eq!(order.error_message.as_deref(), Some("price out of bounds"));
    }

    #[tokio::test]
    async fn update_for_unknown_id_is_ignored() {
        let (oms, _link) = manager();
        oms.on_order_update(
            &json!({"order_id": "order-nobody", "state": "filled", "filled_amount": 1.0})
                .to_string(),
        );
        assert!(oms.orders().is_empty());
    }

    #[tokio::test]
    async fn malformed_order_updates_are_dropped() {
        let (oms, _link) = manager();
        let id = oms
            .place_order("BTC-PERPETUAL", Side::Buy, 50_000.0, 0.1, OrderType::Limit)
            .await
            .unwrap();

        oms.on_order_update("not json");
        oms.on_order_update(r#"{"state": "filled"}"#); // no order_id

        assert_eq!(oms.order(&id).status, OrderStatus::Open);
    }

    #[tokio::test]
    async fn position_update_replaces_whole_table() {
        let (oms, _link) = manager();

        oms.on_position_update(
            &json!([
                {"instrument_name": "BTC-PERPETUAL", "size": 10.0},
                {"instrument_name": "ETH-PERPETUAL", "size": -4.5}
            ])
            .to_string(),
        );
        let positions = oms.positions();
        assert_eq!(positions.len(), 2);
        assert_eq!(positions["ETH-PERPETUAL"], -4.5);

        // The next snapshot replaces, never unions.
        oms.on_position_update(
            &json!([{"instrument_name": "SOL-PERPETUAL", "size": 1.0}]).to_string(),
        );
        let positions = oms.positions();
        assert_eq!(positions.len(), 1);
        assert_eq!(positions["SOL-PERPETUAL"], 1.0);

        // Malformed payloads leave the table alone.
        oms.on_position_update(r#"{"instrument_name": "X", "size": 2.0}"#);
        assert_eq!(oms.positions().len(), 1);
    }

    #[tokio::test]
    async fn queries_sort_newest_first_and_filter_open() {
        let (oms, _link) = manager();
        let first = oms
            .place_order("BTC-PERPETUAL", Side::Buy, 50_000.0, 0.1, OrderType::Limit)
            .await
            .unwrap();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let second = oms
            .place_order("ETH-PERPETUAL", Side::Sell, 3_000.0, 1.0, OrderType::Limit)
            .await
            .unwrap();

        let all = oms.orders();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, second);
        assert_eq!(all[1].id, first);

        oms.on_order_update(
            &json!({"order_id": second, "state": "filled", "filled_amount": 1.0}).to_string(),
        );
        let open = oms.open_orders();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].id, first);
    }

    #[tokio::test]
    async fn unknown_id_lookup_answers_sentinel() {
        let (oms, _link) = manager();
        let order = oms.order("order-missing");
        assert_eq!(order.status, OrderStatus::Rejected);
        assert_eq!(order.error_message.as_deref(), Some("Order not found"));
    }
}
