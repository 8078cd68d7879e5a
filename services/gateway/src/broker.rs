//! Subscription broker
//!
//! Owns the connection table and the mirrored subscription indexes. The
//! two indexes live behind a single mutex so they can never disagree;
//! the connection table has its own lock. No lock is ever held while a
//! frame is handed to a connection.

use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, info, warn};

use services_common::{ClientCommand, Orderbook, ServerMessage, SubscriptionStatus};

use crate::connection::ClientConnection;

const WELCOME: &str = "Welcome to the order book gateway";
const UNKNOWN_COMMAND: &str = "Unknown command";

/// Both directions of the subscription relation, mutated together.
#[derive(Default)]
struct SubscriptionIndex {
    by_connection: FxHashMap<String, FxHashSet<String>>,
    by_instrument: FxHashMap<String, FxHashSet<String>>,
}

/// Fan-out hub between the book cache and downstream clients.
#[derive(Default)]
pub struct Broker {
    connections: Mutex<FxHashMap<String, Arc<dyn ClientConnection>>>,
    subscriptions: Mutex<SubscriptionIndex>,
}

impl Broker {
    /// Broker with no connections and no subscriptions.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit a connection and greet it.
    pub fn register(&self, connection: Arc<dyn ClientConnection>) {
        let id = connection.id().to_string();
        self.connections.lock().insert(id.clone(), Arc::clone(&connection));
        info!(connection = %id, "client registered");

        send_frame(
            connection.as_ref(),
            &ServerMessage::Welcome {
                message: WELCOME.to_string(),
            },
        );
    }

    /// Drop a connection and every subscription it held.
    pub fn unregister(&self, connection_id: &str) {
        self.remove_all_subscriptions(connection_id);
        if self.connections.lock().remove(connection_id).is_some() {
            info!(connection = %connection_id, "client unregistered");
        }
    }

    /// Apply one raw client frame.
    ///
    /// Anything that does not decode to a known command answers an
    /// in-band error to the sender only; other clients never notice.
    pub fn handle_command(&self, connection_id: &str, raw: &str) {
        match serde_json::from_str::<ClientCommand>(raw) {
            Ok(ClientCommand::Subscribe { instrument }) => {
                self.add_subscription(connection_id, &instrument);
            }
            Ok(ClientCommand::Unsubscribe { instrument }) => {
                self.remove_subscription(connection_id, &instrument);
            }
            Err(e) => {
                debug!(connection = %connection_id, error = %e, "unparseable command");
                self.send_to(
                    connection_id,
                    &ServerMessage::Error {
                        message: UNKNOWN_COMMAND.to_string(),
                    },
                );
            }
        }
    }

    /// Record a subscription in both indexes and ack the requester.
    pub fn add_subscription(&self, connection_id: &str, instrument: &str) {
        {
            let mut index = self.subscriptions.lock();
            index
                .by_connection
                .entry(connection_id.to_string())
                .or_default()
                .insert(instrument.to_string());
            index
                .by_instrument
                .entry(instrument.to_string())
                .or_default()
                .insert(connection_id.to_string());
        }
        debug!(connection = %connection_id, %instrument, "subscribed");

        self.send_to(
            connection_id,
            &ServerMessage::Subscription {
                instrument: instrument.to_string(),
                status: SubscriptionStatus::Subscribed,
            },
        );
    }

    /// Remove a subscription from both indexes and ack the requester.
    ///
    /// Emptied sets are pruned so neither index accumulates dead keys.
    pub fn remove_subscription(&self, connection_id: &str, instrument: &str) {
        {
            let mut index = self.subscriptions.lock();
            if let Some(instruments) = index.by_connection.get_mut(connection_id) {
                instruments.remove(instrument);
                if instruments.is_empty() {
                    index.by_connection.remove(connection_id);
                }
            }
            if let Some(subscribers) = index.by_instrument.get_mut(instrument) {
                subscribers.remove(connection_id);
                if subscribers.is_empty() {
                    index.by_instrument.remove(instrument);
                }
            }
        }
        debug!(connection = %connection_id, %instrument, "unsubscribed");

        self.send_to(
            connection_id,
            &ServerMessage::Subscription {
                instrument: instrument.to_string(),
                status: SubscriptionStatus::Unsubscribed,
            },
        );
    }

    /// Drop every subscription a connection holds, in one critical
    /// section over both indexes.
    pub fn remove_all_subscriptions(&self, connection_id: &str) {
        let mut index = self.subscriptions.lock();
        let Some(instruments) = index.by_connection.remove(connection_id) else {
            return;
        };
        for instrument in instruments {
            if let Some(subscribers) = index.by_instrument.get_mut(&instrument) {
                subscribers.remove(connection_id);
                if subscribers.is_empty() {
                    index.by_instrument.remove(&instrument);
                }
            }
        }
    }

    /// Deliver a message to every current subscriber of an instrument.
    ///
    /// Subscriber ids are snapshotted under the subscription lock and
    /// resolved under the connection lock; both are released before any
    /// frame is sent. A connection that vanishes in between is skipped.
    pub fn broadcast_to_subscribers(&self, instrument: &str, message: &ServerMessage) {
        let subscriber_ids: Vec<String> = {
            let index = self.subscriptions.lock();
            match index.by_instrument.get(instrument) {
                Some(subscribers) => subscribers.iter().cloned().collect(),
                None => return,
            }
        };
        let targets = self.resolve(&subscriber_ids);

        let text = match serde_json::to_string(message) {
            Ok(t) => t,
            Err(e) => {
                warn!(error = %e, "dropping unencodable broadcast");
                return;
            }
        };
        for connection in targets {
            if !connection.send(text.clone()) {
                debug!(connection = %connection.id(), "skipping dead subscriber");
            }
        }
    }

    /// Deliver a message to every registered connection.
    pub fn broadcast_to_all(&self, message: &ServerMessage) {
        let targets: Vec<Arc<dyn ClientConnection>> =
            self.connections.lock().values().cloned().collect();

        let text = match serde_json::to_string(message) {
            Ok(t) => t,
            Err(e) => {
                warn!(error = %e, "dropping unencodable broadcast");
                return;
            }
        };
        for connection in targets {
            let _ = connection.send(text.clone());
        }
    }

    /// Fan one book update out to its instrument's subscribers.
    pub fn broadcast_orderbook(&self, book: &Orderbook) {
        self.broadcast_to_subscribers(&book.instrument, &ServerMessage::orderbook(book));
    }

    /// Close every connection handle. Used during server shutdown.
    pub fn close_all(&self) {
        let targets: Vec<Arc<dyn ClientConnection>> =
            self.connections.lock().values().cloned().collect();
        for connection in targets {
            connection.close();
        }
    }

    fn send_to(&self, connection_id: &str, message: &ServerMessage) {
        let Some(connection) = self.connections.lock().get(connection_id).cloned() else {
            return;
        };
        send_frame(connection.as_ref(), message);
    }

    fn resolve(&self, ids: &[String]) -> Vec<Arc<dyn ClientConnection>> {
        let connections = self.connections.lock();
        ids.iter()
            .filter_map(|id| connections.get(id).cloned())
            .collect()
    }
}

fn send_frame(connection: &dyn ClientConnection, message: &ServerMessage) {
    match serde_json::to_string(message) {
        Ok(text) => {
            connection.send(text);
        }
        Err(e) => warn!(error = %e, "dropping unencodable frame"),
    }
}
