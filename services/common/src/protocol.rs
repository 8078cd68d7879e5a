//! Downstream client protocol
//!
//! One structured JSON message per WebSocket frame, in both
//! directions. Field names here are contractual; tests pin the exact
//! wire shape.

use serde::{Deserialize, Serialize};

use crate::orderbook::Orderbook;

/// Commands a downstream client may send.
///
/// Extra fields on a known command are tolerated and ignored; only an
/// unknown `type` (or a missing `instrument`) is an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientCommand {
    /// Start receiving book updates for an instrument
    Subscribe {
        /// Instrument to follow
        instrument: String,
    },
    /// Stop receiving book updates for an instrument
    Unsubscribe {
        /// Instrument to drop
        instrument: String,
    },
}

/// Acknowledged subscription direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionStatus {
    /// The pair was added
    Subscribed,
    /// The pair was removed
    Unsubscribed,
}

/// Frames the server sends to downstream clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerMessage {
    /// Sent once, immediately after the connection is registered
    Welcome {
        /// Greeting text
        message: String,
    },
    /// Ack for a subscribe/unsubscribe command, sent to the requester only
    Subscription {
        /// Instrument the ack refers to
        instrument: String,
        /// Which way the membership changed
        status: SubscriptionStatus,
    },
    /// Book update fanned out to current subscribers
    Orderbook {
        /// Instrument of the book
        instrument: String,
        /// Local ingestion timestamp (Unix millis)
        timestamp: i64,
        /// Bid levels as `[price, size]` pairs
        bids: Vec<(f64, f64)>,
        /// Ask levels as `[price, size]` pairs
        asks: Vec<(f64, f64)>,
    },
    /// In-band answer to a malformed command, sent to the sender only
    Error {
        /// Human-readable reason
        message: String,
    },
}

impl ServerMessage {
    /// Book update frame for a cached book.
    #[must_use]
    pub fn orderbook(book: &Orderbook) -> Self {
        Self::Orderbook {
            instrument: book.instrument.clone(),
            timestamp: book.timestamp,
            bids: book.bids.clone(),
            asks: book.asks.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscribe_command_wire_shape() {
        let cmd: ClientCommand =
            serde_json::from_str(r#"{"type":"subscribe","instrument":"BTC-PERPETUAL"}"#).unwrap();
        assert_eq!(
            cmd,
            ClientCommand::Subscribe {
                instrument: "BTC-PERPETUAL".to_string()
            }
        );
    }

    #[test]
    fn unknown_command_shape_is_rejected() {
        assert!(serde_json::from_str::<ClientCommand>(r#"{"type":"ping"}"#).is_err());
        assert!(serde_json::from_str::<ClientCommand>(r#"{"instrument":"X"}"#).is_err());
    }

    #[test]
    fn extra_fields_on_known_commands_are_ignored() {
        let cmd: ClientCommand = serde_json::from_str(
            r#"{"type":"subscribe","instrument":"BTC-PERPETUAL","depth":5}"#,
        )
        .unwrap();
        assert_eq!(
            cmd,
            ClientCommand::Subscribe {
                instrument: "BTC-PERPETUAL".to_string()
            }
        );
    }

    #[test]
    fn subscription_ack_wire_shape() {
        let msg = ServerMessage::Subscription {
            instrument: "ETH-PERPETUAL".to_string(),
            status: SubscriptionStatus::Subscribed,
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "subscription");
        assert_eq!(json["instrument"], "ETH-PERPETUAL");
        assert_eq!(json["status"], "subscribed");
    }

    #[test]
    fn orderbook_frame_wire_shape() {
        let book = Orderbook {
            instrument: "BTC-PERPETUAL".to_string(),
            bids: vec![(50_000.0, 0.1)],
            asks: vec![(50_001.0, 0.2)],
            timestamp: 42,
        };
        let json = serde_json::to_value(ServerMessage::orderbook(&book)).unwrap();
        assert_eq!(json["type"], "orderbook");
        assert_eq!(json["timestamp"], 42);
        assert_eq!(json["bids"][0][0], 50_000.0);
        assert_eq!(json["asks"][0][1], 0.2);
    }
}
