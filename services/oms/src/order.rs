//! Order definitions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Order side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// Buy order
    Buy,
    /// Sell order
    Sell,
}

/// Order type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    /// Limit order
    Limit,
    /// Market order
    Market,
}

impl OrderType {
    /// Wire name the venue expects for this type.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Limit => "limit",
            Self::Market => "market",
        }
    }
}

/// Order status
///
/// Orders are created directly in `Open` — placement is optimistic and
/// there is no pending stage. `Filled`, `Cancelled` and `Rejected` are
/// terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Resting on the venue
    Open,
    /// Some but not all of the amount has executed
    PartiallyFilled,
    /// Fully executed
    Filled,
    /// Cancelled on the venue
    Cancelled,
    /// Refused by the venue
    Rejected,
}

impl OrderStatus {
    /// Map the venue's status string onto the local state machine.
    #[must_use]
    pub fn from_exchange(state: &str) -> Option<Self> {
        match state {
            "open" => Some(Self::Open),
            "filled" => Some(Self::Filled),
            "cancelled" => Some(Self::Cancelled),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }

    /// Open orders are `Open` or `PartiallyFilled`.
    #[must_use]
    pub const fn is_open(self) -> bool {
        matches!(self, Self::Open | Self::PartiallyFilled)
    }

    /// Terminal states accept no further transitions.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Filled | Self::Cancelled | Self::Rejected)
    }
}

/// Locally tracked order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    /// Locally assigned order id
    pub id: String,
    /// Instrument the order trades
    pub instrument: String,
    /// Side
    pub side: Side,
    /// Type
    pub order_type: OrderType,
    /// Requested price
    pub price: f64,
    /// Requested amount
    pub amount: f64,
    /// Amount executed so far
    pub filled_amount: f64,
    /// Current status
    pub status: OrderStatus,
    /// Venue-supplied rejection reason, when any
    pub error_message: Option<String>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Sentinel returned for lookups of unknown ids: a `Rejected`
    /// order carrying an explanatory message, never an error.
    #[must_use]
    pub fn not_found(id: &str) -> Self {
        let now = Utc::now();
        Self {
            id: id.to_string(),
            instrument: String::new(),
            side: Side::Buy,
            order_type: OrderType::Limit,
            price: 0.0,
            amount: 0.0,
            filled_amount: 0.0,
            status: OrderStatus::Rejected,
            error_message: Some("Order not found".to_string()),
            created_at: now,
            updated_at: now,
        }
    }
}
