//! Order book snapshot representation

use serde::{Deserialize, Serialize};

/// Latest-known order book for one instrument.
///
/// A book is replaced wholesale on every update; `bids` and `asks` are
/// never merged incrementally. Levels are `(price, size)` pairs kept in
/// the order the source delivered them. `timestamp` is the local
/// ingestion time in Unix milliseconds, not a venue timestamp.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Orderbook {
    /// Instrument this book belongs to
    pub instrument: String,
    /// Bid levels as `(price, size)` pairs
    pub bids: Vec<(f64, f64)>,
    /// Ask levels as `(price, size)` pairs
    pub asks: Vec<(f64, f64)>,
    /// Local ingestion timestamp (Unix millis)
    pub timestamp: i64,
}

impl Orderbook {
    /// Empty book tagged with an instrument, returned for cache misses.
    #[must_use]
    pub fn empty(instrument: &str) -> Self {
        Self {
            instrument: instrument.to_string(),
            ..Self::default()
        }
    }

    /// True when neither side has any levels.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.asks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_book_carries_instrument() {
        let book = Orderbook::empty("BTC-PERPETUAL");
        assert_eq!(book.instrument, "BTC-PERPETUAL");
        assert!(book.is_empty());
        assert_eq!(book.timestamp, 0);
    }

    #[test]
    fn levels_serialize_as_pairs() {
        let book = Orderbook {
            instrument: "ETH-PERPETUAL".to_string(),
            bids: vec![(3000.0, 2.5)],
            asks: vec![(3001.5, 1.0)],
            timestamp: 1_700_000_000_000,
        };
        let json = serde_json::to_value(&book).unwrap();
        assert_eq!(json["bids"][0][0], 3000.0);
        assert_eq!(json["asks"][0][1], 1.0);
    }
}
