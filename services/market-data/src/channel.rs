//! Streaming channel name grammar
//!
//! Book channels are addressed as `book.<instrument>.none.<depth>.<interval>`.
//! The instrument is the token between the first two separators; everything
//! after it is delivery tuning we do not interpret on the way in.

/// Channel prefix for order book streams.
pub const BOOK_PREFIX: &str = "book";

/// Default snapshot depth requested when seeding a subscription.
pub const DEFAULT_DEPTH: u32 = 10;

/// Default streaming aggregation interval.
pub const DEFAULT_INTERVAL: &str = "100ms";

/// Full channel name for an instrument's book stream.
#[must_use]
pub fn book_channel(instrument: &str, depth: u32, interval: &str) -> String {
    format!("{BOOK_PREFIX}.{instrument}.none.{depth}.{interval}")
}

/// Extract the instrument from a book channel name.
///
/// Returns `None` for channels that are not book streams or carry no
/// instrument token.
#[must_use]
pub fn instrument_from_channel(channel: &str) -> Option<&str> {
    let mut tokens = channel.split('.');
    if tokens.next() != Some(BOOK_PREFIX) {
        return None;
    }
    match tokens.next() {
        Some(instrument) if !instrument.is_empty() => Some(instrument),
        _ => None,
    }
}
