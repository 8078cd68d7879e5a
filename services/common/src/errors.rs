//! Error types for the exchange-link trust boundary

use thiserror::Error;

/// Failures reported by an [`crate::ExchangeLink`] implementation.
///
/// Callers treat these by taxonomy: transport failures are logged and
/// leave the affected data stale, protocol failures are dropped at the
/// point of ingestion, and request failures surface to the caller that
/// issued the request.
#[derive(Debug, Error)]
pub enum ExchangeError {
    /// Connectivity problems: connect, send, or session teardown failed
    #[error("transport failure: {0}")]
    Transport(String),

    /// The venue answered with a payload we could not make sense of
    #[error("protocol failure: {0}")]
    Protocol(String),

    /// A synchronous request call was refused by the venue
    #[error("request failed: {0}")]
    Request(String),
}

impl ExchangeError {
    /// True when retrying later could plausibly succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}
