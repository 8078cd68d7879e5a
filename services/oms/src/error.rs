//! Error types for the order registry

use services_common::ExchangeError;
use thiserror::Error;

/// Registry-specific error types
#[derive(Debug, Error)]
pub enum OmsError {
    /// The exchange link refused or failed a request call
    #[error("exchange request failed: {0}")]
    Exchange(#[from] ExchangeError),
}

/// Type alias for registry results
pub type OmsResult<T> = Result<T, OmsError>;
