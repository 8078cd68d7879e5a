//! Shared types for the order book middleware services
//!
//! Everything that crosses a service boundary lives here: the cached
//! order book representation, the exchange-link trait consumed by the
//! market data cache and the order registry, the downstream client
//! protocol, and the component lifecycle state.

#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod errors;
pub mod exchange;
pub mod lifecycle;
pub mod orderbook;
pub mod protocol;

pub use errors::ExchangeError;
pub use exchange::ExchangeLink;
pub use lifecycle::Lifecycle;
pub use orderbook::Orderbook;
pub use protocol::{ClientCommand, ServerMessage, SubscriptionStatus};
