//! WebSocket fan-out gateway
//!
//! Accepts downstream WebSocket clients, tracks which instruments each
//! one follows, and fans cached order book updates out to exactly the
//! connections subscribed to them.

#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod broker;
pub mod config;
pub mod connection;
pub mod error;
pub mod server;

pub use broker::Broker;
pub use config::GatewayConfig;
pub use connection::{connection_id, ClientConnection, WsConnection};
pub use error::ServerError;
pub use server::WsServer;
