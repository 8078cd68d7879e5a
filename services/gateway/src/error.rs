//! Gateway error types

use thiserror::Error;

/// Failures the WebSocket server can surface.
///
/// Everything past the bind is handled in place; a listener that cannot
/// bind is the one condition the process cannot run without.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The listener could not bind its address
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Address the bind was attempted on
        addr: String,
        /// Underlying socket error
        #[source]
        source: std::io::Error,
    },
}
