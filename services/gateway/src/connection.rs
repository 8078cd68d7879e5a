//! Downstream client connection handles
//!
//! The broker never touches a socket directly; it talks to connections
//! through the `ClientConnection` capability. The production handle
//! pushes frames onto an unbounded outbound queue drained by the
//! per-connection writer task, so no broker path ever awaits a socket.

use rand::Rng;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

const ID_LEN: usize = 16;
const ID_ALPHABET: &[u8] = b"0123456789abcdef";

/// Mint a fresh connection id: exactly 16 lowercase hex characters.
#[must_use]
pub fn connection_id() -> String {
    let mut rng = rand::thread_rng();
    (0..ID_LEN)
        .map(|_| ID_ALPHABET[rng.gen_range(0..ID_ALPHABET.len())] as char)
        .collect()
}

/// What the broker needs from a downstream connection.
pub trait ClientConnection: Send + Sync {
    /// Opaque connection id; the broker keys every table on this.
    fn id(&self) -> &str;

    /// Queue one text frame for delivery. `false` means the peer is
    /// gone; callers skip it, they do not treat it as an error.
    fn send(&self, text: String) -> bool;

    /// Ask the transport to close. Idempotent.
    fn close(&self);
}

/// WebSocket-backed connection handle.
pub struct WsConnection {
    id: String,
    outbound: mpsc::UnboundedSender<Message>,
}

impl WsConnection {
    /// Handle writing into the outbound queue drained by the writer task.
    pub fn new(id: String, outbound: mpsc::UnboundedSender<Message>) -> Self {
        Self { id, outbound }
    }
}

impl ClientConnection for WsConnection {
    fn id(&self) -> &str {
        &self.id
    }

    fn send(&self, text: String) -> bool {
        self.outbound.send(Message::Text(text)).is_ok()
    }

    fn close(&self) {
        // The writer task stops after flushing the close frame.
        let _ = self.outbound.send(Message::Close(None));
    }
}
