//! WebSocket server lifecycle
//!
//! One accept loop, one task per connection, one writer task per
//! connection draining its outbound queue. Shutdown is cooperative: a
//! watch signal is multiplexed into every read loop, and `stop` awaits
//! the accept loop, which in turn joins every connection task, so no
//! handler outlives `stop()`.

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use services_common::Lifecycle;

use crate::broker::Broker;
use crate::connection::{connection_id, ClientConnection, WsConnection};
use crate::error::ServerError;

/// WebSocket front door over a shared [`Broker`].
pub struct WsServer {
    broker: Arc<Broker>,
    lifecycle: Mutex<Lifecycle>,
    shutdown: watch::Sender<bool>,
    local_addr: Mutex<Option<SocketAddr>>,
    accept_handle: Mutex<Option<JoinHandle<()>>>,
}

impl WsServer {
    /// Server over a shared broker, not yet listening.
    #[must_use]
    pub fn new(broker: Arc<Broker>) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            broker,
            lifecycle: Mutex::new(Lifecycle::Created),
            shutdown,
            local_addr: Mutex::new(None),
            accept_handle: Mutex::new(None),
        }
    }

    /// Broker this server feeds.
    #[must_use]
    pub fn broker(&self) -> &Arc<Broker> {
        &self.broker
    }

    /// Address the listener actually bound, once running. Lets callers
    /// bind port 0 and discover the assigned port.
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock()
    }

    /// Bind the listener and spawn the accept loop.
    ///
    /// Failing to bind is the one fatal error; everything later is
    /// handled per connection. Idempotent while running.
    pub async fn start(&self, addr: &str) -> Result<(), ServerError> {
        {
            let mut state = self.lifecycle.lock();
            if state.is_running() {
                return Ok(());
            }
            *state = Lifecycle::Running;
        }

        let listener = match TcpListener::bind(addr).await {
            Ok(listener) => listener,
            Err(source) => {
                *self.lifecycle.lock() = Lifecycle::Stopped;
                return Err(ServerError::Bind {
                    addr: addr.to_string(),
                    source,
                });
            }
        };
        let bound = listener.local_addr().ok();
        *self.local_addr.lock() = bound;
        info!(addr = %addr, "gateway listening");

        let broker = Arc::clone(&self.broker);
        let shutdown = self.shutdown.subscribe();
        let handle = tokio::spawn(accept_loop(listener, broker, shutdown));
        *self.accept_handle.lock() = Some(handle);
        Ok(())
    }

    /// Signal shutdown, close every connection, and wait for all
    /// connection tasks to finish. Idempotent.
    pub async fn stop(&self) {
        {
            let mut state = self.lifecycle.lock();
            if !state.is_running() {
                return;
            }
            *state = Lifecycle::Stopping;
        }

        let _ = self.shutdown.send(true);
        self.broker.close_all();

        let handle = self.accept_handle.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "accept loop panicked");
            }
        }

        *self.lifecycle.lock() = Lifecycle::Stopped;
        info!("gateway stopped");
    }
}

async fn accept_loop(
    listener: TcpListener,
    broker: Arc<Broker>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut connections = JoinSet::new();
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    debug!(%peer, "inbound connection");
                    let broker = Arc::clone(&broker);
                    let shutdown = shutdown.clone();
                    connections.spawn(handle_connection(stream, broker, shutdown));
                }
                Err(e) => {
                    // Accept errors are transient; keep listening.
                    warn!(error = %e, "accept failed");
                }
            }
        }
    }
    // Joining here is what makes stop() wait for every handler.
    while connections.join_next().await.is_some() {}
    debug!("accept loop ended");
}

async fn handle_connection(
    stream: TcpStream,
    broker: Arc<Broker>,
    mut shutdown: watch::Receiver<bool>,
) {
    let ws = match tokio_tungstenite::accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!(error = %e, "websocket handshake failed");
            return;
        }
    };
    let (mut write, mut read) = ws.split();
    let (outbound, mut outbound_rx) = mpsc::unbounded_channel();
    let id = connection_id();
    let connection = Arc::new(WsConnection::new(id.clone(), outbound));

    let writer = tokio::spawn(async move {
        while let Some(frame) = outbound_rx.recv().await {
            let closing = matches!(frame, Message::Close(_));
            if write.send(frame).await.is_err() {
                break;
            }
            if closing {
                break;
            }
        }
    });

    broker.register(connection.clone());

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            frame = read.next() => match frame {
                Some(Ok(Message::Text(text))) => broker.handle_command(&id, &text),
                Some(Ok(Message::Close(_))) | None => {
                    debug!(connection = %id, "client disconnected");
                    break;
                }
                Some(Ok(Message::Binary(_))) => {
                    debug!(connection = %id, "ignoring binary frame");
                }
                // Ping and pong are answered by the protocol layer.
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!(connection = %id, error = %e, "read failed");
                    break;
                }
            }
        }
    }

    broker.unregister(&id);
    connection.close();
    let _ = writer.await;
}
