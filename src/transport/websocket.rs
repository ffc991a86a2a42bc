//! WebSocket Fanout Server
//!
//! Accepts client connections on the configured path. Each connection
//! joins the bridge's broadcast group and receives every event as a JSON
//! text frame; text frames sent by the client go to the bridge.

use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio_tungstenite::tungstenite;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::protocol::Message;
use tracing::{debug, error, info, warn};

use crate::bridge::Bridge;
use crate::config::WebSocketConfig;
use crate::metrics::Metrics;

/// Error type for the WebSocket server
#[derive(Debug)]
pub enum ServerError {
    /// Socket error
    Io(io::Error),
    /// Handshake or protocol error
    WebSocket(tungstenite::Error),
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerError::Io(e) => write!(f, "IO error: {}", e),
            ServerError::WebSocket(e) => write!(f, "WebSocket error: {}", e),
        }
    }
}

impl std::error::Error for ServerError {}

impl From<io::Error> for ServerError {
    fn from(e: io::Error) -> Self {
        ServerError::Io(e)
    }
}

impl From<tungstenite::Error> for ServerError {
    fn from(e: tungstenite::Error) -> Self {
        ServerError::WebSocket(e)
    }
}

/// WebSocket listener serving the client broadcast group
pub struct WsServer {
    listener: TcpListener,
    path: Arc<str>,
    max_connections: usize,
    active: Arc<AtomicUsize>,
    bridge: Arc<Bridge>,
    shutdown: broadcast::Sender<()>,
    shutdown_rx: broadcast::Receiver<()>,
}

impl WsServer {
    /// Bind the listener. Nothing is accepted until [`WsServer::run`].
    ///
    /// Sending on `shutdown` stops the accept loop and closes every
    /// connection.
    pub async fn bind(
        config: &WebSocketConfig,
        bridge: Arc<Bridge>,
        shutdown: broadcast::Sender<()>,
    ) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(config.bind).await?;
        let shutdown_rx = shutdown.subscribe();

        Ok(Self {
            listener,
            path: Arc::from(config.path.as_str()),
            max_connections: config.max_connections,
            active: Arc::new(AtomicUsize::new(0)),
            bridge,
            shutdown,
            shutdown_rx,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until shutdown
    pub async fn run(mut self) -> Result<(), ServerError> {
        info!(
            "WebSocket listening on {} (path: {})",
            self.local_addr()?,
            self.path
        );

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown_rx.recv() => {
                    info!("WebSocket: Listener shutting down");
                    return Ok(());
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        debug!("New WebSocket connection from {}", addr);
                        self.handle_connection(stream, addr);
                    }
                    Err(e) => {
                        error!("Failed to accept WebSocket connection: {}", e);
                    }
                },
            }
        }
    }

    fn handle_connection(&self, stream: TcpStream, addr: SocketAddr) {
        let metrics = self.bridge.metrics().clone();
        let Some(slot) = ConnectionSlot::acquire(&self.active, self.max_connections, &metrics)
        else {
            metrics.websocket_connections_rejected_total.inc();
            warn!(
                "WebSocket: Rejecting {} (limit of {} connections reached)",
                addr, self.max_connections
            );
            return;
        };

        let bridge = self.bridge.clone();
        let path = self.path.clone();
        let shutdown_rx = self.shutdown.subscribe();

        tokio::spawn(async move {
            let _slot = slot;
            if let Err(e) = serve_client(stream, addr, path, bridge, shutdown_rx).await {
                debug!("WebSocket connection error from {}: {}", addr, e);
            }
            debug!("WebSocket: {} disconnected", addr);
        });
    }
}

/// One client connection from handshake to close
async fn serve_client(
    stream: TcpStream,
    addr: SocketAddr,
    path: Arc<str>,
    bridge: Arc<Bridge>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), ServerError> {
    // Join before the handshake so nothing sent after the client sees the
    // upgrade response is missed
    let mut events = bridge.subscribe();

    let ws = tokio_tungstenite::accept_hdr_async(stream, |req: &Request, response: Response| {
        let request_path = req.uri().path();
        if request_path != &*path {
            let mut error = ErrorResponse::new(Some(format!(
                "Invalid path: expected '{}', got '{}'",
                path, request_path
            )));
            *error.status_mut() = StatusCode::NOT_FOUND;
            return Err(error);
        }
        Ok(response)
    })
    .await?;

    bridge.metrics().websocket_connections_total.inc();
    debug!("WebSocket handshake complete for {}", addr);

    let (mut sink, mut stream) = ws.split();

    loop {
        tokio::select! {
            biased;

            _ = shutdown_rx.recv() => {
                let _ = sink.send(Message::Close(None)).await;
                return Ok(());
            }
            event = events.recv() => match event {
                Ok(event) => match event.to_json() {
                    Ok(text) => sink.send(Message::Text(text)).await?,
                    Err(e) => error!("WebSocket: Failed to encode {} event: {}", event.kind(), e),
                },
                Err(RecvError::Lagged(skipped)) => {
                    warn!("WebSocket: Client {} lagging, skipped {} event(s)", addr, skipped);
                }
                Err(RecvError::Closed) => return Ok(()),
            },
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    bridge.handle_client_text(&text).await;
                }
                Some(Ok(Message::Ping(data))) => sink.send(Message::Pong(data)).await?,
                Some(Ok(Message::Close(_))) | None => return Ok(()),
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e.into()),
            },
        }
    }
}

/// Reservation of one connection under the limit. Released on drop.
struct ConnectionSlot {
    active: Arc<AtomicUsize>,
    metrics: Arc<Metrics>,
}

impl ConnectionSlot {
    /// `max == 0` means unlimited
    fn acquire(active: &Arc<AtomicUsize>, max: usize, metrics: &Arc<Metrics>) -> Option<Self> {
        let previous = active.fetch_add(1, Ordering::AcqRel);
        if max > 0 && previous >= max {
            active.fetch_sub(1, Ordering::AcqRel);
            return None;
        }

        metrics.websocket_clients_current.inc();
        Some(Self {
            active: active.clone(),
            metrics: metrics.clone(),
        })
    }
}

impl Drop for ConnectionSlot {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::AcqRel);
        self.metrics.websocket_clients_current.dec();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_slot_limit() {
        let active = Arc::new(AtomicUsize::new(0));
        let metrics = Arc::new(Metrics::new());

        let first = ConnectionSlot::acquire(&active, 2, &metrics);
        let second = ConnectionSlot::acquire(&active, 2, &metrics);
        assert!(first.is_some());
        assert!(second.is_some());
        assert!(ConnectionSlot::acquire(&active, 2, &metrics).is_none());
        assert_eq!(active.load(Ordering::Acquire), 2);
        assert_eq!(metrics.websocket_clients_current.get(), 2);

        drop(first);
        assert_eq!(active.load(Ordering::Acquire), 1);
        assert!(ConnectionSlot::acquire(&active, 2, &metrics).is_some());
        assert_eq!(metrics.websocket_clients_current.get(), 1);
    }

    #[test]
    fn test_connection_slot_unlimited() {
        let active = Arc::new(AtomicUsize::new(0));
        let metrics = Arc::new(Metrics::new());

        let slots: Vec<_> = (0..10)
            .filter_map(|_| ConnectionSlot::acquire(&active, 0, &metrics))
            .collect();
        assert_eq!(slots.len(), 10);
    }
}
