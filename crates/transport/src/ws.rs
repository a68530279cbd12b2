//! WebSocket duplex binding.
//!
//! Each accepted socket gets a UUID connection id and an entry in the
//! connection table. Inbound text frames become transport messages
//! tagged with that id; outbound frames arrive over a per-connection
//! channel fed by `write_message` routing.

use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use axum::Router;
use futures::{SinkExt, StreamExt};
use tokio::sync::{mpsc, watch};
use tracing::debug;
use uuid::Uuid;

use werkbank_core::config::HttpConfig;
use werkbank_core::TransportMessage;

use crate::error::TransportError;
use crate::http::{HttpTransport, RouteSet, TransportState};
use crate::Transport;

/// `GET /ws`: upgrade to the duplex binding.
pub(crate) async fn ws_upgrade(
    State(state): State<Arc<TransportState>>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<TransportState>) {
    let connection_id = Uuid::new_v4().to_string();
    let (mut sender, mut receiver) = socket.split();

    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    state.connections.register(&connection_id, tx);
    debug!(connection = %connection_id, "websocket connected");

    // Forward frames routed to this connection id.
    let send_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if sender.send(Message::Text(frame.into())).await.is_err() {
                break;
            }
        }
    });

    // Tag inbound text frames with the connection id and feed the
    // shared queue.
    let inbound = state.inbound_tx.clone();
    let conn_id = connection_id.clone();
    let recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => {
                    let frame =
                        TransportMessage::new(text.to_string()).with_connection_id(&conn_id);
                    if inbound.send(frame).is_err() {
                        // Server loop stopped reading.
                        break;
                    }
                }
                Message::Close(_) => break,
                // Pings are answered by axum; ignore binary frames.
                _ => {}
            }
        }
    });

    // Wait for either direction to finish (client disconnect or
    // transport shutdown), then drop the table entry. Removing it
    // drops the sender, which lets the other task run out on its own.
    tokio::select! {
        _ = send_task => {},
        _ = recv_task => {},
    }

    state.connections.remove(&connection_id);
    debug!(connection = %connection_id, "websocket disconnected");
}

/// Standalone duplex binding: its own listener serving only the socket
/// upgrade and the health probe. Routing and lifecycle are shared with
/// [`HttpTransport`].
pub struct WsTransport {
    inner: HttpTransport,
}

impl WsTransport {
    pub fn new(config: &HttpConfig) -> Self {
        Self {
            inner: HttpTransport::with_routes(config, RouteSet::WsOnly),
        }
    }

    /// The axum router serving `/ws` and `/health`.
    pub fn router(&self) -> Router {
        self.inner.router()
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn start(&self) -> Result<(), TransportError> {
        self.inner.start().await
    }

    async fn stop(&self) -> Result<(), TransportError> {
        self.inner.stop().await
    }

    async fn read_message(&self) -> Result<Option<TransportMessage>, TransportError> {
        self.inner.read_message().await
    }

    async fn write_message(&self, message: TransportMessage) -> Result<(), TransportError> {
        self.inner.write_message(message).await
    }

    fn is_connected(&self) -> bool {
        self.inner.is_connected()
    }

    fn disconnected(&self) -> watch::Receiver<bool> {
        self.inner.disconnected()
    }
}
