//! HTTP transport binding.
//!
//! Request/response over `POST /rpc`: the handler parks each request in
//! the correlator under a fresh UUID, the server loop pulls the frame
//! off the shared inbound queue, and the correlated reply becomes the
//! HTTP response body. `GET /health` reports transport status; `GET
//! /ws` upgrades to the duplex binding when enabled.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tracing::{debug, info, warn};
use uuid::Uuid;

use werkbank_core::config::HttpConfig;
use werkbank_core::{CancelSignal, TransportMessage};

use crate::connections::ConnectionTable;
use crate::correlator::Correlator;
use crate::error::TransportError;
use crate::{ws, Transport};

// ── Shared state ────────────────────────────────────────────────────

/// State shared between the axum handlers and the transport itself.
pub(crate) struct TransportState {
    pub correlator: Correlator<String>,
    pub connections: ConnectionTable,
    pub inbound_tx: mpsc::UnboundedSender<TransportMessage>,
    pub request_timeout: Duration,
    pub scheme: &'static str,
    pub websocket: bool,
    pub started_at: chrono::DateTime<chrono::Utc>,
}

/// Which routes a binding serves.
#[derive(Clone, Copy, PartialEq, Eq)]
pub(crate) enum RouteSet {
    /// `/rpc` and `/health`, plus `/ws` when the websocket toggle is on.
    Full,
    /// `/ws` and `/health` only (the standalone duplex binding).
    WsOnly,
}

// ── Transport ───────────────────────────────────────────────────────

/// HTTP request/response binding with optional WebSocket upgrade.
pub struct HttpTransport {
    state: Arc<TransportState>,
    inbound_rx: Mutex<mpsc::UnboundedReceiver<TransportMessage>>,
    addr: String,
    cors: bool,
    routes: RouteSet,
    serve_task: std::sync::Mutex<Option<JoinHandle<()>>>,
    shutdown_tx: watch::Sender<bool>,
    started: AtomicBool,
    stopped: AtomicBool,
    disconnect_tx: watch::Sender<bool>,
    disconnect_rx: watch::Receiver<bool>,
}

impl HttpTransport {
    pub fn new(config: &HttpConfig) -> Self {
        Self::with_routes(config, RouteSet::Full)
    }

    pub(crate) fn with_routes(config: &HttpConfig, routes: RouteSet) -> Self {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, _) = watch::channel(false);
        let (disconnect_tx, disconnect_rx) = watch::channel(false);
        let state = Arc::new(TransportState {
            correlator: Correlator::new(),
            connections: ConnectionTable::new(),
            inbound_tx,
            request_timeout: config.request_timeout,
            scheme: config.scheme(),
            websocket: config.websocket || routes == RouteSet::WsOnly,
            started_at: chrono::Utc::now(),
        });
        Self {
            state,
            inbound_rx: Mutex::new(inbound_rx),
            addr: config.bind_addr(),
            cors: config.cors,
            routes,
            serve_task: std::sync::Mutex::new(None),
            shutdown_tx,
            started: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            disconnect_tx,
            disconnect_rx,
        }
    }

    /// The axum router serving this transport's routes. Exposed so
    /// in-process tests can drive the service without a socket.
    pub fn router(&self) -> Router {
        let mut router = match self.routes {
            RouteSet::Full => {
                let mut r = Router::new()
                    .route("/rpc", post(handle_rpc))
                    .route("/health", get(handle_health));
                if self.state.websocket {
                    r = r.route("/ws", get(ws::ws_upgrade));
                }
                r
            }
            RouteSet::WsOnly => Router::new()
                .route("/ws", get(ws::ws_upgrade))
                .route("/health", get(handle_health)),
        };
        if self.cors {
            router = router.layer(CorsLayer::permissive());
        }
        router.with_state(Arc::clone(&self.state))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn start(&self) -> Result<(), TransportError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let app = self.router();
        let listener =
            TcpListener::bind(&self.addr)
                .await
                .map_err(|source| TransportError::Bind {
                    addr: self.addr.clone(),
                    source,
                })?;
        info!("listening on {}://{}", self.state.scheme, self.addr);

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let task = tokio::spawn(async move {
            let shutdown = async move {
                let _ = shutdown_rx.changed().await;
            };
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(shutdown)
                .await
            {
                warn!("http server error: {e}");
            }
        });
        *self.serve_task.lock().unwrap() = Some(task);
        Ok(())
    }

    async fn stop(&self) -> Result<(), TransportError> {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let _ = self.shutdown_tx.send(true);

        let drained = self.state.correlator.drain();
        if drained > 0 {
            debug!("failed {drained} parked requests at shutdown");
        }
        self.state.connections.close_all();

        let task = self.serve_task.lock().unwrap().take();
        if let Some(mut task) = task {
            // Parked handlers already resolved, give keep-alive
            // connections a moment to settle.
            if tokio::time::timeout(Duration::from_secs(2), &mut task)
                .await
                .is_err()
            {
                task.abort();
            }
        }
        let _ = self.disconnect_tx.send(true);
        Ok(())
    }

    async fn read_message(&self) -> Result<Option<TransportMessage>, TransportError> {
        let mut disconnect = self.disconnect_rx.clone();
        if *disconnect.borrow() {
            return Ok(None);
        }
        let mut rx = self.inbound_rx.lock().await;
        tokio::select! {
            message = rx.recv() => Ok(message),
            _ = disconnect.changed() => Ok(None),
        }
    }

    async fn write_message(&self, message: TransportMessage) -> Result<(), TransportError> {
        let TransportMessage {
            payload,
            correlation_id,
            connection_id,
            ..
        } = message;

        if let Some(connection_id) = connection_id {
            // Benign no-op when the connection is already gone.
            if !self.state.connections.send_to(&connection_id, &payload) {
                debug!(connection = %connection_id, "dropping frame for closed connection");
            }
            return Ok(());
        }
        if let Some(correlation_id) = correlation_id {
            if !self.state.correlator.try_complete(&correlation_id, payload) {
                debug!(correlation = %correlation_id, "no pending request for reply");
            }
            return Ok(());
        }
        if self.state.connections.count() > 0 {
            let reached = self.state.connections.broadcast(&payload);
            debug!("broadcast frame to {reached} connections");
            return Ok(());
        }
        warn!("dropping unroutable outbound message");
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.started.load(Ordering::SeqCst) && !self.stopped.load(Ordering::SeqCst)
    }

    fn disconnected(&self) -> watch::Receiver<bool> {
        self.disconnect_rx.clone()
    }
}

// ── Handlers ────────────────────────────────────────────────────────

/// `POST /rpc`: park the request, enqueue the frame, await the reply.
async fn handle_rpc(State(state): State<Arc<TransportState>>, body: String) -> Response {
    if body.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({"error": "empty request body"})),
        )
            .into_response();
    }

    let correlation_id = Uuid::new_v4().to_string();
    let pending = match state.correlator.register(
        &correlation_id,
        state.request_timeout,
        CancelSignal::never(),
    ) {
        Ok(pending) => pending,
        Err(e) => {
            warn!("failed to park rpc request: {e}");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"error": e.to_string()})),
            )
                .into_response();
        }
    };

    let frame = TransportMessage::new(body.clone()).with_correlation_id(&correlation_id);
    if state.inbound_tx.send(frame).is_err() {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({"error": "transport is shutting down"})),
        )
            .into_response();
    }

    match pending.wait().await {
        Ok(payload) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/json")],
            payload,
        )
            .into_response(),
        Err(error) => {
            // Timed out, cancelled, or failed before a reply arrived.
            // Still a well-formed protocol-level error for the caller.
            debug!(correlation = %correlation_id, "rpc request failed: {error}");
            let body = serde_json::json!({
                "jsonrpc": "2.0",
                "id": extract_id(&body),
                "error": error.to_rpc_error(),
            });
            (StatusCode::OK, Json(body)).into_response()
        }
    }
}

/// Pull the JSON-RPC id out of a raw request body, for error replies
/// built without an answer from the server loop.
fn extract_id(body: &str) -> Value {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("id").cloned())
        .unwrap_or(Value::Null)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    scheme: &'static str,
    pending_requests: usize,
    uptime_secs: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    connections: Option<usize>,
}

/// `GET /health`: answers independently of the rpc path.
async fn handle_health(State(state): State<Arc<TransportState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        scheme: state.scheme,
        pending_requests: state.correlator.pending_count(),
        uptime_secs: (chrono::Utc::now() - state.started_at).num_seconds(),
        connections: state.websocket.then(|| state.connections.count()),
    })
}
