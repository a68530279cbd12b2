//! The message pump tying transport, dispatch, and budget together.
//!
//! `Server` reads frames off one transport and fans each one out to its
//! own task: requests route to the catalog or a protocol method,
//! notifications drive cancellation, and response frames resolve
//! server-initiated requests. Successful tool payloads are shaped to the
//! caller's token budget on the way back out.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{json, Value};
use tracing::{debug, info, warn};

use werkbank_budget::{shape_to_budget, ShapeOutcome};
use werkbank_core::config::BudgetConfig;
use werkbank_core::wire::PROTOCOL_VERSION;
use werkbank_core::{
    cancel_pair, error_codes, CancelHandle, CancelSignal, ErrorKind, ExecutionError,
    ExecutionResult, RecoveryGuidance, RpcError, RpcId, RpcNotification, RpcRequest, RpcResponse,
    TransportMessage,
};
use werkbank_dispatch::{Dispatcher, ToolCatalog};
use werkbank_transport::{Correlator, Transport, TransportError};

use crate::protocol::{
    CallToolParams, CancelledParams, InitializeResult, ListToolsResult, ServerCapabilities,
    ServerInfo, ToolsCapability,
};

/// In-flight dispatches are keyed by originating connection and request
/// id so a cancellation notification can find its target.
type FlightKey = (Option<String>, RpcId);

/// Tool server bound to a single transport.
///
/// Cloning is cheap: clones share the transport, catalog, dispatcher,
/// and correlator, which is what lets every inbound frame run on its
/// own task.
#[derive(Clone)]
pub struct Server {
    transport: Arc<dyn Transport>,
    catalog: Arc<ToolCatalog>,
    dispatcher: Arc<Dispatcher>,
    correlator: Correlator<Value>,
    in_flight: Arc<Mutex<HashMap<FlightKey, CancelHandle>>>,
    budget: BudgetConfig,
    name: String,
    version: String,
}

impl Server {
    pub fn new(
        transport: Arc<dyn Transport>,
        catalog: Arc<ToolCatalog>,
        dispatcher: Arc<Dispatcher>,
        budget: BudgetConfig,
    ) -> Self {
        Self {
            transport,
            catalog,
            dispatcher,
            correlator: Correlator::new(),
            in_flight: Arc::new(Mutex::new(HashMap::new())),
            budget,
            name: "werkbank".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// Set the server name reported by `initialize`.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Pump the transport until it closes.
    ///
    /// Every inbound frame is handled on its own task, so a slow tool
    /// never blocks the reader. `Ok(None)` from the transport ends the
    /// loop and triggers [`Server::shutdown`].
    pub async fn run(&self) -> Result<(), TransportError> {
        info!(server = %self.name, version = %self.version, "server starting");
        self.transport.start().await?;

        while let Some(message) = self.transport.read_message().await? {
            debug!(payload = %message.payload, "received frame");
            let server = self.clone();
            tokio::spawn(async move {
                server.handle_message(message).await;
            });
        }

        info!("transport closed, shutting down");
        self.shutdown().await
    }

    /// Cancel in-flight dispatches, abandon pending server-initiated
    /// requests, and stop the transport. Safe to call more than once.
    pub async fn shutdown(&self) -> Result<(), TransportError> {
        let handles: Vec<CancelHandle> = {
            let mut in_flight = self.in_flight.lock().unwrap();
            in_flight.drain().map(|(_, handle)| handle).collect()
        };
        if !handles.is_empty() {
            debug!(count = handles.len(), "cancelling in-flight dispatches");
        }
        for handle in handles {
            handle.cancel();
        }

        let drained = self.correlator.drain();
        if drained > 0 {
            debug!(count = drained, "abandoned server-initiated requests");
        }

        self.dispatcher.cache().clear();
        self.transport.stop().await
    }

    /// Send a request to the connected client and wait for its response.
    ///
    /// Only meaningful over duplex transports; the response frame is
    /// matched back through the correlator by its string id.
    pub async fn request(
        &self,
        method: impl Into<String>,
        params: Option<Value>,
        timeout: Duration,
    ) -> Result<Value, ExecutionError> {
        let id = uuid::Uuid::new_v4().to_string();
        let pending = self
            .correlator
            .register(&id, timeout, CancelSignal::never())
            .map_err(|err| ExecutionError::internal(err.to_string()))?;

        let request = RpcRequest::new(RpcId::String(id), method, params);
        let payload = serde_json::to_string(&request)
            .map_err(|err| ExecutionError::internal(err.to_string()))?;
        if let Err(err) = self.transport.write_message(TransportMessage::new(payload)).await {
            // Dropping `pending` evicts the id again.
            return Err(ExecutionError::internal(format!(
                "failed to write request: {err}"
            )));
        }
        pending.wait().await
    }

    /// Handle one inbound frame: request, notification, or response.
    pub async fn handle_message(&self, message: TransportMessage) {
        let raw: Value = match serde_json::from_str(&message.payload) {
            Ok(value) => value,
            Err(err) => {
                warn!(error = %err, "unparseable frame");
                let response = RpcResponse::error(
                    RpcId::Number(0),
                    RpcError::new(error_codes::PARSE_ERROR, format!("invalid JSON: {err}")),
                );
                self.send_response(&message, response).await;
                return;
            }
        };

        // A frame without a method is a response to something we sent.
        if raw.get("method").is_none()
            && (raw.get("result").is_some() || raw.get("error").is_some())
        {
            self.handle_response(raw);
            return;
        }

        // A method without an id is a notification.
        if raw.get("id").is_none() {
            match serde_json::from_value::<RpcNotification>(raw) {
                Ok(notification) => self.handle_notification(&message, notification),
                Err(err) => debug!(error = %err, "discarding malformed notification"),
            }
            return;
        }

        let request: RpcRequest = match serde_json::from_value(raw.clone()) {
            Ok(request) => request,
            Err(err) => {
                warn!(error = %err, "malformed request");
                let id = raw
                    .get("id")
                    .cloned()
                    .and_then(|v| serde_json::from_value::<RpcId>(v).ok())
                    .unwrap_or(RpcId::Number(0));
                let response = RpcResponse::error(
                    id,
                    RpcError::new(
                        error_codes::INVALID_REQUEST,
                        format!("malformed request: {err}"),
                    ),
                );
                self.send_response(&message, response).await;
                return;
            }
        };

        let response = self.handle_request(&message, request).await;
        self.send_response(&message, response).await;
    }

    /// Route a request to a protocol method or a tool dispatch.
    pub async fn handle_request(
        &self,
        message: &TransportMessage,
        request: RpcRequest,
    ) -> RpcResponse {
        let id = request.id.clone();
        match request.method.as_str() {
            "initialize" => self.handle_initialize(id),
            "tools/list" => self.handle_list_tools(id),
            "tools/call" => {
                let params = match request
                    .params
                    .clone()
                    .map(serde_json::from_value::<CallToolParams>)
                {
                    Some(Ok(params)) => params,
                    Some(Err(err)) => {
                        return ExecutionResult::failure(ExecutionError::invalid_parameters(
                            format!("tools/call params: {err}"),
                        ))
                        .into_response(id);
                    }
                    None => {
                        return ExecutionResult::failure(ExecutionError::invalid_parameters(
                            "tools/call requires params with a tool name",
                        ))
                        .into_response(id);
                    }
                };
                self.dispatch_tool(message, &request, &params.name, params.arguments)
                    .await
            }
            // Any other method is tried as a direct tool name.
            method => {
                let params = request.params.clone().unwrap_or_else(|| json!({}));
                let name = method.to_string();
                self.dispatch_tool(message, &request, &name, params).await
            }
        }
    }

    fn handle_initialize(&self, id: RpcId) -> RpcResponse {
        debug!("handling initialize");
        let result = InitializeResult {
            protocol_version: PROTOCOL_VERSION.to_string(),
            capabilities: ServerCapabilities {
                tools: Some(ToolsCapability {
                    list_changed: false,
                }),
            },
            server_info: ServerInfo {
                name: self.name.clone(),
                version: Some(self.version.clone()),
            },
        };
        match serde_json::to_value(result) {
            Ok(value) => RpcResponse::success(id, value),
            Err(err) => RpcResponse::error(
                id,
                RpcError::new(error_codes::INTERNAL_ERROR, err.to_string()),
            ),
        }
    }

    fn handle_list_tools(&self, id: RpcId) -> RpcResponse {
        debug!("handling tools/list");
        let result = ListToolsResult {
            tools: self.catalog.list(),
        };
        match serde_json::to_value(result) {
            Ok(value) => RpcResponse::success(id, value),
            Err(err) => RpcResponse::error(
                id,
                RpcError::new(error_codes::INTERNAL_ERROR, err.to_string()),
            ),
        }
    }

    /// Run one tool dispatch with a registered cancellation handle, then
    /// shape the successful payload to the applicable token budget.
    async fn dispatch_tool(
        &self,
        message: &TransportMessage,
        request: &RpcRequest,
        name: &str,
        params: Value,
    ) -> RpcResponse {
        let id = request.id.clone();
        let key: FlightKey = (message.connection_id.clone(), id.clone());
        let (handle, signal) = cancel_pair();
        self.in_flight.lock().unwrap().insert(key.clone(), handle);

        let result = self.dispatcher.dispatch(name, params, signal).await;
        self.in_flight.lock().unwrap().remove(&key);

        let result = match result {
            ExecutionResult::Success { payload } => self.shape_payload(request, payload),
            failure => failure,
        };
        result.into_response(id)
    }

    fn shape_payload(&self, request: &RpcRequest, payload: Value) -> ExecutionResult {
        let limit = request
            .token_limit
            .unwrap_or(self.budget.response_token_limit) as usize;
        let shaped = shape_to_budget(payload, limit);
        match shaped.outcome {
            ShapeOutcome::OverBudget { estimated_tokens } => ExecutionResult::failure(
                ExecutionError::resource_limit(format!(
                    "response is ~{estimated_tokens} tokens against a budget of {limit} \
                     and has nothing left to reduce"
                ))
                .with_recovery(RecoveryGuidance::new([
                    "narrow the query so the tool returns less data",
                    "raise token_limit on the request if the client can afford it",
                ])),
            ),
            ShapeOutcome::Reduced {
                original_count,
                returned_count,
            } => {
                debug!(
                    original = original_count,
                    returned = returned_count,
                    limit,
                    "shaped response payload"
                );
                ExecutionResult::success(shaped.payload)
            }
            ShapeOutcome::Unchanged => ExecutionResult::success(shaped.payload),
        }
    }

    fn handle_notification(&self, message: &TransportMessage, notification: RpcNotification) {
        match notification.method.as_str() {
            "notifications/cancelled" => {
                let params = notification
                    .params
                    .map(serde_json::from_value::<CancelledParams>);
                let Some(Ok(params)) = params else {
                    debug!("cancellation notification without a usable request_id");
                    return;
                };
                let key: FlightKey = (message.connection_id.clone(), params.request_id);
                let handle = self.in_flight.lock().unwrap().remove(&key);
                match handle {
                    Some(handle) => {
                        debug!(request_id = ?key.1, "cancelling in-flight request");
                        handle.cancel();
                    }
                    None => debug!(request_id = ?key.1, "cancellation for unknown or finished request"),
                }
            }
            "notifications/initialized" => {
                debug!("client confirmed initialization");
            }
            method => {
                debug!(method = %method, "ignoring notification");
            }
        }
    }

    /// Resolve a response frame against the server-initiated correlator.
    fn handle_response(&self, raw: Value) {
        let response = match serde_json::from_value::<RpcResponse>(raw) {
            Ok(response) => response,
            Err(err) => {
                debug!(error = %err, "discarding malformed response frame");
                return;
            }
        };
        let key = match &response.id {
            RpcId::String(s) => s.clone(),
            RpcId::Number(n) => n.to_string(),
        };
        let resolved = match response.error {
            Some(err) => self.correlator.try_fail(
                &key,
                ExecutionError::new(kind_from_code(err.code), err.message),
            ),
            None => self
                .correlator
                .try_complete(&key, response.result.unwrap_or(Value::Null)),
        };
        if !resolved {
            debug!(id = %key, "response with no pending request");
        }
    }

    async fn send_response(&self, inbound: &TransportMessage, response: RpcResponse) {
        let payload = match serde_json::to_string(&response) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(error = %err, "failed to serialize response");
                return;
            }
        };
        debug!(payload = %payload, "sending response");
        if let Err(err) = self.transport.write_message(inbound.reply(payload)).await {
            warn!(error = %err, "failed to write response");
        }
    }
}

/// Map a wire error code back onto the error taxonomy.
fn kind_from_code(code: i64) -> ErrorKind {
    match code {
        error_codes::METHOD_NOT_FOUND => ErrorKind::NotFound,
        error_codes::INVALID_PARAMS => ErrorKind::InvalidParameters,
        error_codes::TIMEOUT => ErrorKind::Timeout,
        error_codes::CANCELLED => ErrorKind::OperationCancelled,
        error_codes::RESOURCE_LIMIT => ErrorKind::ResourceLimitExceeded,
        _ => ErrorKind::InternalError,
    }
}
