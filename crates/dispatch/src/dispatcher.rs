//! Tool invocation with lookup, validation, and fault isolation.
//!
//! Every invocation moves through a small state machine: `received`,
//! `validated`, `executing`, then exactly one of `completed`, `failed`,
//! `timed_out`, or `cancelled`. Handlers run on their own tokio task so
//! a panic or runaway loop stays contained.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::task::JoinError;
use tracing::{debug, warn};

use werkbank_core::{CancelSignal, ExecutionError, ExecutionResult, RecoveryGuidance};

use crate::cache::ResourceCache;
use crate::catalog::ToolCatalog;
use crate::tool::{ToolContext, ToolError};

/// Settings the dispatcher cannot derive from the catalog.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Deadline for tools without a per-tool override.
    pub default_timeout: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_secs(30),
        }
    }
}

/// Routes validated calls to registered tools.
pub struct Dispatcher {
    catalog: Arc<ToolCatalog>,
    cache: Arc<ResourceCache>,
    config: DispatchConfig,
}

impl Dispatcher {
    pub fn new(
        catalog: Arc<ToolCatalog>,
        cache: Arc<ResourceCache>,
        config: DispatchConfig,
    ) -> Self {
        Self {
            catalog,
            cache,
            config,
        }
    }

    /// Run one tool call to completion.
    ///
    /// Lookup and validation fail synchronously without touching the
    /// handler. The handler itself runs on a spawned task racing the
    /// per-tool deadline and the caller's cancellation signal, and its
    /// outcome always comes back as an [`ExecutionResult`], never as a
    /// panic or a hang.
    pub async fn dispatch(
        &self,
        name: &str,
        params: Value,
        mut cancel: CancelSignal,
    ) -> ExecutionResult {
        debug!(tool = %name, state = "received", "dispatch started");

        let Some(tool) = self.catalog.entry(name) else {
            debug!(tool = %name, state = "failed", "unknown tool");
            return ExecutionResult::failure(self.unknown_tool(name));
        };

        let failures = tool.validator.check(&params);
        if !failures.is_empty() {
            debug!(
                tool = %name,
                state = "failed",
                failures = failures.len(),
                "parameter validation failed"
            );
            return ExecutionResult::failure(invalid_parameters(name, &failures));
        }
        debug!(tool = %name, state = "validated", "parameters accepted");

        let timeout = tool
            .descriptor
            .timeout
            .unwrap_or(self.config.default_timeout);
        let handler = tool.descriptor.handler();
        let ctx = ToolContext::new(cancel.clone(), Arc::clone(&self.cache));

        debug!(tool = %name, state = "executing", deadline = ?timeout, "handler started");
        let mut task = tokio::spawn(async move { handler.invoke(params, ctx).await });

        tokio::select! {
            joined = &mut task => match joined {
                Ok(Ok(payload)) => {
                    debug!(tool = %name, state = "completed", "handler finished");
                    ExecutionResult::success(payload)
                }
                Ok(Err(err)) => {
                    debug!(tool = %name, state = "failed", error = %err, "handler returned an error");
                    ExecutionResult::failure(map_tool_error(err))
                }
                Err(join_err) => {
                    let message = panic_message(join_err);
                    warn!(tool = %name, state = "failed", panic = %message, "handler panicked");
                    ExecutionResult::failure(ExecutionError::internal(format!(
                        "tool '{name}' panicked: {message}"
                    )))
                }
            },
            _ = tokio::time::sleep(timeout) => {
                task.abort();
                debug!(tool = %name, state = "timed_out", deadline = ?timeout, "deadline exceeded");
                ExecutionResult::failure(timeout_error(name, timeout))
            }
            _ = cancel.cancelled() => {
                task.abort();
                debug!(tool = %name, state = "cancelled", "caller cancelled");
                ExecutionResult::failure(ExecutionError::cancelled(format!(
                    "tool '{name}' was cancelled before completion"
                )))
            }
        }
    }

    /// The cache handed to tools through their context.
    pub fn cache(&self) -> &Arc<ResourceCache> {
        &self.cache
    }

    fn unknown_tool(&self, name: &str) -> ExecutionError {
        let known = self.catalog.names().join(", ");
        ExecutionError::not_found(format!("tool '{name}' is not registered"))
            .with_recovery(
                RecoveryGuidance::new([
                    format!("available tools: {known}"),
                    "call tools/list for descriptions and input schemas".to_string(),
                ])
                .with_suggested_call("tools/list", json!({})),
            )
    }
}

fn invalid_parameters(name: &str, failures: &[String]) -> ExecutionError {
    ExecutionError::invalid_parameters(format!(
        "tool '{}' rejected the parameters: {}",
        name,
        failures.join("; ")
    ))
    .with_recovery(RecoveryGuidance::new([
        "fix every listed field and retry".to_string(),
        format!("compare the arguments against the '{name}' entry from tools/list"),
    ]))
}

fn timeout_error(name: &str, timeout: Duration) -> ExecutionError {
    ExecutionError::timeout(format!("tool '{name}' ran past its {timeout:?} deadline"))
}

fn map_tool_error(err: ToolError) -> ExecutionError {
    match err {
        ToolError::InvalidInput(msg) => ExecutionError::invalid_parameters(msg),
        ToolError::Cancelled => {
            ExecutionError::cancelled("tool stopped at the cancellation signal")
        }
        ToolError::ExecutionFailed(msg) => ExecutionError::internal(msg),
        ToolError::Other(err) => ExecutionError::internal(err.to_string()),
    }
}

fn panic_message(err: JoinError) -> String {
    if !err.is_panic() {
        return "task was aborted".to_string();
    }
    let payload = err.into_panic();
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "opaque panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ToolDescriptor;
    use crate::tool::{EchoTool, ToolHandler};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use werkbank_core::{cancel_pair, ErrorKind};

    struct SleepTool(Duration);

    #[async_trait]
    impl ToolHandler for SleepTool {
        async fn invoke(&self, params: Value, _ctx: ToolContext) -> Result<Value, ToolError> {
            tokio::time::sleep(self.0).await;
            Ok(params)
        }
    }

    struct PanicTool;

    #[async_trait]
    impl ToolHandler for PanicTool {
        async fn invoke(&self, _params: Value, _ctx: ToolContext) -> Result<Value, ToolError> {
            panic!("boom");
        }
    }

    struct FailingTool(fn() -> ToolError);

    #[async_trait]
    impl ToolHandler for FailingTool {
        async fn invoke(&self, _params: Value, _ctx: ToolContext) -> Result<Value, ToolError> {
            Err((self.0)())
        }
    }

    struct CountingTool(Arc<AtomicUsize>);

    #[async_trait]
    impl ToolHandler for CountingTool {
        async fn invoke(&self, _params: Value, _ctx: ToolContext) -> Result<Value, ToolError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(json!({"ok": true}))
        }
    }

    fn any_object() -> Value {
        json!({"type": "object"})
    }

    fn dispatcher(catalog: ToolCatalog) -> Dispatcher {
        Dispatcher::new(
            Arc::new(catalog),
            Arc::new(ResourceCache::new(Duration::from_secs(60))),
            DispatchConfig::default(),
        )
    }

    fn failure_kind(result: &ExecutionResult) -> ErrorKind {
        match result {
            ExecutionResult::Failure { error } => error.kind,
            ExecutionResult::Success { .. } => panic!("expected failure, got success"),
        }
    }

    #[tokio::test]
    async fn test_unknown_tool_is_not_found_without_invoking() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut catalog = ToolCatalog::new();
        catalog
            .register(ToolDescriptor::new(
                "counter",
                "Counts invocations",
                any_object(),
                CountingTool(Arc::clone(&calls)),
            ))
            .unwrap();

        let result = dispatcher(catalog)
            .dispatch("missing", json!({}), CancelSignal::never())
            .await;

        match result {
            ExecutionResult::Failure { error } => {
                assert_eq!(error.kind, ErrorKind::NotFound);
                let recovery = error.recovery.unwrap();
                assert_eq!(recovery.suggested_call.unwrap().tool, "tools/list");
                assert!(recovery.steps[0].contains("counter"));
            }
            other => panic!("expected NOT_FOUND, got {:?}", other),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 0, "handler must not run");
    }

    #[tokio::test]
    async fn test_validation_failures_are_aggregated() {
        let calls = Arc::new(AtomicUsize::new(0));
        let schema = json!({
            "type": "object",
            "properties": {
                "path": { "type": "string" },
                "limit": { "type": "integer" }
            },
            "required": ["path", "limit"]
        });
        let mut catalog = ToolCatalog::new();
        catalog
            .register(ToolDescriptor::new(
                "read",
                "Reads a file",
                schema,
                CountingTool(Arc::clone(&calls)),
            ))
            .unwrap();

        let result = dispatcher(catalog)
            .dispatch("read", json!({}), CancelSignal::never())
            .await;

        match result {
            ExecutionResult::Failure { error } => {
                assert_eq!(error.kind, ErrorKind::InvalidParameters);
                assert!(
                    error.message.contains("path") && error.message.contains("limit"),
                    "both failures should be reported: {}",
                    error.message
                );
            }
            other => panic!("expected INVALID_PARAMETERS, got {:?}", other),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 0, "handler must not run");
    }

    #[tokio::test]
    async fn test_success_payload_is_unchanged() {
        let mut catalog = ToolCatalog::new();
        catalog
            .register(ToolDescriptor::new(
                "echo",
                "Returns its input unchanged",
                any_object(),
                EchoTool,
            ))
            .unwrap();

        let result = dispatcher(catalog)
            .dispatch("echo", json!({"x": 1}), CancelSignal::never())
            .await;

        match result {
            ExecutionResult::Success { payload } => assert_eq!(payload, json!({"x": 1})),
            other => panic!("expected success, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_names_the_deadline() {
        let mut catalog = ToolCatalog::new();
        catalog
            .register(
                ToolDescriptor::new(
                    "slow",
                    "Sleeps for ten seconds",
                    any_object(),
                    SleepTool(Duration::from_secs(10)),
                )
                .with_timeout(Duration::from_millis(50)),
            )
            .unwrap();

        let result = dispatcher(catalog)
            .dispatch("slow", json!({}), CancelSignal::never())
            .await;

        match result {
            ExecutionResult::Failure { error } => {
                assert_eq!(error.kind, ErrorKind::Timeout);
                assert!(
                    error.message.contains("50ms"),
                    "message should carry the bound: {}",
                    error.message
                );
            }
            other => panic!("expected TIMEOUT, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_per_tool_timeout_overrides_default() {
        let mut catalog = ToolCatalog::new();
        catalog
            .register(
                ToolDescriptor::new(
                    "patient",
                    "Sleeps briefly",
                    any_object(),
                    SleepTool(Duration::from_millis(20)),
                )
                .with_timeout(Duration::from_secs(60)),
            )
            .unwrap();

        // Default deadline shorter than the sleep; the override must win.
        let dispatcher = Dispatcher::new(
            Arc::new(catalog),
            Arc::new(ResourceCache::new(Duration::from_secs(60))),
            DispatchConfig {
                default_timeout: Duration::from_millis(5),
            },
        );

        let result = dispatcher
            .dispatch("patient", json!({}), CancelSignal::never())
            .await;
        assert!(result.is_success(), "override deadline should apply");
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_resolves_dispatch() {
        let mut catalog = ToolCatalog::new();
        catalog
            .register(ToolDescriptor::new(
                "slow",
                "Sleeps for ten seconds",
                any_object(),
                SleepTool(Duration::from_secs(10)),
            ))
            .unwrap();

        let (handle, signal) = cancel_pair();
        handle.cancel();

        let result = dispatcher(catalog).dispatch("slow", json!({}), signal).await;
        assert_eq!(failure_kind(&result), ErrorKind::OperationCancelled);
    }

    #[tokio::test]
    async fn test_panic_is_contained_and_reported() {
        let mut catalog = ToolCatalog::new();
        catalog
            .register(ToolDescriptor::new(
                "bomb",
                "Panics on invocation",
                any_object(),
                PanicTool,
            ))
            .unwrap();
        catalog
            .register(ToolDescriptor::new(
                "echo",
                "Returns its input unchanged",
                any_object(),
                EchoTool,
            ))
            .unwrap();
        let dispatcher = dispatcher(catalog);

        let result = dispatcher
            .dispatch("bomb", json!({}), CancelSignal::never())
            .await;
        match result {
            ExecutionResult::Failure { error } => {
                assert_eq!(error.kind, ErrorKind::InternalError);
                assert!(
                    error.message.contains("boom"),
                    "panic message should survive: {}",
                    error.message
                );
            }
            other => panic!("expected INTERNAL_ERROR, got {:?}", other),
        }

        // The dispatcher keeps working after a handler fault.
        let next = dispatcher
            .dispatch("echo", json!({"still": "alive"}), CancelSignal::never())
            .await;
        assert!(next.is_success());
    }

    #[tokio::test]
    async fn test_tool_error_mapping() {
        let mut catalog = ToolCatalog::new();
        catalog
            .register(ToolDescriptor::new(
                "bad-input",
                "Rejects its input",
                any_object(),
                FailingTool(|| ToolError::InvalidInput("path does not exist".into())),
            ))
            .unwrap();
        catalog
            .register(ToolDescriptor::new(
                "broken",
                "Always fails",
                any_object(),
                FailingTool(|| ToolError::ExecutionFailed("upstream returned 502".into())),
            ))
            .unwrap();
        catalog
            .register(ToolDescriptor::new(
                "quitter",
                "Stops at the cancellation signal",
                any_object(),
                FailingTool(|| ToolError::Cancelled),
            ))
            .unwrap();
        let dispatcher = dispatcher(catalog);

        let result = dispatcher
            .dispatch("bad-input", json!({}), CancelSignal::never())
            .await;
        assert_eq!(failure_kind(&result), ErrorKind::InvalidParameters);

        let result = dispatcher
            .dispatch("broken", json!({}), CancelSignal::never())
            .await;
        assert_eq!(failure_kind(&result), ErrorKind::InternalError);

        let result = dispatcher
            .dispatch("quitter", json!({}), CancelSignal::never())
            .await;
        assert_eq!(failure_kind(&result), ErrorKind::OperationCancelled);
    }
}
