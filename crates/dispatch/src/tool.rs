use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use werkbank_core::CancelSignal;

use crate::cache::ResourceCache;

/// Errors a tool can return from [`ToolHandler::invoke`].
///
/// The dispatcher maps these onto the wire-level error taxonomy, so
/// handlers never build JSON-RPC errors themselves.
#[derive(Debug, Error)]
pub enum ToolError {
    /// The parameters passed schema validation but are still unusable.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The tool ran but could not produce a result.
    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    /// The tool observed the cancellation signal and stopped early.
    #[error("Execution cancelled")]
    Cancelled,

    /// Anything else a handler's dependencies can throw.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Per-invocation context handed to every tool.
#[derive(Clone)]
pub struct ToolContext {
    /// Fires when the caller cancels the request or the server shuts down.
    /// Long-running tools should check it between units of work.
    pub cancel: CancelSignal,
    /// Shared cache for expensive lookups, keyed by URI.
    pub cache: Arc<ResourceCache>,
}

impl ToolContext {
    pub fn new(cancel: CancelSignal, cache: Arc<ResourceCache>) -> Self {
        Self { cancel, cache }
    }
}

/// Core trait implemented by all tools.
///
/// Parameters arrive already validated against the tool's input schema.
/// Implementations must be `Send + Sync` since invocations run on their
/// own tokio task.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Execute the tool and produce a JSON result.
    async fn invoke(&self, params: Value, ctx: ToolContext) -> Result<Value, ToolError>;
}

/// Built-in tool that returns its parameters unchanged.
///
/// Registered by the server binary; handy for wiring checks and used
/// throughout the integration tests.
pub struct EchoTool;

#[async_trait]
impl ToolHandler for EchoTool {
    async fn invoke(&self, params: Value, _ctx: ToolContext) -> Result<Value, ToolError> {
        Ok(params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    fn ctx() -> ToolContext {
        ToolContext::new(
            CancelSignal::never(),
            Arc::new(ResourceCache::new(Duration::from_secs(60))),
        )
    }

    #[tokio::test]
    async fn test_echo_returns_input_unchanged() {
        let result = EchoTool.invoke(json!({"x": 1}), ctx()).await;
        assert_eq!(result.unwrap(), json!({"x": 1}));
    }

    #[test]
    fn test_tool_error_messages() {
        let err = ToolError::InvalidInput("missing field 'path'".into());
        assert_eq!(err.to_string(), "Invalid input: missing field 'path'");
        let err = ToolError::ExecutionFailed("upstream returned 502".into());
        assert_eq!(err.to_string(), "Execution failed: upstream returned 502");
    }
}
