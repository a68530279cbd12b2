//! Error taxonomy for dispatch and correlation outcomes.
//!
//! Every failure a caller can see is one of six [`ErrorKind`]s with a
//! stable label and JSON-RPC code. Where feasible an error also carries
//! [`RecoveryGuidance`]: ordered remediation steps and a suggested
//! follow-up call, so an agent can self-correct without reading logs.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::wire::{error_codes, RpcError, RpcId, RpcResponse};

/// Classification of a failed dispatch or correlation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// Unknown tool or method name.
    NotFound,
    /// Parameter validation failed (all failures aggregated).
    InvalidParameters,
    /// Handler or correlation deadline exceeded.
    Timeout,
    /// Explicitly cancelled by the caller or by shutdown.
    OperationCancelled,
    /// Uncaught handler fault.
    InternalError,
    /// Token budget could not be satisfied even at the reduction floor.
    ResourceLimitExceeded,
}

impl ErrorKind {
    /// Stable machine-readable label.
    pub fn label(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::InvalidParameters => "INVALID_PARAMETERS",
            ErrorKind::Timeout => "TIMEOUT",
            ErrorKind::OperationCancelled => "OPERATION_CANCELLED",
            ErrorKind::InternalError => "INTERNAL_ERROR",
            ErrorKind::ResourceLimitExceeded => "RESOURCE_LIMIT_EXCEEDED",
        }
    }

    /// JSON-RPC error code for this kind.
    pub fn rpc_code(&self) -> i64 {
        match self {
            ErrorKind::NotFound => error_codes::METHOD_NOT_FOUND,
            ErrorKind::InvalidParameters => error_codes::INVALID_PARAMS,
            ErrorKind::Timeout => error_codes::TIMEOUT,
            ErrorKind::OperationCancelled => error_codes::CANCELLED,
            ErrorKind::InternalError => error_codes::INTERNAL_ERROR,
            ErrorKind::ResourceLimitExceeded => error_codes::RESOURCE_LIMIT,
        }
    }
}

/// Structured self-correction hints attached to an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryGuidance {
    /// Ordered remediation steps, most promising first.
    pub steps: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_call: Option<SuggestedCall>,
}

/// A concrete follow-up call the caller can make verbatim.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuggestedCall {
    pub tool: String,
    pub arguments: Value,
}

impl RecoveryGuidance {
    pub fn new(steps: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            steps: steps.into_iter().map(Into::into).collect(),
            suggested_call: None,
        }
    }

    pub fn with_suggested_call(mut self, tool: impl Into<String>, arguments: Value) -> Self {
        self.suggested_call = Some(SuggestedCall {
            tool: tool.into(),
            arguments,
        });
        self
    }
}

/// A classified failure from dispatch, correlation, or shaping.
#[derive(Debug, Clone, thiserror::Error, Serialize, Deserialize)]
#[error("{}: {}", .kind.label(), .message)]
pub struct ExecutionError {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recovery: Option<RecoveryGuidance>,
}

impl ExecutionError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            recovery: None,
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn invalid_parameters(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidParameters, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message)
    }

    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::OperationCancelled, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InternalError, message)
    }

    pub fn resource_limit(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ResourceLimitExceeded, message)
    }

    pub fn with_recovery(mut self, recovery: RecoveryGuidance) -> Self {
        self.recovery = Some(recovery);
        self
    }

    /// Convert to the wire-level JSON-RPC error object.
    pub fn to_rpc_error(&self) -> RpcError {
        RpcError {
            code: self.kind.rpc_code(),
            message: format!("{}: {}", self.kind.label(), self.message),
            recovery: self.recovery.clone(),
        }
    }
}

/// Outcome of one dispatch. Produced once, never mutated after return.
#[derive(Debug, Clone)]
pub enum ExecutionResult {
    Success { payload: Value },
    Failure { error: ExecutionError },
}

impl ExecutionResult {
    pub fn success(payload: Value) -> Self {
        Self::Success { payload }
    }

    pub fn failure(error: ExecutionError) -> Self {
        Self::Failure { error }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Wrap into a JSON-RPC response for the given request id.
    pub fn into_response(self, id: RpcId) -> RpcResponse {
        match self {
            Self::Success { payload } => RpcResponse::success(id, payload),
            Self::Failure { error } => RpcResponse::error(id, error.to_rpc_error()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_labels_and_codes() {
        assert_eq!(ErrorKind::NotFound.label(), "NOT_FOUND");
        assert_eq!(ErrorKind::NotFound.rpc_code(), -32601);
        assert_eq!(ErrorKind::InvalidParameters.rpc_code(), -32602);
        assert_eq!(ErrorKind::Timeout.rpc_code(), -32001);
        assert_eq!(ErrorKind::OperationCancelled.rpc_code(), -32002);
        assert_eq!(ErrorKind::InternalError.rpc_code(), -32603);
        assert_eq!(ErrorKind::ResourceLimitExceeded.rpc_code(), -32003);
    }

    #[test]
    fn test_execution_error_display() {
        let err = ExecutionError::not_found("tool 'nope' is not registered");
        assert_eq!(err.to_string(), "NOT_FOUND: tool 'nope' is not registered");
    }

    #[test]
    fn test_recovery_guidance_on_wire() {
        let err = ExecutionError::not_found("tool 'nope' is not registered").with_recovery(
            RecoveryGuidance::new(["list the available tools", "check the tool name spelling"])
                .with_suggested_call("tools/list", serde_json::json!({})),
        );
        let rpc = err.to_rpc_error();
        assert_eq!(rpc.code, -32601);
        let recovery = rpc.recovery.unwrap();
        assert_eq!(recovery.steps.len(), 2);
        assert_eq!(recovery.suggested_call.unwrap().tool, "tools/list");
    }

    #[test]
    fn test_execution_result_into_response() {
        let ok = ExecutionResult::success(serde_json::json!({"x": 1}));
        let resp = ok.into_response(RpcId::Number(5));
        assert_eq!(resp.result, Some(serde_json::json!({"x": 1})));

        let failed = ExecutionResult::failure(ExecutionError::timeout("tool ran past 30s"));
        let resp = failed.into_response(RpcId::Number(6));
        let err = resp.error.unwrap();
        assert_eq!(err.code, -32001);
        assert!(err.message.contains("TIMEOUT"));
    }
}
