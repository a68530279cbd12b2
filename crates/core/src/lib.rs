//! Shared types for the werkbank tool-server runtime.
//!
//! The wire envelope (JSON-RPC 2.0 plus the transport frame wrapper),
//! the error taxonomy with recovery guidance, the cancellation
//! primitive, and environment-based configuration.

pub mod cancel;
pub mod config;
pub mod error;
pub mod wire;

pub use cancel::{cancel_pair, CancelHandle, CancelSignal};
pub use config::Config;
pub use error::{ErrorKind, ExecutionError, ExecutionResult, RecoveryGuidance, SuggestedCall};
pub use wire::{
    error_codes, RpcError, RpcId, RpcNotification, RpcRequest, RpcResponse, TransportMessage,
};
