//! Agent-facing tool server.
//!
//! Wires one transport binding to the tool catalog: inbound frames
//! become tool dispatches, cancellation notifications abort in-flight
//! work, and response frames resolve requests the server itself sent.
//! Successful payloads are shaped to the caller's token budget before
//! they go back out.
//!
//! # Architecture
//!
//! - **protocol**: handshake and method payload types (`initialize`,
//!   `tools/list`, `tools/call`, `notifications/cancelled`)
//! - **server**: the message pump over a [`werkbank_transport::Transport`]
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use werkbank_core::config::BudgetConfig;
//! use werkbank_dispatch::{
//!     DispatchConfig, Dispatcher, EchoTool, ResourceCache, ToolCatalog, ToolDescriptor,
//! };
//! use werkbank_server::Server;
//! use werkbank_transport::StdioTransport;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let mut catalog = ToolCatalog::new();
//! catalog.register(ToolDescriptor::new(
//!     "echo",
//!     "Returns its arguments unchanged",
//!     serde_json::json!({"type": "object"}),
//!     EchoTool,
//! ))?;
//! let catalog = Arc::new(catalog);
//! let dispatcher = Arc::new(Dispatcher::new(
//!     Arc::clone(&catalog),
//!     Arc::new(ResourceCache::new(Duration::from_secs(300))),
//!     DispatchConfig::default(),
//! ));
//! let server = Server::new(
//!     Arc::new(StdioTransport::new()),
//!     catalog,
//!     dispatcher,
//!     BudgetConfig::default(),
//! );
//! server.run().await?;
//! # Ok(())
//! # }
//! ```

pub mod protocol;
pub mod server;

pub use protocol::{
    CallToolParams, CancelledParams, InitializeResult, ListToolsResult, ServerCapabilities,
    ServerInfo, ToolsCapability,
};
pub use server::Server;
