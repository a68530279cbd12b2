//! Tool catalog and dispatch.
//!
//! Tools implement [`ToolHandler`] and register in a [`ToolCatalog`]
//! together with a JSON Schema for their parameters. The [`Dispatcher`]
//! looks a tool up, validates the parameters, and runs the handler in
//! its own task with a deadline and a cancellation signal, so a slow or
//! panicking tool can never take the message loop with it.

pub mod cache;
pub mod catalog;
pub mod dispatcher;
pub mod tool;
pub mod validation;

pub use cache::{CacheStats, ResourceCache};
pub use catalog::{CatalogError, ToolCatalog, ToolDescriptor, ToolSummary};
pub use dispatcher::{DispatchConfig, Dispatcher};
pub use tool::{EchoTool, ToolContext, ToolError, ToolHandler};
pub use validation::ParamValidator;
