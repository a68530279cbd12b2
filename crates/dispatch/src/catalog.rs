use std::sync::Arc;
use std::time::Duration;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::tool::ToolHandler;
use crate::validation::ParamValidator;

/// Errors raised while registering tools.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Tool with name '{0}' is already registered")]
    DuplicateName(String),

    #[error("Tool '{name}' has an invalid input schema: {reason}")]
    InvalidSchema { name: String, reason: String },
}

/// Everything the catalog knows about one tool: metadata for listing,
/// the input schema, an optional execution deadline, and the handler.
pub struct ToolDescriptor {
    pub name: String,
    pub category: String,
    pub description: String,
    pub input_schema: Value,
    pub output_schema: Option<Value>,
    /// Overrides the configured default deadline for this tool.
    pub timeout: Option<Duration>,
    handler: Arc<dyn ToolHandler>,
}

impl ToolDescriptor {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: Value,
        handler: impl ToolHandler + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            category: "general".to_string(),
            description: description.into(),
            input_schema,
            output_schema: None,
            timeout: None,
            handler: Arc::new(handler),
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn with_output_schema(mut self, schema: Value) -> Self {
        self.output_schema = Some(schema);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn handler(&self) -> Arc<dyn ToolHandler> {
        Arc::clone(&self.handler)
    }
}

/// Wire-facing description of a registered tool, MCP field casing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolSummary {
    pub name: String,
    pub category: String,
    pub description: String,
    pub input_schema: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<Value>,
}

pub(crate) struct RegisteredTool {
    pub(crate) descriptor: ToolDescriptor,
    pub(crate) validator: ParamValidator,
}

/// Registry of available tools, in registration order.
///
/// Populated at startup and read-only afterwards; shared behind an
/// `Arc` with no further locking.
#[derive(Default)]
pub struct ToolCatalog {
    tools: IndexMap<String, RegisteredTool>,
}

impl ToolCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool, compiling its input schema. Fails on a
    /// duplicate name or a schema that does not compile.
    pub fn register(&mut self, descriptor: ToolDescriptor) -> Result<(), CatalogError> {
        if self.tools.contains_key(&descriptor.name) {
            return Err(CatalogError::DuplicateName(descriptor.name));
        }
        let validator =
            ParamValidator::compile(&descriptor.input_schema).map_err(|reason| {
                CatalogError::InvalidSchema {
                    name: descriptor.name.clone(),
                    reason,
                }
            })?;
        self.tools.insert(
            descriptor.name.clone(),
            RegisteredTool {
                descriptor,
                validator,
            },
        );
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&ToolDescriptor> {
        self.tools.get(name).map(|tool| &tool.descriptor)
    }

    pub(crate) fn entry(&self, name: &str) -> Option<&RegisteredTool> {
        self.tools.get(name)
    }

    /// Summaries of every tool, in registration order.
    pub fn list(&self) -> Vec<ToolSummary> {
        self.tools
            .values()
            .map(|tool| ToolSummary {
                name: tool.descriptor.name.clone(),
                category: tool.descriptor.category.clone(),
                description: tool.descriptor.description.clone(),
                input_schema: tool.descriptor.input_schema.clone(),
                output_schema: tool.descriptor.output_schema.clone(),
            })
            .collect()
    }

    /// Registered tool names, in registration order.
    pub fn names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
