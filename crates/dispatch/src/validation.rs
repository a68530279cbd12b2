//! JSON Schema validation for tool parameters.

use jsonschema::{Draft, Validator};
use serde_json::Value;

/// A tool's input schema, compiled once at registration.
pub struct ParamValidator {
    schema: Validator,
}

impl ParamValidator {
    /// Compile a JSON Schema under draft 2020-12.
    pub fn compile(schema: &Value) -> Result<Self, String> {
        let compiled = jsonschema::options()
            .with_draft(Draft::Draft202012)
            .build(schema)
            .map_err(|err| err.to_string())?;
        Ok(Self { schema: compiled })
    }

    /// Check params against the schema, collecting every failure
    /// instead of stopping at the first. Each message names the
    /// offending path where one exists.
    pub fn check(&self, params: &Value) -> Vec<String> {
        self.schema
            .iter_errors(params)
            .map(|err| {
                let path = err.instance_path().to_string();
                if path.is_empty() {
                    err.to_string()
                } else {
                    format!("{path}: {err}")
                }
            })
            .collect()
    }

    pub fn is_valid(&self, params: &Value) -> bool {
        self.schema.is_valid(params)
    }
}
