//! Tool system for the Convoroute framework

mod handler;
mod manager;
pub mod patterns;

pub use handler::{ExecutionMetadata, ToolExecution, ToolHandler, ToolInvocation, ToolOutput};
pub use manager::{Backoff, ExecutionOptions, ToolManager};

use std::sync::OnceLock;

use regex::Regex;
use schemars::JsonSchema;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Invalid tool definition: {0}")]
    InvalidDefinition(String),

    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Tool already registered: {0}")]
    AlreadyRegistered(String),

    #[error("Tool execution failed: {0}")]
    Failed(String),

    #[error("Tool timed out after {0}ms")]
    Timeout(u64),

    /// Terminal execution failure after retries and fallbacks, carrying the
    /// invocation context and the causing error.
    #[error("Tool '{tool_id}' failed: {source}")]
    Execution {
        tool_id: String,
        context: ExecutionContext,
        #[source]
        source: Box<ToolError>,
    },
}

/// Where and with what a failed execution was attempted.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub args: Value,
    pub session_id: Option<String>,
}

static TOOL_ID_PATTERN: OnceLock<Regex> = OnceLock::new();

/// Tool ids are non-empty, alphanumeric plus `-`, `_`, `.` and `:`.
pub(crate) fn validate_tool_id(id: &str) -> Result<(), ToolError> {
    let pattern = TOOL_ID_PATTERN
        .get_or_init(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.:-]*$").expect("pattern is valid"));
    if pattern.is_match(id) {
        Ok(())
    } else {
        Err(ToolError::InvalidDefinition(format!(
            "tool id '{id}' must be non-empty alphanumeric plus -_.: separators"
        )))
    }
}

pub fn generate_schema<T: JsonSchema>() -> Value {
    let schema = schemars::schema_for!(T);
    serde_json::to_value(schema).unwrap_or_else(|_| serde_json::json!({}))
}

impl From<ToolError> for convoroute_core::FlowError {
    fn from(error: ToolError) -> Self {
        convoroute_core::FlowError::Tool(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use schemars::JsonSchema;
    use serde::Deserialize;

    #[test]
    fn test_tool_id_validation() {
        assert!(validate_tool_id("lookup").is_ok());
        assert!(validate_tool_id("crm.lookup-v2:beta").is_ok());
        assert!(validate_tool_id("").is_err());
        assert!(validate_tool_id("has space").is_err());
        assert!(validate_tool_id("-leading").is_err());
    }

    #[test]
    fn test_generate_schema() {
        #[derive(Deserialize, JsonSchema)]
        #[allow(dead_code)]
        struct LookupArgs {
            email: String,
            depth: Option<u32>,
        }

        let schema = generate_schema::<LookupArgs>();
        assert!(schema.get("properties").is_some());
        assert!(schema["properties"].get("email").is_some());
    }
}
