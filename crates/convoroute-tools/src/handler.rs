//! Tool handler contract and execution result types.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ToolError;

/// Everything a handler gets to see for one call: its arguments plus
/// read-only views of the session's collected data and the caller-owned
/// agent context.
#[derive(Debug, Clone, Default)]
pub struct ToolInvocation {
    pub tool_id: String,
    pub args: Value,
    pub data: HashMap<String, Value>,
    pub context: HashMap<String, Value>,
    pub session_id: Option<String>,
}

impl ToolInvocation {
    pub fn new(tool_id: impl Into<String>, args: Value) -> Self {
        Self {
            tool_id: tool_id.into(),
            args,
            data: HashMap::new(),
            context: HashMap::new(),
            session_id: None,
        }
    }

    pub fn with_data(mut self, data: HashMap<String, Value>) -> Self {
        self.data = data;
        self
    }

    pub fn with_context(mut self, context: HashMap<String, Value>) -> Self {
        self.context = context;
        self
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }
}

/// What a handler may produce: a payload for the transcript, a patch for the
/// session's collected data, a patch for the agent context, or any mix.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolOutput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_update: Option<HashMap<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_update: Option<HashMap<String, Value>>,
}

impl ToolOutput {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn data(value: Value) -> Self {
        Self {
            data: Some(value),
            ..Default::default()
        }
    }

    pub fn with_data_update(mut self, update: HashMap<String, Value>) -> Self {
        self.data_update = Some(update);
        self
    }

    pub fn with_context_update(mut self, update: HashMap<String, Value>) -> Self {
        self.context_update = Some(update);
        self
    }
}

/// A bare value from a handler means "this is the payload".
impl From<Value> for ToolOutput {
    fn from(value: Value) -> Self {
        ToolOutput::data(value)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_used: Option<String>,
    pub attempts: u32,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolExecution {
    pub success: bool,
    pub output: ToolOutput,
    pub metadata: ExecutionMetadata,
}

#[async_trait]
pub trait ToolHandler: Send + Sync {
    fn id(&self) -> &str;

    fn description(&self) -> &str {
        ""
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({"type": "object"})
    }

    async fn call(&self, invocation: ToolInvocation) -> Result<ToolOutput, ToolError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_primitive_becomes_data() {
        let output = ToolOutput::from(json!(42));
        assert_eq!(output.data, Some(json!(42)));
        assert!(output.data_update.is_none());
        assert!(output.context_update.is_none());
    }

    #[test]
    fn test_output_serde_skips_empty() {
        let json = serde_json::to_value(ToolOutput::empty()).unwrap();
        assert_eq!(json, serde_json::json!({}));
    }
}
