//! AI-provider contract.
//!
//! The core never implements a provider; it only consumes this narrow
//! surface. From a structured response it reads the `route`, `step` and
//! `tool_calls` fields to drive transitions, nothing else. Retries and
//! model fallback are the provider's own business.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::message::ChatMessage;

#[derive(Debug, Clone, Default)]
pub struct GenerateRequest {
    pub system: Option<String>,
    pub history: Vec<ChatMessage>,
    pub output_schema: Option<Value>,
}

impl GenerateRequest {
    pub fn new(history: Vec<ChatMessage>) -> Self {
        Self {
            system: None,
            history,
            output_schema: None,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_output_schema(mut self, schema: Value) -> Self {
        self.output_schema = Some(schema);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub tool_id: String,
    #[serde(default)]
    pub args: Value,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderResponse {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub structured: Option<Value>,
    #[serde(default)]
    pub tool_calls: Vec<ToolCallRequest>,
}

impl ProviderResponse {
    pub fn text(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            structured: None,
            tool_calls: Vec::new(),
        }
    }

    pub fn with_structured(mut self, structured: Value) -> Self {
        self.structured = Some(structured);
        self
    }

    pub fn with_tool_call(mut self, tool_id: impl Into<String>, args: Value) -> Self {
        self.tool_calls.push(ToolCallRequest {
            tool_id: tool_id.into(),
            args,
        });
        self
    }

    /// Route title the provider asked to switch to, if any.
    pub fn route_hint(&self) -> Option<&str> {
        self.structured.as_ref()?.get("route")?.as_str()
    }

    /// Step id the provider asked to move to, if any.
    pub fn step_hint(&self) -> Option<&str> {
        self.structured.as_ref()?.get("step")?.as_str()
    }
}

#[async_trait]
pub trait Provider: Send + Sync {
    async fn generate(&self, request: GenerateRequest) -> Result<ProviderResponse>;

    fn name(&self) -> &str {
        "provider"
    }
}
