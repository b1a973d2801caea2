//! Convenience factories for the common handler shapes.
//!
//! Each wraps one user function into a `ToolHandler`; none of them add
//! behavior beyond the standard output shape.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;

use crate::handler::{ToolHandler, ToolInvocation, ToolOutput};
use crate::ToolError;

struct ValidationTool<F> {
    id: String,
    description: String,
    check: F,
}

#[async_trait]
impl<F> ToolHandler for ValidationTool<F>
where
    F: Fn(&Value) -> Result<bool, String> + Send + Sync,
{
    fn id(&self) -> &str {
        &self.id
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn call(&self, invocation: ToolInvocation) -> Result<ToolOutput, ToolError> {
        let valid = (self.check)(&invocation.args).map_err(ToolError::Failed)?;
        Ok(ToolOutput::data(json!({ "valid": valid })))
    }
}

/// Validation tool: the function judges the arguments, the output carries
/// `{"valid": bool}`.
pub fn validation<F>(
    id: impl Into<String>,
    description: impl Into<String>,
    check: F,
) -> Arc<dyn ToolHandler>
where
    F: Fn(&Value) -> Result<bool, String> + Send + Sync + 'static,
{
    Arc::new(ValidationTool {
        id: id.into(),
        description: description.into(),
        check,
    })
}

struct ComputationTool<F> {
    id: String,
    description: String,
    compute: F,
}

#[async_trait]
impl<F> ToolHandler for ComputationTool<F>
where
    F: Fn(&Value) -> Result<Value, String> + Send + Sync,
{
    fn id(&self) -> &str {
        &self.id
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn call(&self, invocation: ToolInvocation) -> Result<ToolOutput, ToolError> {
        let value = (self.compute)(&invocation.args).map_err(ToolError::Failed)?;
        Ok(ToolOutput::from(value))
    }
}

/// Pure computation over the arguments; the result is the payload.
pub fn computation<F>(
    id: impl Into<String>,
    description: impl Into<String>,
    compute: F,
) -> Arc<dyn ToolHandler>
where
    F: Fn(&Value) -> Result<Value, String> + Send + Sync + 'static,
{
    Arc::new(ComputationTool {
        id: id.into(),
        description: description.into(),
        compute,
    })
}

struct DataEnrichmentTool<F> {
    id: String,
    description: String,
    enrich: F,
}

#[async_trait]
impl<F, Fut> ToolHandler for DataEnrichmentTool<F>
where
    F: Fn(ToolInvocation) -> Fut + Send + Sync,
    Fut: Future<Output = Result<HashMap<String, Value>, String>> + Send,
{
    fn id(&self) -> &str {
        &self.id
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn call(&self, invocation: ToolInvocation) -> Result<ToolOutput, ToolError> {
        let update = (self.enrich)(invocation).await.map_err(ToolError::Failed)?;
        Ok(ToolOutput::empty().with_data_update(update))
    }
}

/// Enrichment tool: the function produces a patch that the engine merges
/// into the session's collected data.
pub fn data_enrichment<F, Fut>(
    id: impl Into<String>,
    description: impl Into<String>,
    enrich: F,
) -> Arc<dyn ToolHandler>
where
    F: Fn(ToolInvocation) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<HashMap<String, Value>, String>> + Send + 'static,
{
    Arc::new(DataEnrichmentTool {
        id: id.into(),
        description: description.into(),
        enrich,
    })
}

struct ApiCallTool<F> {
    id: String,
    description: String,
    call_fn: F,
}

#[async_trait]
impl<F, Fut> ToolHandler for ApiCallTool<F>
where
    F: Fn(ToolInvocation) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, String>> + Send,
{
    fn id(&self) -> &str {
        &self.id
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn call(&self, invocation: ToolInvocation) -> Result<ToolOutput, ToolError> {
        let value = (self.call_fn)(invocation).await.map_err(ToolError::Failed)?;
        Ok(ToolOutput::from(value))
    }
}

/// Remote-call tool: the async function owns the transport, the manager
/// still owns timeout/retry/fallback around it.
pub fn api_call<F, Fut>(
    id: impl Into<String>,
    description: impl Into<String>,
    call_fn: F,
) -> Arc<dyn ToolHandler>
where
    F: Fn(ToolInvocation) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, String>> + Send + 'static,
{
    Arc::new(ApiCallTool {
        id: id.into(),
        description: description.into(),
        call_fn,
    })
}
