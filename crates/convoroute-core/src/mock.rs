//! Mock provider for tests.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::error::{FlowError, Result};
use crate::traits::provider::{GenerateRequest, Provider, ProviderResponse};

/// Queued-response provider with call history, for exercising the engine
/// without a real model behind it.
#[derive(Clone)]
pub struct MockProvider {
    inner: Arc<RwLock<MockProviderInner>>,
}

struct MockProviderInner {
    responses: Vec<ProviderResponse>,
    response_index: usize,
    cycle_responses: bool,
    call_history: Vec<GenerateRequest>,
    should_error: bool,
    error_message: String,
}

impl MockProvider {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(MockProviderInner {
                responses: Vec::new(),
                response_index: 0,
                cycle_responses: false,
                call_history: Vec::new(),
                should_error: false,
                error_message: "Mock error".to_string(),
            })),
        }
    }

    pub fn add_response(&self, response: ProviderResponse) {
        self.inner.write().responses.push(response);
    }

    pub fn set_responses(&self, responses: Vec<ProviderResponse>, cycle: bool) {
        let mut inner = self.inner.write();
        inner.responses = responses;
        inner.response_index = 0;
        inner.cycle_responses = cycle;
    }

    pub fn set_error(&self, message: impl Into<String>) {
        let mut inner = self.inner.write();
        inner.should_error = true;
        inner.error_message = message.into();
    }

    pub fn clear_error(&self) {
        self.inner.write().should_error = false;
    }

    pub fn call_count(&self) -> usize {
        self.inner.read().call_history.len()
    }

    pub fn last_call(&self) -> Option<GenerateRequest> {
        self.inner.read().call_history.last().cloned()
    }

    fn next_response(&self) -> ProviderResponse {
        let mut inner = self.inner.write();
        if inner.responses.is_empty() {
            return ProviderResponse::text("Mock response");
        }
        let response = inner.responses[inner.response_index].clone();
        if inner.cycle_responses {
            inner.response_index = (inner.response_index + 1) % inner.responses.len();
        } else if inner.response_index < inner.responses.len() - 1 {
            inner.response_index += 1;
        }
        response
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Provider for MockProvider {
    async fn generate(&self, request: GenerateRequest) -> Result<ProviderResponse> {
        self.inner.write().call_history.push(request);
        let (should_error, message) = {
            let inner = self.inner.read();
            (inner.should_error, inner.error_message.clone())
        };
        if should_error {
            return Err(FlowError::Provider(message));
        }
        Ok(self.next_response())
    }

    fn name(&self) -> &str {
        "mock"
    }
}
