//! Tool manager: registry plus execution wrapping.
//!
//! Execution wraps every call with a timeout, retries transient failures
//! with configurable backoff, and walks an ordered fallback chain when the
//! primary tool is unresolved or exhausts its retries. Step-attached
//! (scoped) handlers shadow registry handlers of the same id.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;

use crate::handler::{ExecutionMetadata, ToolExecution, ToolHandler, ToolInvocation, ToolOutput};
use crate::{validate_tool_id, ExecutionContext, ToolError};

#[derive(Debug, Clone)]
pub enum Backoff {
    Fixed {
        delay_ms: u64,
    },
    Linear {
        initial_ms: u64,
    },
    Exponential {
        initial_ms: u64,
        multiplier: f64,
        max_ms: u64,
    },
}

impl Backoff {
    fn delay(&self, attempt: u32) -> Duration {
        let ms = match self {
            Backoff::Fixed { delay_ms } => *delay_ms as f64,
            Backoff::Linear { initial_ms } => *initial_ms as f64 * attempt as f64,
            Backoff::Exponential {
                initial_ms,
                multiplier,
                max_ms,
            } => (*initial_ms as f64 * multiplier.powi(attempt as i32 - 1)).min(*max_ms as f64),
        };
        Duration::from_millis(ms as u64)
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Backoff::Fixed { delay_ms: 200 }
    }
}

#[derive(Debug, Clone)]
pub struct ExecutionOptions {
    pub timeout: Duration,
    /// Retries after the first attempt, for transient failures only.
    pub max_retries: u32,
    pub backoff: Backoff,
    pub fallback_tools: Vec<String>,
}

impl Default for ExecutionOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_retries: 2,
            backoff: Backoff::default(),
            fallback_tools: Vec::new(),
        }
    }
}

impl ExecutionOptions {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_fallbacks<I, S>(mut self, fallbacks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fallback_tools = fallbacks.into_iter().map(Into::into).collect();
        self
    }
}

pub struct ToolManager {
    tools: RwLock<HashMap<String, Arc<dyn ToolHandler>>>,
    defaults: ExecutionOptions,
}

impl ToolManager {
    pub fn new() -> Self {
        Self {
            tools: RwLock::new(HashMap::new()),
            defaults: ExecutionOptions::default(),
        }
    }

    pub fn with_defaults(defaults: ExecutionOptions) -> Self {
        Self {
            tools: RwLock::new(HashMap::new()),
            defaults,
        }
    }

    pub fn register(&self, tool: Arc<dyn ToolHandler>) -> Result<(), ToolError> {
        let id = tool.id().to_string();
        validate_tool_id(&id)?;
        let mut tools = self.tools.write();
        if tools.contains_key(&id) {
            return Err(ToolError::AlreadyRegistered(id));
        }
        tools.insert(id, tool);
        Ok(())
    }

    pub fn register_many<I>(&self, tools: I) -> Result<(), ToolError>
    where
        I: IntoIterator<Item = Arc<dyn ToolHandler>>,
    {
        for tool in tools {
            self.register(tool)?;
        }
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn ToolHandler>> {
        self.tools.read().get(id).cloned()
    }

    pub fn list_ids(&self) -> Vec<String> {
        self.tools.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.tools.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.read().is_empty()
    }

    pub fn defaults(&self) -> &ExecutionOptions {
        &self.defaults
    }

    pub async fn execute(&self, invocation: ToolInvocation) -> Result<ToolExecution, ToolError> {
        self.execute_with(invocation, None, &[]).await
    }

    /// Execute with explicit options and step-attached handlers. The primary
    /// tool runs first; each fallback gets the same retry budget in turn.
    pub async fn execute_with(
        &self,
        invocation: ToolInvocation,
        options: Option<&ExecutionOptions>,
        scoped: &[Arc<dyn ToolHandler>],
    ) -> Result<ToolExecution, ToolError> {
        let options = options.unwrap_or(&self.defaults);
        let primary = invocation.tool_id.clone();
        let mut candidates = vec![primary.clone()];
        candidates.extend(options.fallback_tools.iter().cloned());

        let started = Instant::now();
        let mut attempts = 0u32;
        let mut last_error: Option<ToolError> = None;

        for candidate in &candidates {
            let Some(handler) = self.resolve(candidate, scoped) else {
                tracing::debug!(tool = %candidate, "tool unresolved, trying next candidate");
                last_error = Some(ToolError::NotFound(candidate.clone()));
                continue;
            };
            match self
                .run_with_retries(&handler, candidate, &invocation, options, &mut attempts)
                .await
            {
                Ok(output) => {
                    let fallback_used = (candidate != &primary).then(|| candidate.clone());
                    if let Some(fallback) = &fallback_used {
                        tracing::debug!(primary = %primary, fallback = %fallback, "fallback tool succeeded");
                    }
                    return Ok(ToolExecution {
                        success: true,
                        output,
                        metadata: ExecutionMetadata {
                            fallback_used,
                            attempts,
                            duration_ms: started.elapsed().as_millis() as u64,
                        },
                    });
                }
                Err(error) => {
                    tracing::warn!(tool = %candidate, %error, "tool candidate exhausted");
                    last_error = Some(error);
                }
            }
        }

        Err(ToolError::Execution {
            tool_id: primary.clone(),
            context: ExecutionContext {
                args: invocation.args.clone(),
                session_id: invocation.session_id.clone(),
            },
            source: Box::new(last_error.unwrap_or(ToolError::NotFound(primary))),
        })
    }

    fn resolve(&self, id: &str, scoped: &[Arc<dyn ToolHandler>]) -> Option<Arc<dyn ToolHandler>> {
        scoped
            .iter()
            .find(|t| t.id() == id)
            .cloned()
            .or_else(|| self.get(id))
    }

    async fn run_with_retries(
        &self,
        handler: &Arc<dyn ToolHandler>,
        candidate: &str,
        invocation: &ToolInvocation,
        options: &ExecutionOptions,
        attempts: &mut u32,
    ) -> Result<ToolOutput, ToolError> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            *attempts += 1;

            let call = ToolInvocation {
                tool_id: candidate.to_string(),
                ..invocation.clone()
            };
            let error = match tokio::time::timeout(options.timeout, handler.call(call)).await {
                Ok(Ok(output)) => return Ok(output),
                Ok(Err(error)) => error,
                Err(_) => ToolError::Timeout(options.timeout.as_millis() as u64),
            };

            if !is_transient(&error) || attempt > options.max_retries {
                return Err(error);
            }
            let wait = options.backoff.delay(attempt);
            tracing::warn!(
                tool = %candidate,
                attempt,
                max_retries = options.max_retries,
                wait_ms = wait.as_millis() as u64,
                "transient tool failure, retrying"
            );
            tokio::time::sleep(wait).await;
        }
    }
}

impl Default for ToolManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Transient means worth retrying: timeouts outright, otherwise a message
/// heuristic over the usual network/rate-limit/server-unavailable phrasings.
fn is_transient(error: &ToolError) -> bool {
    if matches!(error, ToolError::Timeout(_)) {
        return true;
    }
    let message = error.to_string().to_lowercase();
    [
        "timeout",
        "timed out",
        "rate limit",
        "too many requests",
        "connection",
        "network",
        "unavailable",
        "502",
        "503",
        "504",
    ]
    .iter()
    .any(|marker| message.contains(marker))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakyTool {
        id: String,
        failures_before_success: u32,
        calls: AtomicU32,
        transient: bool,
    }

    impl FlakyTool {
        fn new(id: &str, failures: u32, transient: bool) -> Self {
            Self {
                id: id.into(),
                failures_before_success: failures,
                calls: AtomicU32::new(0),
                transient,
            }
        }
    }

    #[async_trait]
    impl ToolHandler for FlakyTool {
        fn id(&self) -> &str {
            &self.id
        }

        async fn call(&self, _invocation: ToolInvocation) -> Result<ToolOutput, ToolError> {
            let count = self.calls.fetch_add(1, Ordering::SeqCst);
            if count < self.failures_before_success {
                let message = if self.transient {
                    "connection reset by peer"
                } else {
                    "invalid arguments"
                };
                return Err(ToolError::Failed(message.into()));
            }
            Ok(ToolOutput::data(json!({"ok": true})))
        }
    }

    struct SlowTool;

    #[async_trait]
    impl ToolHandler for SlowTool {
        fn id(&self) -> &str {
            "slow"
        }

        async fn call(&self, _invocation: ToolInvocation) -> Result<ToolOutput, ToolError> {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(ToolOutput::empty())
        }
    }

    fn quick_options() -> ExecutionOptions {
        ExecutionOptions::default()
            .with_timeout(Duration::from_millis(50))
            .with_backoff(Backoff::Fixed { delay_ms: 1 })
    }

    #[test]
    fn test_register_validates_id() {
        let manager = ToolManager::new();
        let bad: Arc<dyn ToolHandler> = Arc::new(FlakyTool::new("no spaces", 0, true));
        assert!(matches!(
            manager.register(bad),
            Err(ToolError::InvalidDefinition(_))
        ));

        let empty: Arc<dyn ToolHandler> = Arc::new(FlakyTool::new("", 0, true));
        assert!(matches!(
            manager.register(empty),
            Err(ToolError::InvalidDefinition(_))
        ));

        let good: Arc<dyn ToolHandler> = Arc::new(FlakyTool::new("crm.lookup-v2", 0, true));
        assert!(manager.register(good).is_ok());
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let manager = ToolManager::new();
        manager
            .register(Arc::new(FlakyTool::new("dup", 0, true)))
            .unwrap();
        assert!(matches!(
            manager.register(Arc::new(FlakyTool::new("dup", 0, true))),
            Err(ToolError::AlreadyRegistered(_))
        ));
    }

    #[tokio::test]
    async fn test_transient_failures_retried_to_success() {
        let manager = ToolManager::with_defaults(quick_options());
        manager
            .register(Arc::new(FlakyTool::new("flaky", 2, true)))
            .unwrap();

        let execution = manager
            .execute(ToolInvocation::new("flaky", json!({})))
            .await
            .unwrap();
        assert!(execution.success);
        assert_eq!(execution.metadata.attempts, 3);
        assert!(execution.metadata.fallback_used.is_none());
    }

    #[tokio::test]
    async fn test_fatal_failure_not_retried() {
        let manager = ToolManager::with_defaults(quick_options());
        manager
            .register(Arc::new(FlakyTool::new("strict", 5, false)))
            .unwrap();

        let error = manager
            .execute(ToolInvocation::new("strict", json!({})))
            .await
            .unwrap_err();
        match error {
            ToolError::Execution {
                tool_id, context, ..
            } => {
                assert_eq!(tool_id, "strict");
                assert_eq!(context.args, json!({}));
            }
            other => panic!("expected Execution error, got {other}"),
        }
    }

    #[tokio::test]
    async fn test_retries_exhausted_then_typed_error() {
        let manager = ToolManager::with_defaults(quick_options());
        manager
            .register(Arc::new(FlakyTool::new("hopeless", 10, true)))
            .unwrap();

        let error = manager
            .execute(ToolInvocation::new("hopeless", json!({"q": 1})).with_session("s1"))
            .await
            .unwrap_err();
        match error {
            ToolError::Execution {
                tool_id,
                context,
                source,
            } => {
                assert_eq!(tool_id, "hopeless");
                assert_eq!(context.session_id.as_deref(), Some("s1"));
                assert!(matches!(*source, ToolError::Failed(_)));
            }
            other => panic!("expected Execution error, got {other}"),
        }
    }

    #[tokio::test]
    async fn test_fallback_chain_used_when_primary_unresolved() {
        let manager = ToolManager::with_defaults(quick_options());
        manager
            .register(Arc::new(FlakyTool::new("backup", 0, true)))
            .unwrap();

        let options = quick_options().with_fallbacks(["backup"]);
        let execution = manager
            .execute_with(
                ToolInvocation::new("missing", json!({})),
                Some(&options),
                &[],
            )
            .await
            .unwrap();
        assert!(execution.success);
        assert_eq!(execution.metadata.fallback_used.as_deref(), Some("backup"));
    }

    #[tokio::test]
    async fn test_fallback_after_primary_exhausts_retries() {
        let manager = ToolManager::with_defaults(quick_options());
        manager
            .register(Arc::new(FlakyTool::new("primary", 10, true)))
            .unwrap();
        manager
            .register(Arc::new(FlakyTool::new("backup", 0, true)))
            .unwrap();

        let options = quick_options().with_fallbacks(["backup"]);
        let execution = manager
            .execute_with(
                ToolInvocation::new("primary", json!({})),
                Some(&options),
                &[],
            )
            .await
            .unwrap();
        assert!(execution.success);
        assert_eq!(execution.metadata.fallback_used.as_deref(), Some("backup"));
        // Primary burned its retry budget before the fallback's attempt.
        assert_eq!(execution.metadata.attempts, 4);
    }

    #[tokio::test]
    async fn test_timeout_classified_transient() {
        let manager = ToolManager::with_defaults(
            quick_options()
                .with_timeout(Duration::from_millis(10))
                .with_max_retries(1),
        );
        manager.register(Arc::new(SlowTool)).unwrap();

        let error = manager
            .execute(ToolInvocation::new("slow", json!({})))
            .await
            .unwrap_err();
        match error {
            ToolError::Execution { source, .. } => {
                assert!(matches!(*source, ToolError::Timeout(_)));
            }
            other => panic!("expected Execution error, got {other}"),
        }
    }

    #[tokio::test]
    async fn test_scoped_tools_shadow_registry() {
        let manager = ToolManager::with_defaults(quick_options());
        manager
            .register(Arc::new(FlakyTool::new("lookup", 10, false)))
            .unwrap();

        struct ScopedLookup;

        #[async_trait]
        impl ToolHandler for ScopedLookup {
            fn id(&self) -> &str {
                "lookup"
            }
            async fn call(&self, _invocation: ToolInvocation) -> Result<ToolOutput, ToolError> {
                Ok(ToolOutput::data(Value::String("scoped".into())))
            }
        }

        let scoped: Vec<Arc<dyn ToolHandler>> = vec![Arc::new(ScopedLookup)];
        let execution = manager
            .execute_with(ToolInvocation::new("lookup", json!({})), None, &scoped)
            .await
            .unwrap();
        assert_eq!(execution.output.data, Some(Value::String("scoped".into())));
    }

    #[test]
    fn test_backoff_delays() {
        assert_eq!(
            Backoff::Fixed { delay_ms: 100 }.delay(3),
            Duration::from_millis(100)
        );
        assert_eq!(
            Backoff::Linear { initial_ms: 100 }.delay(3),
            Duration::from_millis(300)
        );
        let exponential = Backoff::Exponential {
            initial_ms: 100,
            multiplier: 2.0,
            max_ms: 350,
        };
        assert_eq!(exponential.delay(1), Duration::from_millis(100));
        assert_eq!(exponential.delay(2), Duration::from_millis(200));
        assert_eq!(exponential.delay(3), Duration::from_millis(350));
    }
}
