//! Per-turn entry point.
//!
//! `Agent::respond` drives one conversational turn: consume any queued
//! route transition, select a route if none is active, resolve the active
//! step, run its tools and merge their patches, match guidelines, hand the
//! assembled prompt bundle to the provider, and persist the new session
//! state. The message text comes from the provider; the engine's
//! contribution is the updated session and the completion flag.
//!
//! Turns are caller-serialized per session id: the runtime takes a working
//! copy of the loaded state, so a failed turn leaves the caller's committed
//! state untouched ("lose the turn, never corrupt history").

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use convoroute_core::{
    ChatMessage, FlowError, GenerateRequest, Provider, SessionState, SessionStore,
};
use convoroute_engine::{
    match_guidelines, EvaluationContext, Guideline, GuidelineMatch, RouteEngine, Step,
    StepResolution, ToolRef,
};
use convoroute_tools::{ToolError, ToolInvocation, ToolManager};

use crate::selector::{RouteInfo, RouteSelector};

#[derive(Debug, Clone, Default)]
pub struct TurnRequest {
    pub history: Vec<ChatMessage>,
    pub session: Option<SessionState>,
    pub session_id: Option<String>,
    pub context_override: Option<HashMap<String, Value>>,
}

impl TurnRequest {
    pub fn new(history: Vec<ChatMessage>) -> Self {
        Self {
            history,
            session: None,
            session_id: None,
            context_override: None,
        }
    }

    pub fn with_session(mut self, session: SessionState) -> Self {
        self.session = Some(session);
        self
    }

    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_context_override(mut self, context: HashMap<String, Value>) -> Self {
        self.context_override = Some(context);
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub tool_id: String,
    pub args: Value,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_used: Option<String>,
}

#[derive(Debug, Clone)]
pub struct TurnResponse {
    pub message: String,
    pub session: SessionState,
    pub is_route_complete: bool,
    pub tool_calls: Vec<ToolCallRecord>,
}

#[derive(Debug, Error)]
pub enum TurnError {
    /// A step tool failed terminally. The session mutated so far rides
    /// along so the caller can decide between retrying the turn and
    /// persisting partial progress.
    #[error("tool execution failed: {source}")]
    Tool {
        #[source]
        source: ToolError,
        session: Box<SessionState>,
    },

    #[error(transparent)]
    Flow(#[from] FlowError),
}

pub struct Agent {
    engine: RouteEngine,
    tools: ToolManager,
    provider: Arc<dyn Provider>,
    store: Option<Arc<dyn SessionStore>>,
    selector: Option<Arc<dyn RouteSelector>>,
    guidelines: Vec<Guideline>,
    context: RwLock<HashMap<String, Value>>,
}

impl Agent {
    pub(crate) fn assemble(
        engine: RouteEngine,
        tools: ToolManager,
        provider: Arc<dyn Provider>,
        store: Option<Arc<dyn SessionStore>>,
        selector: Option<Arc<dyn RouteSelector>>,
        guidelines: Vec<Guideline>,
        context: HashMap<String, Value>,
    ) -> Self {
        Self {
            engine,
            tools,
            provider,
            store,
            selector,
            guidelines,
            context: RwLock::new(context),
        }
    }

    pub fn engine(&self) -> &RouteEngine {
        &self.engine
    }

    pub fn tools(&self) -> &ToolManager {
        &self.tools
    }

    /// Snapshot of the caller-owned agent context.
    pub fn context(&self) -> HashMap<String, Value> {
        self.context.read().clone()
    }

    pub async fn respond(&self, request: TurnRequest) -> Result<TurnResponse, TurnError> {
        let mut session = self.obtain_session(&request).await?;
        let turn_context = self.turn_context(request.context_override.as_ref());
        let mut tool_calls = Vec::new();
        let mut is_route_complete = false;

        let _ = self.engine.apply_pending_transition(&mut session)?;

        if !session.in_route() {
            self.select_route(&mut session, &request.history).await?;
        }

        let mut rationale = Vec::new();
        let mut active_step: Option<Step> = None;

        if session.in_route() {
            let ctx = self.evaluation_context(&session, &request.history, &turn_context);
            match self.engine.resolve(&session, &ctx).await? {
                StepResolution::Active {
                    step_id,
                    rationale: step_rationale,
                } => {
                    rationale = step_rationale;
                    let route = self
                        .engine
                        .route(&session.current_route.as_ref().expect("in route").id)
                        .expect("active route is registered");
                    let step = route.step(&step_id).expect("resolved step exists").clone();
                    session.set_current_step(&step.id, &step.description);

                    self.run_tools(&step.tools, &mut session, &turn_context, &mut tool_calls)
                        .await?;

                    // Tool patches may have finished the route.
                    if !tool_calls.is_empty() {
                        let ctx =
                            self.evaluation_context(&session, &request.history, &turn_context);
                        if let StepResolution::RouteComplete { .. } =
                            self.engine.resolve(&session, &ctx).await?
                        {
                            self.engine.complete_route(&mut session)?;
                            is_route_complete = true;
                        }
                    }
                    active_step = Some(step);
                }
                StepResolution::RouteComplete {
                    rationale: step_rationale,
                } => {
                    rationale = step_rationale;
                    self.engine.complete_route(&mut session)?;
                    is_route_complete = true;
                }
                StepResolution::Exhausted {
                    rationale: step_rationale,
                } => {
                    rationale = step_rationale;
                }
            }
        }

        let ctx = self.evaluation_context(&session, &request.history, &turn_context);
        let mut matched = Vec::new();
        if let Some(pointer) = &session.current_route {
            if let Some(route) = self.engine.route(&pointer.id) {
                matched.extend(match_guidelines(&route.guidelines, &ctx).await);
            }
        }
        matched.extend(match_guidelines(&self.guidelines, &ctx).await);

        let system = self.compose_system_prompt(active_step.as_ref(), &rationale, &matched);
        let response = self
            .provider
            .generate(GenerateRequest::new(request.history.clone()).with_system(system))
            .await
            .map_err(TurnError::Flow)?;

        self.apply_structured_hints(&response, &mut session);
        if !response.tool_calls.is_empty() {
            let requested: Vec<ToolRef> = response
                .tool_calls
                .iter()
                .map(|call| ToolRef {
                    id: call.tool_id.clone(),
                    args: Some(call.args.clone()),
                })
                .collect();
            self.run_tools(&requested, &mut session, &turn_context, &mut tool_calls)
                .await?;
        }

        if let Some(store) = &self.store {
            store
                .save(&session.id, &session.to_record())
                .await
                .map_err(TurnError::Flow)?;
        }

        Ok(TurnResponse {
            message: response.message,
            session,
            is_route_complete,
            tool_calls,
        })
    }

    async fn obtain_session(&self, request: &TurnRequest) -> Result<SessionState, TurnError> {
        if let Some(session) = &request.session {
            return Ok(session.clone());
        }
        if let Some(session_id) = &request.session_id {
            if let Some(store) = &self.store {
                if let Some(record) = store.load(session_id).await.map_err(TurnError::Flow)? {
                    return Ok(SessionState::from_record(record));
                }
            }
            return Ok(SessionState::with_id(session_id.clone()));
        }
        Ok(SessionState::new())
    }

    async fn select_route(
        &self,
        session: &mut SessionState,
        history: &[ChatMessage],
    ) -> Result<(), TurnError> {
        let Some(selector) = &self.selector else {
            return Ok(());
        };
        let routes: Vec<RouteInfo> = self.engine.routes().map(|r| RouteInfo::from(r.as_ref())).collect();
        let Some(choice) = selector
            .select_route(&routes, history, session)
            .await
            .map_err(TurnError::Flow)?
        else {
            return Ok(());
        };
        if self.engine.route(&choice).is_some() {
            self.engine.enter_route(session, &choice)?;
        } else {
            self.engine.enter_route_by_title(session, &choice)?;
        }
        Ok(())
    }

    async fn run_tools(
        &self,
        tools: &[ToolRef],
        session: &mut SessionState,
        turn_context: &HashMap<String, Value>,
        tool_calls: &mut Vec<ToolCallRecord>,
    ) -> Result<(), TurnError> {
        for tool_ref in tools {
            let args = tool_ref.args.clone().unwrap_or_else(|| serde_json::json!({}));
            let invocation = ToolInvocation::new(&tool_ref.id, args.clone())
                .with_data(session.data.clone())
                .with_context(turn_context.clone())
                .with_session(&session.id);

            match self.tools.execute(invocation).await {
                Ok(execution) => {
                    if let Some(update) = execution.output.data_update.clone() {
                        session.merge_collected(update);
                    }
                    if let Some(update) = execution.output.context_update.clone() {
                        let mut context = self.context.write();
                        for (key, value) in update {
                            context.insert(key, value);
                        }
                    }
                    tool_calls.push(ToolCallRecord {
                        tool_id: tool_ref.id.clone(),
                        args,
                        success: execution.success,
                        data: execution.output.data,
                        fallback_used: execution.metadata.fallback_used,
                    });
                }
                Err(source) => {
                    return Err(TurnError::Tool {
                        source,
                        session: Box::new(session.clone()),
                    });
                }
            }
        }
        Ok(())
    }

    /// Providers may steer routing through structured output; only the
    /// `route` and `step` fields are honored, and dangling references are
    /// logged rather than failing the turn.
    fn apply_structured_hints(
        &self,
        response: &convoroute_core::ProviderResponse,
        session: &mut SessionState,
    ) {
        if let Some(route_title) = response.route_hint() {
            let already_there = session
                .current_route
                .as_ref()
                .map(|r| r.title == route_title)
                .unwrap_or(false);
            if !already_there {
                if let Err(error) = self.engine.enter_route_by_title(session, route_title) {
                    tracing::warn!(%error, route = %route_title, "ignoring unknown route hint");
                }
            }
        }
        if let Some(step_id) = response.step_hint() {
            let step = session
                .current_route
                .as_ref()
                .and_then(|pointer| self.engine.route(&pointer.id))
                .and_then(|route| route.step(step_id).cloned());
            match step {
                Some(step) => session.set_current_step(&step.id, &step.description),
                None => tracing::warn!(step = %step_id, "ignoring unknown step hint"),
            }
        }
    }

    fn turn_context(
        &self,
        context_override: Option<&HashMap<String, Value>>,
    ) -> HashMap<String, Value> {
        let mut context = self.context.read().clone();
        if let Some(overlay) = context_override {
            for (key, value) in overlay {
                context.insert(key.clone(), value.clone());
            }
        }
        context
    }

    fn evaluation_context(
        &self,
        session: &SessionState,
        history: &[ChatMessage],
        turn_context: &HashMap<String, Value>,
    ) -> EvaluationContext {
        EvaluationContext::for_session(session)
            .with_context(turn_context.clone())
            .with_history(history.to_vec())
    }

    fn compose_system_prompt(
        &self,
        step: Option<&Step>,
        rationale: &[String],
        matched: &[GuidelineMatch],
    ) -> String {
        let mut sections = Vec::new();
        if let Some(step) = step {
            if !step.prompt.is_empty() {
                sections.push(step.prompt.clone());
            }
        }
        if !rationale.is_empty() {
            sections.push(format!("Context:\n- {}", rationale.join("\n- ")));
        }
        if !matched.is_empty() {
            let lines: Vec<String> = matched
                .iter()
                .map(|m| format!("- {} ({})", m.guideline.action, m.rationale))
                .collect();
            sections.push(format!("Guidelines:\n{}", lines.join("\n")));
        }
        sections.join("\n\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::AgentBuilder;
    use crate::selector::StaticSelector;
    use convoroute_core::{MockProvider, ProviderResponse};
    use convoroute_engine::{Condition, RouteBuilder, StepBuilder};
    use convoroute_storage::MemoryStore;
    use convoroute_tools::patterns;
    use serde_json::json;

    fn signup_route() -> convoroute_engine::Route {
        RouteBuilder::new("signup", "Signup")
            .required(["email"])
            .guideline(Guideline::new("warm", "Keep a warm tone."))
            .step(
                StepBuilder::new("ask_email")
                    .prompt("Ask the user for their email address.")
                    .collect(["email"]),
            )
            .build()
            .unwrap()
    }

    fn support_route() -> convoroute_engine::Route {
        RouteBuilder::new("support", "Support")
            .required(["issue"])
            .step(
                StepBuilder::new("triage")
                    .prompt("Find out what went wrong.")
                    .collect(["issue"]),
            )
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_full_turn_with_fresh_session() {
        let provider = MockProvider::new();
        provider.add_response(ProviderResponse::text("What's your email?"));

        let agent = AgentBuilder::new()
            .route(signup_route())
            .provider(Arc::new(provider.clone()))
            .selector(Arc::new(StaticSelector::new("Signup")))
            .build()
            .unwrap();

        let response = agent
            .respond(TurnRequest::new(vec![ChatMessage::user("hi, sign me up")]))
            .await
            .unwrap();

        assert_eq!(response.message, "What's your email?");
        assert!(!response.is_route_complete);
        let session = &response.session;
        assert_eq!(session.current_route.as_ref().unwrap().id, "signup");
        assert_eq!(session.current_step.as_ref().unwrap().id, "ask_email");

        // The provider saw the step prompt and the matched guideline.
        let system = provider.last_call().unwrap().system.unwrap();
        assert!(system.contains("Ask the user for their email address."));
        assert!(system.contains("Keep a warm tone."));
    }

    #[tokio::test]
    async fn test_tool_patch_completes_route() {
        let provider = MockProvider::new();
        let lookup = patterns::data_enrichment(
            "email_lookup",
            "Resolve the email from the CRM",
            |_invocation| async move {
                Ok(HashMap::from([("email".to_string(), json!("a@b.com"))]))
            },
        );
        let route = RouteBuilder::new("signup", "Signup")
            .required(["email"])
            .step(
                StepBuilder::new("fetch_email")
                    .collect(["email"])
                    .tool(convoroute_engine::ToolRef::new("email_lookup")),
            )
            .build()
            .unwrap();

        let agent = AgentBuilder::new()
            .route(route)
            .tool(lookup)
            .provider(Arc::new(provider))
            .selector(Arc::new(StaticSelector::new("Signup")))
            .build()
            .unwrap();

        let response = agent
            .respond(TurnRequest::new(vec![ChatMessage::user("sign me up")]))
            .await
            .unwrap();

        assert!(response.is_route_complete);
        assert!(response.session.current_route.is_none());
        assert!(response.session.route_history[0].completed);
        assert_eq!(response.tool_calls.len(), 1);
        assert_eq!(response.tool_calls[0].tool_id, "email_lookup");
        assert_eq!(
            response.session.data_by_route["signup"]["email"],
            json!("a@b.com")
        );
    }

    #[tokio::test]
    async fn test_pending_transition_consumed_at_turn_start() {
        let provider = MockProvider::new();
        let agent = AgentBuilder::new()
            .route(signup_route())
            .route(support_route())
            .provider(Arc::new(provider))
            .build()
            .unwrap();

        let mut session = SessionState::with_id("s1");
        session.set_pending_transition("Support");

        let response = agent
            .respond(TurnRequest::new(vec![ChatMessage::user("hello again")]).with_session(session))
            .await
            .unwrap();

        assert_eq!(response.session.current_route.as_ref().unwrap().id, "support");
        assert!(response.session.pending_transition.is_none());
    }

    #[tokio::test]
    async fn test_route_hint_switches_route() {
        let provider = MockProvider::new();
        provider.add_response(
            ProviderResponse::text("Let me get support on the line.")
                .with_structured(json!({"route": "Support"})),
        );

        let agent = AgentBuilder::new()
            .route(signup_route())
            .route(support_route())
            .provider(Arc::new(provider))
            .selector(Arc::new(StaticSelector::new("Signup")))
            .build()
            .unwrap();

        let response = agent
            .respond(TurnRequest::new(vec![ChatMessage::user("actually it's broken")]))
            .await
            .unwrap();

        assert_eq!(response.session.current_route.as_ref().unwrap().id, "support");
        // Signup's collected state was snapshotted on the way out.
        assert!(response.session.data_by_route.contains_key("signup"));
    }

    #[tokio::test]
    async fn test_tool_failure_carries_session() {
        let provider = MockProvider::new();
        let broken = patterns::computation("lookup", "Always fails", |_args| {
            Err("invalid arguments".to_string())
        });
        let route = RouteBuilder::new("signup", "Signup")
            .required(["email"])
            .step(
                StepBuilder::new("fetch")
                    .collect(["email"])
                    .tool(convoroute_engine::ToolRef::new("lookup")),
            )
            .build()
            .unwrap();

        let agent = AgentBuilder::new()
            .route(route)
            .tool(broken)
            .provider(Arc::new(provider))
            .selector(Arc::new(StaticSelector::new("Signup")))
            .build()
            .unwrap();

        let error = agent
            .respond(TurnRequest::new(vec![ChatMessage::user("go")]))
            .await
            .unwrap_err();

        match error {
            TurnError::Tool { session, .. } => {
                // Progress up to the failure is preserved for the caller.
                assert_eq!(session.current_route.as_ref().unwrap().id, "signup");
                assert_eq!(session.current_step.as_ref().unwrap().id, "fetch");
            }
            other => panic!("expected Tool error, got {other}"),
        }
    }

    #[tokio::test]
    async fn test_context_override_reaches_predicates() {
        let provider = MockProvider::new();
        let route = RouteBuilder::new("signup", "Signup")
            .required(["name"])
            .step(
                StepBuilder::new("ask_email")
                    .collect(["email"])
                    .skip_if(Condition::predicate(|ctx| {
                        ctx.context.get("known_user") == Some(&json!(true))
                    })),
            )
            .step(StepBuilder::new("ask_name").collect(["name"]))
            .build()
            .unwrap();

        let agent = AgentBuilder::new()
            .route(route)
            .provider(Arc::new(provider))
            .selector(Arc::new(StaticSelector::new("Signup")))
            .build()
            .unwrap();

        let response = agent
            .respond(
                TurnRequest::new(vec![ChatMessage::user("hi")])
                    .with_context_override(HashMap::from([("known_user".into(), json!(true))])),
            )
            .await
            .unwrap();

        assert_eq!(response.session.current_step.as_ref().unwrap().id, "ask_name");
    }

    #[tokio::test]
    async fn test_session_persisted_and_reloaded() {
        let provider = MockProvider::new();
        let store = Arc::new(MemoryStore::new());

        let agent = AgentBuilder::new()
            .route(signup_route())
            .provider(Arc::new(provider))
            .store(store.clone())
            .selector(Arc::new(StaticSelector::new("Signup")))
            .build()
            .unwrap();

        let first = agent
            .respond(
                TurnRequest::new(vec![ChatMessage::user("hi")]).with_session_id("conversation-9"),
            )
            .await
            .unwrap();
        assert_eq!(first.session.current_route.as_ref().unwrap().id, "signup");

        // Second turn reloads the saved record instead of starting fresh.
        let second = agent
            .respond(
                TurnRequest::new(vec![ChatMessage::user("still here")])
                    .with_session_id("conversation-9"),
            )
            .await
            .unwrap();
        assert_eq!(second.session.id, "conversation-9");
        assert_eq!(second.session.route_history.len(), 1);
        assert_eq!(
            second.session.current_route.as_ref().unwrap().entered_at,
            first.session.current_route.as_ref().unwrap().entered_at
        );
    }

    #[tokio::test]
    async fn test_agent_level_guidelines_without_route() {
        let provider = MockProvider::new();
        let agent = AgentBuilder::new()
            .route(signup_route())
            .guideline(Guideline::new("concise", "Answer briefly."))
            .provider(Arc::new(provider.clone()))
            .build()
            .unwrap();

        // No selector: the turn proceeds route-less on agent guidelines.
        let response = agent
            .respond(TurnRequest::new(vec![ChatMessage::user("hello")]))
            .await
            .unwrap();

        assert!(response.session.current_route.is_none());
        let system = provider.last_call().unwrap().system.unwrap();
        assert!(system.contains("Answer briefly."));
    }
}
