//! Agent assembly.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use convoroute_core::{FlowError, Provider, Result, SessionStore};
use convoroute_engine::{Guideline, Route, RouteEngine, RouteSetConfig};
use convoroute_tools::{ToolHandler, ToolManager};

use crate::agent::Agent;
use crate::selector::RouteSelector;

pub struct AgentBuilder {
    routes: Vec<Route>,
    guidelines: Vec<Guideline>,
    provider: Option<Arc<dyn Provider>>,
    store: Option<Arc<dyn SessionStore>>,
    selector: Option<Arc<dyn RouteSelector>>,
    tools: ToolManager,
    context: HashMap<String, Value>,
    error: Option<FlowError>,
}

impl AgentBuilder {
    pub fn new() -> Self {
        Self {
            routes: Vec::new(),
            guidelines: Vec::new(),
            provider: None,
            store: None,
            selector: None,
            tools: ToolManager::new(),
            context: HashMap::new(),
            error: None,
        }
    }

    pub fn route(mut self, route: Route) -> Self {
        self.routes.push(route);
        self
    }

    /// Load declarative routes; predicates stay code-only and can be added
    /// via `route` alongside.
    pub fn routes_from_yaml(mut self, yaml: &str) -> Self {
        match RouteSetConfig::from_yaml(yaml).and_then(RouteSetConfig::into_routes) {
            Ok(routes) => self.routes.extend(routes),
            Err(error) => {
                self.error.get_or_insert(error);
            }
        }
        self
    }

    /// Agent-level guideline, evaluated every turn regardless of route.
    pub fn guideline(mut self, guideline: Guideline) -> Self {
        self.guidelines.push(guideline);
        self
    }

    pub fn provider(mut self, provider: Arc<dyn Provider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn selector(mut self, selector: Arc<dyn RouteSelector>) -> Self {
        self.selector = Some(selector);
        self
    }

    pub fn tool_manager(mut self, tools: ToolManager) -> Self {
        self.tools = tools;
        self
    }

    pub fn tool(mut self, tool: Arc<dyn ToolHandler>) -> Self {
        if let Err(error) = self.tools.register(tool) {
            self.error.get_or_insert(error.into());
        }
        self
    }

    pub fn context_value(mut self, key: impl Into<String>, value: Value) -> Self {
        self.context.insert(key.into(), value);
        self
    }

    pub fn build(mut self) -> Result<Agent> {
        if let Some(error) = self.error.take() {
            return Err(error);
        }
        let provider = self
            .provider
            .ok_or_else(|| FlowError::InvalidDefinition("agent requires a provider".into()))?;
        let engine = RouteEngine::with_routes(self.routes)?;
        Ok(Agent::assemble(
            engine,
            self.tools,
            provider,
            self.store,
            self.selector,
            self.guidelines,
            self.context,
        ))
    }
}

impl Default for AgentBuilder {
    fn default() -> Self {
        Self::new()
    }
}
