//! Read-only evaluation context handed to predicates and the guideline
//! matcher. Built fresh each turn from the session plus the caller-owned
//! agent context; predicates never mutate it.

use std::collections::HashMap;

use serde_json::Value;

use convoroute_core::{ChatMessage, SessionState};

#[derive(Debug, Clone, Default)]
pub struct EvaluationContext {
    /// Caller-owned agent context, outside the session.
    pub context: HashMap<String, Value>,
    /// Collected fields of the active route.
    pub data: HashMap<String, Value>,
    pub session: Option<SessionState>,
    pub history: Vec<ChatMessage>,
}

impl EvaluationContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Context seeded from a session: `data` mirrors the session's collected
    /// fields and the session itself rides along for predicates that need
    /// history or pointers.
    pub fn for_session(session: &SessionState) -> Self {
        Self {
            context: HashMap::new(),
            data: session.data.clone(),
            session: Some(session.clone()),
            history: Vec::new(),
        }
    }

    pub fn with_context(mut self, context: HashMap<String, Value>) -> Self {
        self.context = context;
        self
    }

    pub fn with_data(mut self, data: HashMap<String, Value>) -> Self {
        self.data = data;
        self
    }

    pub fn with_history(mut self, history: Vec<ChatMessage>) -> Self {
        self.history = history;
        self
    }
}
