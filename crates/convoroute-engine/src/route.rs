//! Routes: schema-bound conversational flows over a frozen step graph.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use convoroute_core::{value_present, FlowError, Result, SessionState};

use crate::guideline::Guideline;
use crate::step::Step;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Number,
    Boolean,
    Object,
    Array,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl FieldSpec {
    pub fn new(field_type: FieldType) -> Self {
        Self {
            field_type,
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// What happens after a route completes: hand over to another route by
/// title, either fixed or computed from the finished session.
#[derive(Clone)]
pub enum OnComplete {
    Title(String),
    Resolver(Arc<dyn Fn(&SessionState) -> Option<String> + Send + Sync>),
}

impl OnComplete {
    pub fn resolve(&self, session: &SessionState) -> Option<String> {
        match self {
            OnComplete::Title(title) => Some(title.clone()),
            OnComplete::Resolver(resolver) => resolver(session),
        }
    }
}

impl fmt::Debug for OnComplete {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OnComplete::Title(title) => f.debug_tuple("Title").field(title).finish(),
            OnComplete::Resolver(_) => f.write_str("Resolver(..)"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Route {
    pub id: String,
    pub title: String,
    pub description: String,
    pub schema: HashMap<String, FieldSpec>,
    pub required_fields: Vec<String>,
    pub optional_fields: Vec<String>,
    pub initial_step: String,
    pub steps: HashMap<String, Step>,
    pub guidelines: Vec<Guideline>,
    pub on_complete: Option<OnComplete>,
}

impl Route {
    pub fn step(&self, id: &str) -> Option<&Step> {
        self.steps.get(id)
    }

    /// Every registered step, branch orphans included.
    pub fn all_steps(&self) -> impl Iterator<Item = &Step> {
        self.steps.values()
    }

    /// Completion predicate: every required field holds a defined, non-empty
    /// value. Unrelated optional fields never change the outcome.
    pub fn is_complete(&self, data: &HashMap<String, Value>) -> bool {
        self.required_fields
            .iter()
            .all(|field| data.get(field).map(value_present).unwrap_or(false))
    }

    pub fn resolve_on_complete(&self, session: &SessionState) -> Option<String> {
        self.on_complete.as_ref().and_then(|oc| oc.resolve(session))
    }

    /// Steps discoverable from the initial step through transitions and
    /// branch maps. The visited set keeps rejoining branches from looping.
    pub fn reachable_steps(&self) -> Vec<&Step> {
        let mut visited: HashSet<&str> = HashSet::new();
        let mut order: Vec<&Step> = Vec::new();
        let mut stack: Vec<&str> = vec![self.initial_step.as_str()];

        while let Some(id) = stack.pop() {
            if !visited.insert(id) {
                continue;
            }
            let Some(step) = self.steps.get(id) else {
                continue;
            };
            order.push(step);
            for target in step.transition.targets().into_iter().rev() {
                stack.push(target);
            }
        }
        order
    }

    /// Graph-consistency check, run once at build time. Unknown targets and
    /// empty routes are configuration bugs and fatal.
    pub fn validate(&self) -> Result<()> {
        if self.steps.is_empty() {
            return Err(FlowError::EmptyRoute(self.id.clone()));
        }
        if !self.steps.contains_key(&self.initial_step) {
            return Err(FlowError::InvalidDefinition(format!(
                "route '{}' initial step '{}' does not exist",
                self.id, self.initial_step
            )));
        }
        for step in self.steps.values() {
            for target in step.transition.targets() {
                if !self.steps.contains_key(target) {
                    return Err(FlowError::InvalidDefinition(format!(
                        "step '{}' in route '{}' points at unknown step '{}'",
                        step.id, self.id, target
                    )));
                }
            }
        }
        for field in self.required_fields.iter().chain(&self.optional_fields) {
            if !self.schema.is_empty() && !self.schema.contains_key(field) {
                return Err(FlowError::InvalidDefinition(format!(
                    "route '{}' lists field '{}' outside its schema",
                    self.id, field
                )));
            }
        }
        Ok(())
    }
}
