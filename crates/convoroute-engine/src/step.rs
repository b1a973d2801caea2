//! Steps: nodes of a route's directed graph.
//!
//! A step owns its prompt, the fields it elicits (`collect`), its
//! preconditions (`requires`), activation/skip conditions and its outgoing
//! edge: the next step id, a named branch fan-out, or the terminal marker.
//! The graph is id-keyed and frozen after `RouteBuilder::build`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use convoroute_core::value_present;

use crate::condition::{evaluate, Combinator, Condition};
use crate::context::EvaluationContext;

/// Reference to a tool a step wants invoked while it is active.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolRef {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<Value>,
}

impl ToolRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            args: None,
        }
    }

    pub fn with_args(mut self, args: Value) -> Self {
        self.args = Some(args);
        self
    }
}

/// Named edge of a branch fan-out.
#[derive(Debug, Clone, PartialEq)]
pub struct Branch {
    pub name: String,
    pub target: String,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum StepTransition {
    Next(String),
    Branches(Vec<Branch>),
    #[default]
    End,
}

impl StepTransition {
    /// Outgoing step ids in traversal order.
    pub fn targets(&self) -> Vec<&str> {
        match self {
            StepTransition::Next(id) => vec![id.as_str()],
            StepTransition::Branches(branches) => {
                branches.iter().map(|b| b.target.as_str()).collect()
            }
            StepTransition::End => Vec::new(),
        }
    }

    pub fn is_end(&self) -> bool {
        matches!(self, StepTransition::End)
    }
}

#[derive(Debug, Clone)]
pub struct Step {
    pub id: String,
    pub description: String,
    pub prompt: String,
    pub collect: Vec<String>,
    pub requires: Vec<String>,
    pub when: Option<Condition>,
    pub skip_if: Option<Condition>,
    pub tools: Vec<ToolRef>,
    pub transition: StepTransition,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WhenOutcome {
    pub should_activate: bool,
    pub rationale: Vec<String>,
    pub has_programmatic: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SkipOutcome {
    pub should_skip: bool,
    pub rationale: Vec<String>,
    pub has_programmatic: bool,
}

impl Step {
    /// `when` under conjunction: an absent or all-clause condition activates.
    pub async fn evaluate_when(&self, ctx: &EvaluationContext) -> WhenOutcome {
        let evaluation = evaluate(self.when.as_ref(), ctx, Combinator::All).await;
        WhenOutcome {
            should_activate: evaluation.result,
            rationale: evaluation.rationale,
            has_programmatic: evaluation.has_programmatic,
        }
    }

    /// `skip_if` under disjunction: only a programmatic condition can ask
    /// for a skip, so an absent or all-clause condition never skips.
    pub async fn evaluate_skip_if(&self, ctx: &EvaluationContext) -> SkipOutcome {
        let evaluation = evaluate(self.skip_if.as_ref(), ctx, Combinator::Any).await;
        SkipOutcome {
            should_skip: evaluation.result,
            rationale: evaluation.rationale,
            has_programmatic: evaluation.has_programmatic,
        }
    }

    /// True when every precondition field is present in the data (a `null`
    /// value counts as absent).
    pub fn has_requires(&self, data: &HashMap<String, Value>) -> bool {
        self.requires
            .iter()
            .all(|field| data.get(field).map(|v| !v.is_null()).unwrap_or(false))
    }

    /// True when the step has collect fields and every one of them already
    /// holds a non-empty value; resolution passes over satisfied steps.
    pub fn is_satisfied(&self, data: &HashMap<String, Value>) -> bool {
        !self.collect.is_empty()
            && self
                .collect
                .iter()
                .all(|field| data.get(field).map(value_present).unwrap_or(false))
    }
}
