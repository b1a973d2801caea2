//! Declarative route configuration.
//!
//! Routes can be described in YAML/JSON and converted into frozen graphs.
//! Only the declarative subset of conditions exists here: clause strings and
//! arrays of them. Programmatic predicates are code-only and attached via
//! the builder API.
//!
//! Steps without `next`/`branches` link to the following step in the list;
//! set `end: true` to terminate a chain explicitly (branch children usually
//! want this unless they rejoin a later step by id).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use convoroute_core::Result;

use crate::builder::{RouteBuilder, StepBuilder};
use crate::condition::Condition;
use crate::guideline::Guideline;
use crate::route::{FieldSpec, Route};
use crate::step::ToolRef;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteSetConfig {
    pub routes: Vec<RouteConfig>,
}

impl RouteSetConfig {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| convoroute_core::FlowError::InvalidDefinition(e.to_string()))
    }

    pub fn into_routes(self) -> Result<Vec<Route>> {
        self.routes.into_iter().map(RouteConfig::into_route).collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteConfig {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub schema: HashMap<String, FieldSpec>,
    #[serde(default)]
    pub required: Vec<String>,
    #[serde(default)]
    pub optional: Vec<String>,
    #[serde(default)]
    pub initial: Option<String>,
    #[serde(default)]
    pub steps: Vec<StepConfig>,
    #[serde(default)]
    pub guidelines: Vec<GuidelineConfig>,
    #[serde(default)]
    pub on_complete: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepConfig {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub collect: Vec<String>,
    #[serde(default)]
    pub requires: Vec<String>,
    #[serde(default)]
    pub when: Option<ConditionConfig>,
    #[serde(default)]
    pub skip_if: Option<ConditionConfig>,
    #[serde(default)]
    pub tools: Vec<ToolRefConfig>,
    #[serde(default)]
    pub next: Option<String>,
    #[serde(default)]
    pub branches: Vec<BranchConfig>,
    #[serde(default)]
    pub end: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BranchConfig {
    pub name: String,
    pub to: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolRefConfig {
    Simple(String),
    Full {
        id: String,
        #[serde(default)]
        args: Option<Value>,
    },
}

impl ToolRefConfig {
    fn into_tool_ref(self) -> ToolRef {
        match self {
            ToolRefConfig::Simple(id) => ToolRef::new(id),
            ToolRefConfig::Full { id, args } => ToolRef {
                id,
                args,
            },
        }
    }
}

/// Declarative condition: a clause, an array of conditions, or something
/// malformed. A malformed value (number, bool, map) is treated as an absent
/// condition rather than rejected; see DESIGN.md.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConditionConfig {
    Clause(String),
    Group(Vec<ConditionConfig>),
    Other(Value),
}

impl ConditionConfig {
    pub fn into_condition(self) -> Option<Condition> {
        match self {
            ConditionConfig::Clause(text) => Some(Condition::Clause(text)),
            ConditionConfig::Group(items) => Some(Condition::Group(
                items
                    .into_iter()
                    .filter_map(ConditionConfig::into_condition)
                    .collect(),
            )),
            ConditionConfig::Other(value) => {
                tracing::warn!(?value, "malformed condition value, treating as absent");
                None
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuidelineConfig {
    pub id: String,
    #[serde(default)]
    pub condition: Option<ConditionConfig>,
    pub action: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl GuidelineConfig {
    fn into_guideline(self) -> Guideline {
        Guideline {
            id: self.id,
            condition: self.condition.and_then(ConditionConfig::into_condition),
            action: self.action,
            enabled: self.enabled,
        }
    }
}

impl RouteConfig {
    pub fn into_route(self) -> Result<Route> {
        let mut builder = RouteBuilder::new(self.id, self.title).description(self.description);

        for (name, spec) in self.schema {
            builder = builder.field(name, spec);
        }
        builder = builder.required(self.required).optional(self.optional);
        if let Some(initial) = self.initial {
            builder = builder.initial(initial);
        }
        if let Some(target) = self.on_complete {
            builder = builder.on_complete(target);
        }
        for guideline in self.guidelines {
            builder = builder.guideline(guideline.into_guideline());
        }

        for step in self.steps {
            let mut sb = match step.id {
                Some(id) => StepBuilder::new(id),
                None => StepBuilder::unnamed(),
            };
            if let Some(description) = step.description {
                sb = sb.description(description);
            }
            sb = sb
                .prompt(step.prompt)
                .collect(step.collect)
                .requires(step.requires);
            if let Some(condition) = step.when.and_then(ConditionConfig::into_condition) {
                sb = sb.when(condition);
            }
            if let Some(condition) = step.skip_if.and_then(ConditionConfig::into_condition) {
                sb = sb.skip_if(condition);
            }
            for tool in step.tools {
                sb = sb.tool(tool.into_tool_ref());
            }
            if !step.branches.is_empty() {
                sb = sb.branches(step.branches.into_iter().map(|b| (b.name, b.to)));
            } else if let Some(next) = step.next {
                sb = sb.next(next);
            } else if step.end {
                sb = sb.end();
            }
            builder = builder.step(sb);
        }

        builder.build()
    }
}
