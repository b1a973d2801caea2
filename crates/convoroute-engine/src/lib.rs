//! Conversation routing engine: condition evaluation, route/step graphs,
//! guideline matching and per-turn step resolution.

mod builder;
mod condition;
mod config;
mod context;
mod engine;
mod guideline;
mod route;
mod step;

pub use builder::{RouteBuilder, StepBuilder};
pub use condition::{evaluate, Combinator, Condition, Evaluation, Predicate};
pub use config::{
    BranchConfig, ConditionConfig, GuidelineConfig, RouteConfig, RouteSetConfig, StepConfig,
    ToolRefConfig,
};
pub use context::EvaluationContext;
pub use engine::{RouteEngine, StepResolution};
pub use guideline::{match_guidelines, Guideline, GuidelineMatch};
pub use route::{FieldSpec, FieldType, OnComplete, Route};
pub use step::{Branch, SkipOutcome, Step, StepTransition, ToolRef, WhenOutcome};
