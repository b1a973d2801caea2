//! Convoroute: a framework for building multi-turn conversational agents.
//!
//! Conversations move through *routes* (intent-specific flows) made of
//! *steps* that collect structured data turn by turn. The engine decides
//! which step is active, when to skip or branch, when a route is complete,
//! and which behavioral *guidelines* currently apply. Language models,
//! session stores and tools stay behind narrow traits.

pub use convoroute_core::{
    value_present, ChatMessage, CollectedData, FlowError, GenerateRequest, MockProvider,
    PendingTransition, Provider, ProviderResponse, Result, Role, RoutePointer, RouteVisit,
    SessionMetadata, SessionRecord, SessionState, SessionStore, StepPointer, ToolCallRequest,
};

pub use convoroute_engine::{
    evaluate, match_guidelines, Branch, Combinator, Condition, ConditionConfig, Evaluation,
    EvaluationContext, FieldSpec, FieldType, Guideline, GuidelineConfig, GuidelineMatch,
    OnComplete, Predicate, Route, RouteBuilder, RouteConfig, RouteEngine, RouteSetConfig,
    SkipOutcome, Step, StepBuilder, StepConfig, StepResolution, StepTransition, ToolRef,
    WhenOutcome,
};

pub use convoroute_tools::{
    generate_schema, patterns, Backoff, ExecutionMetadata, ExecutionOptions, ToolError,
    ToolExecution, ToolHandler, ToolInvocation, ToolManager, ToolOutput,
};

pub use convoroute_storage::{create_store, FileStore, MemoryStore, RedisStore, StorageConfig};

pub use convoroute_runtime::{
    Agent, AgentBuilder, RouteInfo, RouteSelector, StaticSelector, ToolCallRecord, TurnError,
    TurnRequest, TurnResponse,
};
