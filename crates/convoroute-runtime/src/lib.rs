//! Runtime agent and builder for the Convoroute framework

mod agent;
mod builder;
mod selector;

pub use agent::{Agent, ToolCallRecord, TurnError, TurnRequest, TurnResponse};
pub use builder::AgentBuilder;
pub use selector::{RouteInfo, RouteSelector, StaticSelector};
