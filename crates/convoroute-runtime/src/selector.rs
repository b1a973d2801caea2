//! Route selection seam.
//!
//! When a turn starts with no active route, the runtime asks a selector to
//! propose one. The LLM-assisted intent matcher that usually sits behind
//! this trait lives outside the core; tests plug in fixed selectors.

use async_trait::async_trait;
use serde::Serialize;

use convoroute_core::{ChatMessage, Result, SessionState};
use convoroute_engine::Route;

#[derive(Debug, Clone, Serialize)]
pub struct RouteInfo {
    pub id: String,
    pub title: String,
    pub description: String,
}

impl From<&Route> for RouteInfo {
    fn from(route: &Route) -> Self {
        Self {
            id: route.id.clone(),
            title: route.title.clone(),
            description: route.description.clone(),
        }
    }
}

/// Proposes a route (by id or title) for a session without one. `None`
/// means no route fits and the turn proceeds route-less.
#[async_trait]
pub trait RouteSelector: Send + Sync {
    async fn select_route(
        &self,
        routes: &[RouteInfo],
        history: &[ChatMessage],
        session: &SessionState,
    ) -> Result<Option<String>>;
}

/// Selector that always proposes the same route. Useful for single-route
/// agents and tests.
pub struct StaticSelector {
    target: String,
}

impl StaticSelector {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
        }
    }
}

#[async_trait]
impl RouteSelector for StaticSelector {
    async fn select_route(
        &self,
        _routes: &[RouteInfo],
        _history: &[ChatMessage],
        _session: &SessionState,
    ) -> Result<Option<String>> {
        Ok(Some(self.target.clone()))
    }
}
