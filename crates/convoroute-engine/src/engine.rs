//! Per-turn route resolution.
//!
//! The engine owns the immutable route registry and computes, from session
//! state plus the declared graphs, which step is active, whether the route
//! is complete, and which transition to apply next. It never talks to a
//! provider or a store; those seams live in the runtime crate.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use convoroute_core::{FlowError, Result, SessionState};

use crate::context::EvaluationContext;
use crate::route::Route;
use crate::step::Step;

#[derive(Debug, Clone, PartialEq)]
pub enum StepResolution {
    /// A reachable, non-skippable step; the turn should prompt for it.
    Active {
        step_id: String,
        rationale: Vec<String>,
    },
    /// The walk reached a terminal marker with every required field present.
    RouteComplete { rationale: Vec<String> },
    /// Every path terminated but required fields are still missing; the
    /// session keeps its current step and the caller re-prompts.
    Exhausted { rationale: Vec<String> },
}

#[derive(Default)]
pub struct RouteEngine {
    routes: HashMap<String, Arc<Route>>,
}

impl RouteEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_routes(routes: Vec<Route>) -> Result<Self> {
        let mut engine = Self::new();
        for route in routes {
            engine.register(route)?;
        }
        Ok(engine)
    }

    /// Routes are validated on the way in and frozen behind `Arc`; the
    /// registry is never mutated during conversation processing.
    pub fn register(&mut self, route: Route) -> Result<()> {
        route.validate()?;
        if self.routes.contains_key(&route.id) {
            return Err(FlowError::InvalidDefinition(format!(
                "route id '{}' registered twice",
                route.id
            )));
        }
        self.routes.insert(route.id.clone(), Arc::new(route));
        Ok(())
    }

    pub fn route(&self, id: &str) -> Option<Arc<Route>> {
        self.routes.get(id).cloned()
    }

    pub fn route_by_title(&self, title: &str) -> Option<Arc<Route>> {
        self.routes.values().find(|r| r.title == title).cloned()
    }

    pub fn routes(&self) -> impl Iterator<Item = &Arc<Route>> {
        self.routes.values()
    }

    pub fn enter_route(&self, session: &mut SessionState, route_id: &str) -> Result<Arc<Route>> {
        let route = self
            .route(route_id)
            .ok_or_else(|| FlowError::UnknownRoute(route_id.to_string()))?;
        tracing::debug!(route = %route.id, session = %session.id, "entering route");
        session.enter_route(&route.id, &route.title);
        Ok(route)
    }

    pub fn enter_route_by_title(
        &self,
        session: &mut SessionState,
        title: &str,
    ) -> Result<Arc<Route>> {
        let route = self
            .route_by_title(title)
            .ok_or_else(|| FlowError::UnknownRoute(title.to_string()))?;
        session.enter_route(&route.id, &route.title);
        Ok(route)
    }

    /// Consume a queued post-completion transition, entering its target.
    pub fn apply_pending_transition(
        &self,
        session: &mut SessionState,
    ) -> Result<Option<Arc<Route>>> {
        let Some(pending) = session.take_pending_transition() else {
            return Ok(None);
        };
        let route = self
            .route_by_title(&pending.target_route)
            .ok_or_else(|| FlowError::UnknownRoute(pending.target_route.clone()))?;
        tracing::debug!(route = %route.id, "applying pending transition");
        session.enter_route(&route.id, &route.title);
        Ok(Some(route))
    }

    /// Mark the active route completed and queue its `on_complete` target.
    pub fn complete_route(&self, session: &mut SessionState) -> Result<()> {
        let pointer = session
            .current_route
            .clone()
            .ok_or_else(|| FlowError::UnknownRoute("<no active route>".to_string()))?;
        let route = self
            .route(&pointer.id)
            .ok_or_else(|| FlowError::UnknownRoute(pointer.id.clone()))?;
        let target = route.resolve_on_complete(session);
        session.exit_route(true);
        if let Some(title) = target {
            session.set_pending_transition(title);
        }
        tracing::debug!(route = %route.id, "route completed");
        Ok(())
    }

    /// Resolve the active step of the session's current route.
    ///
    /// The walk starts at the current step (or the route's initial step) and
    /// proceeds depth-first along the transition path, branches in
    /// declaration order. Per step the checks are sequenced when → requires
    /// → skip, and a step is passed over when its activation condition says
    /// no, a precondition is missing, its collect fields are already
    /// satisfied, or `skip_if` asks for it. A visited set keeps rejoining
    /// branches from re-expanding.
    pub async fn resolve(
        &self,
        session: &SessionState,
        ctx: &EvaluationContext,
    ) -> Result<StepResolution> {
        let pointer = session
            .current_route
            .as_ref()
            .ok_or_else(|| FlowError::UnknownRoute("<no active route>".to_string()))?;
        let route = self
            .route(&pointer.id)
            .ok_or_else(|| FlowError::UnknownRoute(pointer.id.clone()))?;

        let start = session
            .current_step
            .as_ref()
            .map(|s| s.id.clone())
            .unwrap_or_else(|| route.initial_step.clone());

        let mut rationale = Vec::new();
        let mut visited: HashSet<String> = HashSet::new();
        let mut stack: Vec<String> = vec![start];
        let mut reached_end = false;

        while let Some(step_id) = stack.pop() {
            if !visited.insert(step_id.clone()) {
                continue;
            }
            let step = route.step(&step_id).ok_or_else(|| FlowError::UnknownStep {
                route: route.id.clone(),
                step: step_id.clone(),
            })?;

            if self.step_is_active(step, ctx, &mut rationale).await {
                tracing::debug!(route = %route.id, step = %step.id, "step resolved");
                return Ok(StepResolution::Active {
                    step_id: step.id.clone(),
                    rationale,
                });
            }

            if step.transition.is_end() {
                reached_end = true;
                continue;
            }
            for target in step.transition.targets().into_iter().rev() {
                stack.push(target.to_string());
            }
        }

        // Completion is only decided once every pending path has been tried,
        // so a skipped terminal sibling cannot shortcut branch exploration.
        if reached_end && route.is_complete(&ctx.data) {
            return Ok(StepResolution::RouteComplete { rationale });
        }
        Ok(StepResolution::Exhausted { rationale })
    }

    async fn step_is_active(
        &self,
        step: &Step,
        ctx: &EvaluationContext,
        rationale: &mut Vec<String>,
    ) -> bool {
        let when = step.evaluate_when(ctx).await;
        rationale.extend(when.rationale);
        if !when.should_activate {
            return false;
        }
        if !step.has_requires(&ctx.data) {
            return false;
        }
        if step.is_satisfied(&ctx.data) {
            return false;
        }
        let skip = step.evaluate_skip_if(ctx).await;
        rationale.extend(skip.rationale);
        !skip.should_skip
    }
}
