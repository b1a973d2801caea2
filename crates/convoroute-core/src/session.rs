//! Session state: the mutable record of a single conversation.
//!
//! `data` always reflects exactly the fields collected by the active route.
//! When the session leaves a route, the route's fields are snapshotted into
//! `data_by_route` so a later re-entry resumes its own collected state
//! instead of inheriting another route's fields.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutePointer {
    pub id: String,
    pub title: String,
    pub entered_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepPointer {
    pub id: String,
    #[serde(default)]
    pub description: String,
    pub entered_at: DateTime<Utc>,
}

/// One entry in the append-only route audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteVisit {
    pub route_id: String,
    pub entered_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exited_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionMetadata {
    pub created_at: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub extra: HashMap<String, Value>,
}

impl Default for SessionMetadata {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            created_at: now,
            last_updated_at: now,
            extra: HashMap::new(),
        }
    }
}

/// Queued route change produced by a completed route's `on_complete`,
/// consumed at the start of the next turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingTransition {
    pub target_route: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub id: String,
    #[serde(default)]
    pub data: HashMap<String, Value>,
    #[serde(default)]
    pub data_by_route: HashMap<String, HashMap<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_route: Option<RoutePointer>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_step: Option<StepPointer>,
    #[serde(default)]
    pub route_history: Vec<RouteVisit>,
    #[serde(default)]
    pub metadata: SessionMetadata,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_transition: Option<PendingTransition>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::with_id(Uuid::new_v4().to_string())
    }

    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            data: HashMap::new(),
            data_by_route: HashMap::new(),
            current_route: None,
            current_step: None,
            route_history: Vec::new(),
            metadata: SessionMetadata::default(),
            pending_transition: None,
        }
    }

    pub fn touch(&mut self) {
        self.metadata.last_updated_at = Utc::now();
    }

    /// Switch the session into a route: snapshot the outgoing route's data,
    /// stamp its history entry, restore the incoming route's saved data (or
    /// empty on first visit) and append a fresh history entry.
    pub fn enter_route(&mut self, route_id: impl Into<String>, route_title: impl Into<String>) {
        let route_id = route_id.into();
        self.leave_current_route(false);
        self.data = self
            .data_by_route
            .get(&route_id)
            .cloned()
            .unwrap_or_default();
        let now = Utc::now();
        self.current_route = Some(RoutePointer {
            id: route_id.clone(),
            title: route_title.into(),
            entered_at: now,
        });
        self.route_history.push(RouteVisit {
            route_id,
            entered_at: now,
            exited_at: None,
            completed: false,
        });
        self.touch();
    }

    /// Leave the active route, marking the open history entry.
    pub fn exit_route(&mut self, completed: bool) {
        self.leave_current_route(completed);
        self.touch();
    }

    fn leave_current_route(&mut self, completed: bool) {
        if let Some(current) = self.current_route.take() {
            let data = std::mem::take(&mut self.data);
            self.data_by_route.insert(current.id.clone(), data);
            if let Some(entry) = self
                .route_history
                .iter_mut()
                .rev()
                .find(|v| v.route_id == current.id && v.exited_at.is_none())
            {
                entry.exited_at = Some(Utc::now());
                entry.completed = completed;
            }
        }
        self.current_step = None;
    }

    /// Shallow-merge a patch into the active route's collected data. Later
    /// keys win; the per-route mirror is kept in sync.
    pub fn merge_collected(&mut self, patch: HashMap<String, Value>) {
        if patch.is_empty() {
            return;
        }
        for (key, value) in patch {
            self.data.insert(key, value);
        }
        if let Some(route) = &self.current_route {
            self.data_by_route.insert(route.id.clone(), self.data.clone());
        }
        self.touch();
    }

    /// Point the session at a step. Re-pointing at the step already active
    /// keeps its original `entered_at`.
    pub fn set_current_step(&mut self, step_id: impl Into<String>, description: impl Into<String>) {
        let step_id = step_id.into();
        let already_there = self
            .current_step
            .as_ref()
            .map(|s| s.id == step_id)
            .unwrap_or(false);
        if already_there {
            return;
        }
        self.current_step = Some(StepPointer {
            id: step_id,
            description: description.into(),
            entered_at: Utc::now(),
        });
        self.touch();
    }

    pub fn set_pending_transition(&mut self, target_route: impl Into<String>) {
        self.pending_transition = Some(PendingTransition {
            target_route: target_route.into(),
            condition: None,
        });
        self.touch();
    }

    /// Consume the queued transition, if any.
    pub fn take_pending_transition(&mut self) -> Option<PendingTransition> {
        let pending = self.pending_transition.take();
        if pending.is_some() {
            self.touch();
        }
        pending
    }

    pub fn in_route(&self) -> bool {
        self.current_route.is_some()
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

/// A value counts as present when it is defined and non-empty. `Null` and
/// the empty string are treated as empty.
pub fn value_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.is_empty(),
        _ => true,
    }
}
