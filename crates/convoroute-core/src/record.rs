//! Persistence-friendly session shape.
//!
//! `SessionRecord` is what stores serialize. The transforms between it and
//! `SessionState` are pure and total; a save/load cycle reproduces every
//! field verbatim, timestamps included, so multiple instances sharing one
//! store see identical state.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::session::{
    PendingTransition, RoutePointer, RouteVisit, SessionMetadata, SessionState, StepPointer,
};

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CollectedData {
    #[serde(default)]
    pub data: HashMap<String, Value>,
    #[serde(default)]
    pub data_by_route: HashMap<String, HashMap<String, Value>>,
    #[serde(default)]
    pub route_history: Vec<RouteVisit>,
    #[serde(default)]
    pub metadata: SessionMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_route: Option<RoutePointer>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_step: Option<StepPointer>,
    pub collected_data: CollectedData,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_transition: Option<PendingTransition>,
}

impl SessionState {
    pub fn to_record(&self) -> SessionRecord {
        SessionRecord {
            id: self.id.clone(),
            current_route: self.current_route.clone(),
            current_step: self.current_step.clone(),
            collected_data: CollectedData {
                data: self.data.clone(),
                data_by_route: self.data_by_route.clone(),
                route_history: self.route_history.clone(),
                metadata: self.metadata.clone(),
            },
            pending_transition: self.pending_transition.clone(),
        }
    }

    pub fn from_record(record: SessionRecord) -> Self {
        Self {
            id: record.id,
            data: record.collected_data.data,
            data_by_route: record.collected_data.data_by_route,
            current_route: record.current_route,
            current_step: record.current_step,
            route_history: record.collected_data.route_history,
            metadata: record.collected_data.metadata,
            pending_transition: record.pending_transition,
        }
    }
}
