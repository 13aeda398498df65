//! Process records: persisted workflow instances.
//!
//! A process binds one target entity to one workflow and tracks its
//! current state. At most one process exists per (target, workflow name);
//! the store enforces that uniqueness even under concurrent creation.
//! Only the transition engine mutates `state`.

use crate::{ProcessId, StateId, TargetRef};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A persisted workflow instance bound to one target entity
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Process {
    /// Unique record identifier
    pub id: ProcessId,
    /// The external entity this process governs
    pub target: TargetRef,
    /// Name of the bound workflow
    pub workflow_name: String,
    /// Version of the bound workflow; may evolve in place
    pub workflow_version: u32,
    /// Current state; always a member of the bound definition's states
    pub state: StateId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Caller-defined metadata
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub data: Map<String, Value>,
}

impl Process {
    /// Create a fresh process record in the given state
    pub fn new(
        target: TargetRef,
        workflow_name: impl Into<String>,
        workflow_version: u32,
        state: StateId,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: ProcessId::generate(),
            target,
            workflow_name: workflow_name.into(),
            workflow_version,
            state,
            created_at: now,
            updated_at: now,
            data: Map::new(),
        }
    }

    pub fn with_data(mut self, key: impl Into<String>, value: Value) -> Self {
        self.data.insert(key.into(), value);
        self
    }

    /// Move to a new state. Reserved for the transition engine.
    pub fn move_to(&mut self, state: StateId) {
        self.state = state;
        self.updated_at = Utc::now();
    }

    pub fn is_in(&self, state: &StateId) -> bool {
        &self.state == state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_process() {
        let process = Process::new(
            TargetRef::new("billing.invoice", "42"),
            "approval",
            1,
            StateId::new("created"),
        );
        assert!(process.is_in(&StateId::new("created")));
        assert_eq!(process.workflow_name, "approval");
        assert_eq!(process.created_at, process.updated_at);
        assert!(process.data.is_empty());
    }

    #[test]
    fn test_move_to_touches_updated_at() {
        let mut process = Process::new(
            TargetRef::new("billing.invoice", "42"),
            "approval",
            1,
            StateId::new("created"),
        );
        let before = process.updated_at;
        process.move_to(StateId::new("submitted"));
        assert!(process.is_in(&StateId::new("submitted")));
        assert!(process.updated_at >= before);
    }

    #[test]
    fn test_with_data() {
        let process = Process::new(
            TargetRef::new("billing.invoice", "42"),
            "approval",
            1,
            StateId::new("created"),
        )
        .with_data("priority", serde_json::json!("high"));
        assert_eq!(process.data["priority"], "high");
    }
}
