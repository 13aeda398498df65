//! Task records: pending manual steps.
//!
//! A task marks the state a process is waiting in. Its `task` field is
//! the source state of the pending manual transition: completing the
//! task supplies the transition name to execute, which is what
//! differentiates the outgoing edges of a gateway state. The engine only
//! ever sets `Created` and `Done`; `Assigned` and `Started` exist for
//! external trackers.

use crate::{GroupId, ProcessId, StateId, TaskId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;

/// Lifecycle state of a task
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    #[default]
    Created,
    Assigned,
    Started,
    Done,
}

impl TaskState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Assigned => "assigned",
            Self::Started => "started",
            Self::Done => "done",
        }
    }
}

/// A persisted manual step awaiting completion
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Unique record identifier
    pub id: TaskId,
    /// Owning process
    pub process_id: ProcessId,
    /// The source state this task represents
    pub task: StateId,
    /// Display label of that state
    pub name: String,
    pub state: TaskState,
    /// Assigned users; empty together with `groups` means open to all
    pub users: BTreeSet<UserId>,
    /// Assigned groups
    pub groups: BTreeSet<GroupId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Opaque payload, e.g. a completion reason
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub data: Map<String, Value>,
}

impl Task {
    /// Create a fresh task in the `Created` state
    pub fn new(process_id: ProcessId, task: StateId, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: TaskId::generate(),
            process_id,
            task,
            name: name.into(),
            state: TaskState::Created,
            users: BTreeSet::new(),
            groups: BTreeSet::new(),
            created_at: now,
            updated_at: now,
            data: Map::new(),
        }
    }

    /// A task is open until it is done
    pub fn is_open(&self) -> bool {
        self.state != TaskState::Done
    }

    /// Neither users nor groups assigned
    pub fn is_unassigned(&self) -> bool {
        self.users.is_empty() && self.groups.is_empty()
    }

    /// Replace the assignment. Overwrite-based, not additive: repeated
    /// advances landing on the same open task converge on the latest
    /// resolver output.
    pub fn assign(&mut self, users: BTreeSet<UserId>, groups: BTreeSet<GroupId>) {
        self.users = users;
        self.groups = groups;
        self.updated_at = Utc::now();
    }

    /// Mark the task done. Terminal; tasks are never re-opened.
    pub fn mark_done(&mut self) {
        self.state = TaskState::Done;
        self.updated_at = Utc::now();
    }

    /// Merge extra payload entries into the task data
    pub fn merge_data(&mut self, extra: Map<String, Value>) {
        for (key, value) in extra {
            self.data.insert(key, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_task() -> Task {
        Task::new(
            ProcessId::generate(),
            StateId::new("submitted"),
            "Waiting for review",
        )
    }

    #[test]
    fn test_new_task_is_open_and_unassigned() {
        let task = make_task();
        assert_eq!(task.state, TaskState::Created);
        assert!(task.is_open());
        assert!(task.is_unassigned());
    }

    #[test]
    fn test_assign_overwrites() {
        let mut task = make_task();
        let users = |names: &[&str]| names.iter().map(|n| UserId::new(*n)).collect::<BTreeSet<_>>();

        task.assign(users(&["alice", "bob"]), BTreeSet::new());
        assert_eq!(task.users.len(), 2);

        task.assign(users(&["carol"]), BTreeSet::new());
        assert_eq!(task.users.len(), 1);
        assert!(task.users.contains(&UserId::new("carol")));
    }

    #[test]
    fn test_mark_done_closes() {
        let mut task = make_task();
        task.mark_done();
        assert_eq!(task.state, TaskState::Done);
        assert!(!task.is_open());
    }

    #[test]
    fn test_merge_data() {
        let mut task = make_task();
        let mut extra = Map::new();
        extra.insert("reason".to_string(), serde_json::json!("approved by alice"));
        task.merge_data(extra);
        assert_eq!(task.data["reason"], "approved by alice");
    }

    #[test]
    fn test_task_state_serialization() {
        assert_eq!(TaskState::Created.as_str(), "created");
        let json = serde_json::to_string(&TaskState::Done).unwrap();
        assert_eq!(json, r#""done""#);
    }
}
