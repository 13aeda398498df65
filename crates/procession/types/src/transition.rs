//! Transitions: directed edges between workflow states.
//!
//! A transition is either automatic, executed as soon as the engine
//! reaches its source state, or manual, in which case the engine pauses
//! and (unless `create_task` is disabled) records a task for a human to
//! complete. The struct derives `Hash`: its immutable field set is the
//! cache key for assignment resolution.

use crate::StateId;
use serde::{Deserialize, Serialize};

/// A directed edge from a source state to a destination state
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Transition {
    /// Unique name within the definition; doubles as the action key
    pub name: String,
    /// State this transition leaves from
    pub source: StateId,
    /// State this transition arrives at
    pub destination: StateId,
    /// Manual transitions wait for an external completion
    #[serde(default)]
    pub manual: bool,
    /// Whether reaching a manual transition records a task
    #[serde(default = "default_create_task")]
    pub create_task: bool,
    /// Human-readable label
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Description of what this transition does
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

fn default_create_task() -> bool {
    true
}

impl Transition {
    /// Create an automatic transition
    pub fn automatic(
        name: impl Into<String>,
        source: impl Into<String>,
        destination: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            source: StateId::new(source),
            destination: StateId::new(destination),
            manual: false,
            create_task: true,
            label: None,
            description: None,
        }
    }

    /// Create a manual transition (records a task when reached)
    pub fn manual(
        name: impl Into<String>,
        source: impl Into<String>,
        destination: impl Into<String>,
    ) -> Self {
        Self {
            manual: true,
            ..Self::automatic(name, source, destination)
        }
    }

    /// Disable task creation: the transition stays manual in name but
    /// is executed directly when the engine reaches it
    pub fn without_task(mut self) -> Self {
        self.create_task = false;
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Label if set, otherwise the transition name
    pub fn display_label(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.name)
    }

    /// True when reaching this transition pauses the engine behind a task
    pub fn pauses(&self) -> bool {
        self.manual && self.create_task
    }
}
