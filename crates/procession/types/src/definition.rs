//! Workflow definitions: the static blueprint of states and transitions.
//!
//! A definition is identified by `(name, version)`; several versions of
//! one logical workflow may be registered side by side, and a process
//! records which version it was opened against. Definitions are immutable
//! once registered; to change one, register a new version.

use crate::{StateId, Transition, WorkflowError, WorkflowResult};
use serde::{Deserialize, Serialize};

/// A named state within a workflow definition
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateDef {
    pub id: StateId,
    /// Human-readable label; defaults to the id
    pub label: String,
}

impl StateDef {
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            label: id.clone(),
            id: StateId::new(id),
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }
}

// ── Workflow Definition ──────────────────────────────────────────────

/// The blueprint for one workflow name/version
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    /// Logical workflow name, unique together with `version`
    pub name: String,
    /// Definition version, starting at 1
    pub version: u32,
    /// Description of what this workflow accomplishes
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    /// Ordered states; the first is the default initial state unless
    /// `initial_state` overrides it
    pub states: Vec<StateDef>,
    /// Explicit initial state override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_state: Option<StateId>,
    /// Ordered transitions; order is significant for gateway resolution
    pub transitions: Vec<Transition>,
}

impl WorkflowDefinition {
    /// Create an empty definition at version 1
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: 1,
            description: String::new(),
            states: Vec::new(),
            initial_state: None,
            transitions: Vec::new(),
        }
    }

    pub fn with_version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_initial_state(mut self, state: impl Into<String>) -> Self {
        self.initial_state = Some(StateId::new(state));
        self
    }

    /// Add a state to the definition
    pub fn add_state(&mut self, state: StateDef) -> WorkflowResult<()> {
        if self.states.iter().any(|s| s.id == state.id) {
            return Err(WorkflowError::InvalidDefinition(format!(
                "duplicate state '{}' in workflow '{}'",
                state.id, self.name
            )));
        }
        self.states.push(state);
        Ok(())
    }

    /// Add a transition; both endpoints must already be declared states
    pub fn add_transition(&mut self, transition: Transition) -> WorkflowResult<()> {
        if self.transitions.iter().any(|t| t.name == transition.name) {
            return Err(WorkflowError::InvalidDefinition(format!(
                "duplicate transition '{}' in workflow '{}'",
                transition.name, self.name
            )));
        }
        for endpoint in [&transition.source, &transition.destination] {
            if !self.has_state(endpoint) {
                return Err(WorkflowError::InvalidDefinition(format!(
                    "transition '{}' references unknown state '{}'",
                    transition.name, endpoint
                )));
            }
        }
        self.transitions.push(transition);
        Ok(())
    }

    // ── Lookups ──────────────────────────────────────────────────────

    pub fn has_state(&self, id: &StateId) -> bool {
        self.states.iter().any(|s| &s.id == id)
    }

    pub fn state(&self, id: &StateId) -> Option<&StateDef> {
        self.states.iter().find(|s| &s.id == id)
    }

    /// Display label for a state; falls back to the raw id
    pub fn state_label<'a>(&'a self, id: &'a StateId) -> &'a str {
        self.state(id).map(|s| s.label.as_str()).unwrap_or(id.as_str())
    }

    pub fn transition(&self, name: &str) -> Option<&Transition> {
        self.transitions.iter().find(|t| t.name == name)
    }

    /// Outgoing transitions from a state, in definition order
    pub fn outgoing(&self, state: &StateId) -> Vec<&Transition> {
        self.transitions.iter().filter(|t| &t.source == state).collect()
    }

    /// The initial state: the explicit override if set, else the first
    /// declared state
    pub fn initial_state(&self) -> Option<&StateId> {
        self.initial_state
            .as_ref()
            .or_else(|| self.states.first().map(|s| &s.id))
    }

    /// Validate structural invariants.
    ///
    /// Meant for definitions assembled by deserialization rather than
    /// through `add_state`/`add_transition`, which enforce the same
    /// rules incrementally.
    pub fn validate(&self) -> WorkflowResult<()> {
        if self.version == 0 {
            return Err(WorkflowError::InvalidDefinition(format!(
                "workflow '{}' version must be at least 1",
                self.name
            )));
        }
        let mut seen_states = Vec::new();
        for state in &self.states {
            if seen_states.contains(&&state.id) {
                return Err(WorkflowError::InvalidDefinition(format!(
                    "duplicate state '{}' in workflow '{}'",
                    state.id, self.name
                )));
            }
            seen_states.push(&state.id);
        }
        let mut seen_names = Vec::new();
        for transition in &self.transitions {
            if seen_names.contains(&&transition.name) {
                return Err(WorkflowError::InvalidDefinition(format!(
                    "duplicate transition '{}' in workflow '{}'",
                    transition.name, self.name
                )));
            }
            seen_names.push(&transition.name);
            for endpoint in [&transition.source, &transition.destination] {
                if !self.has_state(endpoint) {
                    return Err(WorkflowError::InvalidDefinition(format!(
                        "transition '{}' references unknown state '{}'",
                        transition.name, endpoint
                    )));
                }
            }
        }
        if let Some(initial) = &self.initial_state {
            if !self.has_state(initial) {
                return Err(WorkflowError::InvalidDefinition(format!(
                    "initial state '{}' is not declared in workflow '{}'",
                    initial, self.name
                )));
            }
        }
        Ok(())
    }
}
