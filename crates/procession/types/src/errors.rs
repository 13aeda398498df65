//! Error types for the workflow domain.
//!
//! Validation-class errors (`UnknownTransition`, `InvalidTransition`,
//! `TaskAlreadyProcessed`) are expected to be reported back to the
//! caller as rejected requests. Configuration-class errors
//! (`InvalidDefinition`, `TransitionAmbiguous`, `CircularWorkflow`)
//! indicate an authoring bug and should fail loudly.

use crate::{StateId, TargetRef, TaskId};

/// Errors that can occur in workflow operations
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("workflow '{name}' version {version} is not registered")]
    NotRegistered { name: String, version: u32 },

    #[error("invalid workflow definition: {0}")]
    InvalidDefinition(String),

    #[error("no transition available from state '{state}'")]
    TransitionUnavailable { state: StateId },

    #[error("ambiguous transitions from state '{state}': {count} outgoing and not all manual")]
    TransitionAmbiguous { state: StateId, count: usize },

    #[error("circular workflow: transition '{transition}' resolved twice in one advance")]
    CircularWorkflow { transition: String },

    #[error("transition '{name}' does not exist")]
    UnknownTransition { name: String },

    #[error("transition '{name}' cannot fire from state '{state}'")]
    InvalidTransition { name: String, state: StateId },

    #[error("task {task} was already processed")]
    TaskAlreadyProcessed { task: TaskId },

    #[error("target entity {target} not found")]
    TargetNotFound { target: TargetRef },
}

/// Result type alias for workflow operations
pub type WorkflowResult<T> = Result<T, WorkflowError>;
