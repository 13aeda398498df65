//! Procession Transition Engine
//!
//! The engine decides, given a workflow definition and a process's
//! current state, what happens next, who may act on it, and how
//! concurrent triggers stay safe and idempotent.
//!
//! # Architecture
//!
//! - [`Registry`]: explicit (name, version) → [`Workflow`] lookup,
//!   populated once at startup. No hidden global state.
//! - [`Workflow`]: a definition plus behavior: the transition action
//!   table and the assignment resolvers.
//! - [`Engine`]: opens processes, drives the advance loop, creates and
//!   completes tasks. Every mutation runs inside a store transaction
//!   under the process row lock.
//! - [`AssignmentCache`]: explicit, injectable memoization of resolver
//!   output, keyed by the transition's immutable fields.
//! - [`Authorizer`]: the read path: which transitions a given user may
//!   see and execute. Resolves assignees speculatively, never creates a
//!   task.
//! - [`EntityDirectory`]: maps a target entity type to its accessor
//!   capability (existence check, permission namespace).
//!
//! # Advance loop
//!
//! [`Engine::advance`] executes automatic transitions until the process
//! reaches a state with no outgoing transition, a manual transition
//! records a task, or a transition name repeats within the invocation
//! (a definition cycle, reported as
//! [`CircularWorkflow`](procession_types::WorkflowError::CircularWorkflow)).

#![deny(unsafe_code)]

mod assignment;
mod authorization;
mod engine;
mod entity;
mod error;
mod registry;
mod workflow;

pub use assignment::{Assignees, AssignmentCache};
pub use authorization::{Authorizer, MemoryPermissions, Permission, PermissionLookup};
pub use engine::{Advance, Engine};
pub use entity::{EntityAccessor, EntityDirectory, MemoryEntities};
pub use error::{EngineError, EngineResult};
pub use registry::Registry;
pub use workflow::{
    GroupResolver, TransitionAction, TransitionHandler, UserResolver, Workflow,
};
