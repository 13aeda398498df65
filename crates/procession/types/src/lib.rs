//! Procession Domain Types
//!
//! A workflow in Procession is a named, versioned finite-state machine.
//! An external entity is bound to a workflow through a **Process** record
//! that tracks its current state; the process moves between states via
//! **Transitions**, which are either automatic (executed immediately) or
//! manual (paused behind a human-completed **Task**).
//!
//! # Key Concepts
//!
//! - **WorkflowDefinition**: The static blueprint of ordered states and
//!   named transitions for one workflow name/version.
//! - **Transition**: A directed edge from a source state to a destination
//!   state, tagged automatic or manual.
//! - **Process**: A persisted instance of a definition bound to one
//!   target entity, tracking current state. At most one process exists
//!   per (target, workflow name).
//! - **Task**: A persisted record of a pending manual transition,
//!   carrying assignment and completion state.
//!
//! # Design Principles
//!
//! 1. Definitions are plain data. Behavior (actions, assignment
//!    resolvers) attaches at registration time, in the engine crate.
//! 2. Process state is mutated only by the transition engine.
//! 3. A task is keyed by the state it waits in, not by the transition
//!    that will leave it; completing the task names the transition.

#![deny(unsafe_code)]

mod definition;
mod errors;
mod identity;
mod process;
mod task;
mod transition;

pub use definition::*;
pub use errors::*;
pub use identity::*;
pub use process::*;
pub use task::*;
pub use transition::*;
