//! Procession Storage Boundary
//!
//! The engine core is written against the traits in this crate and never
//! against a concrete backend. The contract a backend must provide is
//! small but strict:
//!
//! - **insert-or-conflict** process creation on the unique
//!   (target, workflow name) key, so concurrent first-time openers
//!   converge on one row;
//! - **pessimistic row locks** scoped to one process, acquired with a
//!   timeout, the serialization point for task creation;
//! - **transactions**: a failed unit leaves nothing visible.
//!
//! [`MemoryStore`] is the deterministic, test-friendly reference
//! adapter. Production deployments should use a transactional relational
//! backend for source-of-truth data.

#![deny(unsafe_code)]

mod error;
mod memory;
mod traits;

pub use error::{StoreError, StoreResult};
pub use memory::{MemoryStore, ProcessRowLock};
pub use traits::{ProcessStore, TaskStore, WorkflowStore};
