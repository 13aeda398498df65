//! Storage traits the engine core is written against.
//!
//! All methods are synchronous: suspension happens at the storage
//! boundary and blocks the calling thread. Mutating operations are
//! expected to be invoked from inside [`WorkflowStore::transaction`];
//! the engine follows that discipline throughout.

use crate::StoreResult;
use procession_types::{Process, ProcessId, StateId, TargetRef, Task, TaskId};

/// Storage interface for process records.
pub trait ProcessStore: Send + Sync {
    /// Guard type returned by [`lock_process`](Self::lock_process);
    /// the lock is released when the guard drops.
    type Lock;

    /// Insert a new process row. Fails with [`StoreError::Conflict`]
    /// when a row already exists for the same (target, workflow name);
    /// the caller re-reads and converges on the winner's record.
    ///
    /// [`StoreError::Conflict`]: crate::StoreError::Conflict
    fn insert_process(&self, process: Process) -> StoreResult<Process>;

    /// Get one process by id.
    fn get_process(&self, id: &ProcessId) -> StoreResult<Process>;

    /// Find the process bound to a target for a workflow name, if any.
    fn find_process(&self, target: &TargetRef, workflow_name: &str)
        -> StoreResult<Option<Process>>;

    /// Persist a process mutation, refreshing `updated_at` in place.
    fn save_process(&self, process: &mut Process) -> StoreResult<()>;

    /// Take the pessimistic row lock for one process ("select for
    /// update" semantics). Blocks up to the backend's timeout, then
    /// fails with [`StoreError::LockTimeout`](crate::StoreError::LockTimeout).
    fn lock_process(&self, id: &ProcessId) -> StoreResult<Self::Lock>;
}

/// Storage interface for task records.
pub trait TaskStore: Send + Sync {
    /// Insert a new task row. Fails with `Conflict` when an open task
    /// already exists for the same (process, source state).
    fn insert_task(&self, task: Task) -> StoreResult<Task>;

    /// Get one task by id.
    fn get_task(&self, id: &TaskId) -> StoreResult<Task>;

    /// The open (non-done) task for a (process, source state), if any.
    fn open_task(&self, process: &ProcessId, source: &StateId) -> StoreResult<Option<Task>>;

    /// Persist a task mutation, refreshing `updated_at` in place.
    fn save_task(&self, task: &mut Task) -> StoreResult<()>;

    /// All tasks of a process, oldest first.
    fn tasks_for_process(&self, process: &ProcessId) -> StoreResult<Vec<Task>>;
}

/// The storage bundle the engine requires.
pub trait WorkflowStore: ProcessStore + TaskStore {
    /// Run `f` as one atomic unit: when it returns `Err`, nothing it
    /// wrote is visible afterwards.
    fn transaction<T, E, F>(&self, f: F) -> Result<T, E>
    where
        Self: Sized,
        F: FnOnce(&Self) -> Result<T, E>,
        E: From<crate::StoreError>;
}
