//! In-memory reference implementation of the storage traits.
//!
//! This adapter is deterministic and test-friendly. Transactions take a
//! full snapshot and serialize on a single mutex, coarser than the
//! per-row scope a relational backend provides, but with identical
//! visibility guarantees: a failed unit leaves nothing behind.
//! Transactions do not nest.

use crate::traits::{ProcessStore, TaskStore, WorkflowStore};
use crate::{StoreError, StoreResult};
use chrono::Utc;
use parking_lot::lock_api::ArcMutexGuard;
use parking_lot::{Mutex, RawMutex, RwLock};
use procession_types::{Process, ProcessId, StateId, TargetRef, Task, TaskId};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone, Default)]
struct Records {
    processes: HashMap<ProcessId, Process>,
    /// (entity type, entity id, workflow name) → process, the unique key
    by_target: HashMap<(String, String, String), ProcessId>,
    tasks: HashMap<TaskId, Task>,
}

/// Guard for a held process row lock; released on drop.
pub struct ProcessRowLock {
    _guard: ArcMutexGuard<RawMutex, ()>,
}

/// In-memory workflow storage adapter.
pub struct MemoryStore {
    records: RwLock<Records>,
    row_locks: Mutex<HashMap<ProcessId, Arc<Mutex<()>>>>,
    tx_lock: Mutex<()>,
    lock_timeout: Duration,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override how long [`lock_process`](ProcessStore::lock_process)
    /// blocks before failing with a retryable timeout
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    fn row_lock_cell(&self, id: &ProcessId) -> Arc<Mutex<()>> {
        let mut table = self.row_locks.lock();
        Arc::clone(table.entry(id.clone()).or_default())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self {
            records: RwLock::new(Records::default()),
            row_locks: Mutex::new(HashMap::new()),
            tx_lock: Mutex::new(()),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }
}

fn target_key(target: &TargetRef, workflow_name: &str) -> (String, String, String) {
    (
        target.entity_type.clone(),
        target.entity_id.clone(),
        workflow_name.to_string(),
    )
}

impl ProcessStore for MemoryStore {
    type Lock = ProcessRowLock;

    fn insert_process(&self, process: Process) -> StoreResult<Process> {
        let mut records = self.records.write();
        let key = target_key(&process.target, &process.workflow_name);
        if records.by_target.contains_key(&key) {
            return Err(StoreError::Conflict(format!(
                "process already exists for {} workflow '{}'",
                process.target, process.workflow_name
            )));
        }
        records.by_target.insert(key, process.id.clone());
        records.processes.insert(process.id.clone(), process.clone());
        Ok(process)
    }

    fn get_process(&self, id: &ProcessId) -> StoreResult<Process> {
        self.records
            .read()
            .processes
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("process {}", id)))
    }

    fn find_process(
        &self,
        target: &TargetRef,
        workflow_name: &str,
    ) -> StoreResult<Option<Process>> {
        let records = self.records.read();
        Ok(records
            .by_target
            .get(&target_key(target, workflow_name))
            .and_then(|id| records.processes.get(id))
            .cloned())
    }

    fn save_process(&self, process: &mut Process) -> StoreResult<()> {
        let mut records = self.records.write();
        if !records.processes.contains_key(&process.id) {
            return Err(StoreError::NotFound(format!("process {}", process.id)));
        }
        process.updated_at = Utc::now();
        records.processes.insert(process.id.clone(), process.clone());
        Ok(())
    }

    fn lock_process(&self, id: &ProcessId) -> StoreResult<Self::Lock> {
        if !self.records.read().processes.contains_key(id) {
            return Err(StoreError::NotFound(format!("process {}", id)));
        }
        let cell = self.row_lock_cell(id);
        match cell.try_lock_arc_for(self.lock_timeout) {
            Some(guard) => Ok(ProcessRowLock { _guard: guard }),
            None => Err(StoreError::LockTimeout(format!(
                "process {} is locked by another caller",
                id
            ))),
        }
    }
}

impl TaskStore for MemoryStore {
    fn insert_task(&self, task: Task) -> StoreResult<Task> {
        let mut records = self.records.write();
        if !records.processes.contains_key(&task.process_id) {
            return Err(StoreError::NotFound(format!("process {}", task.process_id)));
        }
        let open_exists = records
            .tasks
            .values()
            .any(|t| t.process_id == task.process_id && t.task == task.task && t.is_open());
        if open_exists {
            return Err(StoreError::Conflict(format!(
                "open task already exists for process {} state '{}'",
                task.process_id, task.task
            )));
        }
        records.tasks.insert(task.id.clone(), task.clone());
        Ok(task)
    }

    fn get_task(&self, id: &TaskId) -> StoreResult<Task> {
        self.records
            .read()
            .tasks
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("task {}", id)))
    }

    fn open_task(&self, process: &ProcessId, source: &StateId) -> StoreResult<Option<Task>> {
        let records = self.records.read();
        Ok(records
            .tasks
            .values()
            .filter(|t| &t.process_id == process && &t.task == source && t.is_open())
            .min_by_key(|t| t.created_at)
            .cloned())
    }

    fn save_task(&self, task: &mut Task) -> StoreResult<()> {
        let mut records = self.records.write();
        if !records.tasks.contains_key(&task.id) {
            return Err(StoreError::NotFound(format!("task {}", task.id)));
        }
        task.updated_at = Utc::now();
        records.tasks.insert(task.id.clone(), task.clone());
        Ok(())
    }

    fn tasks_for_process(&self, process: &ProcessId) -> StoreResult<Vec<Task>> {
        let records = self.records.read();
        let mut tasks: Vec<Task> = records
            .tasks
            .values()
            .filter(|t| &t.process_id == process)
            .cloned()
            .collect();
        tasks.sort_by_key(|t| t.created_at);
        Ok(tasks)
    }
}

impl WorkflowStore for MemoryStore {
    fn transaction<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&Self) -> Result<T, E>,
        E: From<StoreError>,
    {
        let _serial = self.tx_lock.lock();
        let snapshot = self.records.read().clone();
        match f(self) {
            Ok(value) => Ok(value),
            Err(err) => {
                *self.records.write() = snapshot;
                Err(err)
            }
        }
    }
}
