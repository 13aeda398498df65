//! The transition engine: open, advance, complete.
//!
//! Every mutating operation runs as one store transaction holding the
//! process row lock, so concurrent triggers against the same process
//! observe a total order on task creation and a failed unit leaves
//! nothing behind.
//!
//! Single-step resolution policy: with one outgoing transition it is
//! taken; with several that are all manual, the first in definition
//! order is picked: a gateway state, where authorization rather than
//! engine resolution differentiates the branches; with several not all
//! manual, the definition is malformed for automatic purposes and the
//! engine refuses.

use crate::{AssignmentCache, EngineError, EngineResult, EntityDirectory, Registry, TransitionAction, Workflow};
use procession_store::{StoreError, WorkflowStore};
use procession_types::{
    Process, ProcessId, StateId, TargetRef, Task, TaskId, TaskState, Transition, WorkflowDefinition,
    WorkflowError, WorkflowResult,
};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::sync::Arc;

/// Where an advance stopped
#[derive(Clone, Debug)]
pub enum Advance {
    /// A single step executed without reaching a pause point
    Moved {
        process: Process,
        executed: Vec<String>,
    },
    /// A manual transition was reached; its task awaits completion
    AwaitingTask {
        process: Process,
        task: Task,
        executed: Vec<String>,
    },
    /// No outgoing transition remains from the current state
    Exhausted {
        process: Process,
        executed: Vec<String>,
    },
}

impl Advance {
    pub fn process(&self) -> &Process {
        match self {
            Self::Moved { process, .. }
            | Self::AwaitingTask { process, .. }
            | Self::Exhausted { process, .. } => process,
        }
    }

    /// The pending task, when the advance paused behind one
    pub fn task(&self) -> Option<&Task> {
        match self {
            Self::AwaitingTask { task, .. } => Some(task),
            _ => None,
        }
    }

    /// Names of the transitions executed during this call, in order
    pub fn executed(&self) -> &[String] {
        match self {
            Self::Moved { executed, .. }
            | Self::AwaitingTask { executed, .. }
            | Self::Exhausted { executed, .. } => executed,
        }
    }
}

/// The transition engine over a storage backend
pub struct Engine<S> {
    registry: Arc<Registry>,
    store: S,
    entities: Option<Arc<EntityDirectory>>,
    cache: AssignmentCache,
}

impl<S: WorkflowStore> Engine<S> {
    pub fn new(registry: Arc<Registry>, store: S) -> Self {
        Self {
            registry,
            store,
            entities: None,
            cache: AssignmentCache::new(),
        }
    }

    /// Validate open targets against an entity directory
    pub fn with_entities(mut self, entities: Arc<EntityDirectory>) -> Self {
        self.entities = Some(entities);
        self
    }

    /// Share a resolution cache with an [`Authorizer`](crate::Authorizer)
    pub fn with_cache(mut self, cache: AssignmentCache) -> Self {
        self.cache = cache;
        self
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    // ── Process instantiation ────────────────────────────────────────

    /// Open the process binding `target` to a registered workflow.
    ///
    /// Returns the existing process unchanged when one exists
    /// (`initial` is ignored in that case). Otherwise creates it in
    /// `initial`, the definition's initial state, or the first declared
    /// state. Two concurrent callers converge on a single record: the
    /// loser of the insert race re-reads the winner's row.
    pub fn open(
        &self,
        name: &str,
        version: u32,
        target: TargetRef,
        initial: Option<StateId>,
    ) -> EngineResult<Process> {
        let workflow = self.registry.lookup(name, version)?;

        if let Some(entities) = &self.entities {
            if let Some(accessor) = entities.accessor(&target.entity_type) {
                if !accessor.exists(&target.entity_id) {
                    return Err(WorkflowError::TargetNotFound { target }.into());
                }
            }
        }

        if let Some(existing) = self.store.find_process(&target, name)? {
            return Ok(existing);
        }

        let state = initial
            .or_else(|| workflow.definition().initial_state().cloned())
            .ok_or_else(|| {
                WorkflowError::InvalidDefinition(format!(
                    "workflow '{}' declares no states and no initial state was supplied",
                    name
                ))
            })?;

        let process = Process::new(target.clone(), name, version, state);
        let inserted = self
            .store
            .transaction(|store| store.insert_process(process).map_err(EngineError::from));
        match inserted {
            Ok(process) => {
                tracing::info!(
                    process_id = %process.id,
                    workflow = %name,
                    target = %process.target,
                    state = %process.state,
                    "process opened"
                );
                Ok(process)
            }
            Err(EngineError::Store(StoreError::Conflict(_))) => {
                // Lost the creation race; converge on the winner's record
                self.store.find_process(&target, name)?.ok_or_else(|| {
                    StoreError::Backend(format!(
                        "process for {} workflow '{}' vanished after conflict",
                        target, name
                    ))
                    .into()
                })
            }
            Err(err) => Err(err),
        }
    }

    // ── Single-step resolution ───────────────────────────────────────

    /// Resolve the next transition from a state per the single-step
    /// policy described at module level
    pub fn next_transition<'d>(
        &self,
        definition: &'d WorkflowDefinition,
        state: &StateId,
    ) -> WorkflowResult<&'d Transition> {
        let outgoing = definition.outgoing(state);
        if outgoing.is_empty() {
            return Err(WorkflowError::TransitionUnavailable {
                state: state.clone(),
            });
        }
        if outgoing.len() == 1 || outgoing.iter().all(|t| t.manual) {
            return Ok(outgoing[0]);
        }
        Err(WorkflowError::TransitionAmbiguous {
            state: state.clone(),
            count: outgoing.len(),
        })
    }

    // ── Advancing ────────────────────────────────────────────────────

    /// Execute one step: the named transition if given (it must be
    /// outgoing from the current state), else the resolved next one
    pub fn advance_once(
        &self,
        process_id: &ProcessId,
        transition: Option<&str>,
    ) -> EngineResult<Advance> {
        self.store.transaction(|store| {
            let _row = store.lock_process(process_id)?;
            let mut process = store.get_process(process_id)?;
            let workflow = self
                .registry
                .lookup(&process.workflow_name, process.workflow_version)?;

            let transition = match transition {
                Some(name) => self.named_transition(workflow.definition(), &process.state, name)?,
                None => self.next_transition(workflow.definition(), &process.state)?,
            };

            if transition.pauses() {
                let task = self.ensure_task(store, workflow, &process, transition)?;
                Ok(Advance::AwaitingTask {
                    process,
                    task,
                    executed: Vec::new(),
                })
            } else {
                self.execute(store, workflow, &mut process, transition)?;
                let executed = vec![transition.name.clone()];
                Ok(Advance::Moved { process, executed })
            }
        })
    }

    /// Advance until no transition remains, a task pauses the workflow,
    /// or a cycle is detected
    pub fn advance(&self, process_id: &ProcessId) -> EngineResult<Advance> {
        self.store.transaction(|store| {
            let _row = store.lock_process(process_id)?;
            let mut process = store.get_process(process_id)?;
            let workflow = self
                .registry
                .lookup(&process.workflow_name, process.workflow_version)?;
            self.run_to_pause(store, workflow, &mut process, Vec::new())
        })
    }

    // ── Task completion ──────────────────────────────────────────────

    /// Complete a task: mark it done, attach `extra` to its payload,
    /// execute the named transition on the owning process, then keep
    /// advancing. One atomic unit: if the transition cannot fire, the
    /// done mark is rolled back with everything else.
    pub fn complete(
        &self,
        task_id: &TaskId,
        transition_name: &str,
        extra: Option<Map<String, Value>>,
    ) -> EngineResult<Advance> {
        self.store.transaction(|store| {
            let probe = store.get_task(task_id)?;
            let _row = store.lock_process(&probe.process_id)?;

            // Re-read under the lock; a concurrent completion may have
            // won the race between the probe and the lock.
            let mut task = store.get_task(task_id)?;
            if task.state != TaskState::Created {
                return Err(WorkflowError::TaskAlreadyProcessed {
                    task: task.id.clone(),
                }
                .into());
            }

            let mut process = store.get_process(&task.process_id)?;
            let workflow = self
                .registry
                .lookup(&process.workflow_name, process.workflow_version)?;

            task.mark_done();
            if let Some(extra) = extra {
                task.merge_data(extra);
            }
            store.save_task(&mut task)?;

            let transition =
                self.named_transition(workflow.definition(), &process.state, transition_name)?;
            self.execute(store, workflow, &mut process, transition)?;
            tracing::info!(
                task_id = %task.id,
                process_id = %process.id,
                transition = %transition_name,
                "task completed"
            );

            self.run_to_pause(store, workflow, &mut process, vec![transition.name.clone()])
        })
    }

    // ── Internal ─────────────────────────────────────────────────────

    /// The advance loop body; the caller holds the row lock
    fn run_to_pause(
        &self,
        store: &S,
        workflow: &Workflow,
        process: &mut Process,
        mut executed: Vec<String>,
    ) -> EngineResult<Advance> {
        // Transition names auto-executed within this invocation only
        let mut seen: HashSet<String> = HashSet::new();
        loop {
            let transition = match self.next_transition(workflow.definition(), &process.state) {
                Ok(transition) => transition,
                Err(WorkflowError::TransitionUnavailable { .. }) => {
                    return Ok(Advance::Exhausted {
                        process: process.clone(),
                        executed,
                    });
                }
                Err(err) => return Err(err.into()),
            };

            if transition.pauses() {
                let task = self.ensure_task(store, workflow, process, transition)?;
                return Ok(Advance::AwaitingTask {
                    process: process.clone(),
                    task,
                    executed,
                });
            }

            if !seen.insert(transition.name.clone()) {
                return Err(WorkflowError::CircularWorkflow {
                    transition: transition.name.clone(),
                }
                .into());
            }

            self.execute(store, workflow, process, transition)?;
            executed.push(transition.name.clone());
        }
    }

    /// Execute a transition: run its action, move the state, persist
    fn execute(
        &self,
        store: &S,
        workflow: &Workflow,
        process: &mut Process,
        transition: &Transition,
    ) -> EngineResult<()> {
        match workflow.action(&transition.name) {
            TransitionAction::Invoke(handler) => handler(process, transition)?,
            TransitionAction::Move => {}
        }
        process.move_to(transition.destination.clone());
        store.save_process(process)?;
        tracing::info!(
            process_id = %process.id,
            transition = %transition.name,
            state = %process.state,
            "transition executed"
        );
        Ok(())
    }

    /// The task-creation protocol; the caller holds the row lock.
    ///
    /// Idempotent get-or-create keyed by (process, source state), then
    /// overwrite-style assignment from the resolved candidates.
    fn ensure_task(
        &self,
        store: &S,
        workflow: &Workflow,
        process: &Process,
        transition: &Transition,
    ) -> EngineResult<Task> {
        let mut task = match store.open_task(&process.id, &transition.source)? {
            Some(existing) => existing,
            None => {
                let name = workflow
                    .definition()
                    .state_label(&transition.source)
                    .to_string();
                let created = store.insert_task(Task::new(
                    process.id.clone(),
                    transition.source.clone(),
                    name,
                ))?;
                tracing::info!(
                    task_id = %created.id,
                    process_id = %process.id,
                    state = %transition.source,
                    "task created"
                );
                created
            }
        };

        let assignees = self.cache.resolve(workflow, transition);
        task.assign(assignees.users, assignees.groups);
        store.save_task(&mut task)?;
        Ok(task)
    }

    /// Look up a transition by name and check it may fire from `state`
    fn named_transition<'d>(
        &self,
        definition: &'d WorkflowDefinition,
        state: &StateId,
        name: &str,
    ) -> WorkflowResult<&'d Transition> {
        let transition = definition
            .transition(name)
            .ok_or_else(|| WorkflowError::UnknownTransition {
                name: name.to_string(),
            })?;
        if &transition.source != state {
            return Err(WorkflowError::InvalidTransition {
                name: name.to_string(),
                state: state.clone(),
            });
        }
        Ok(transition)
    }
}

impl<S> std::fmt::Debug for Engine<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("workflows", &self.registry.count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{EntityDirectory, MemoryEntities};
    use procession_store::{MemoryStore, ProcessStore, TaskStore};
    use procession_types::{GroupId, StateDef, UserId};
    use parking_lot::RwLock;
    use std::thread;
    use std::time::Duration;

    fn linear_definition() -> WorkflowDefinition {
        let mut def = WorkflowDefinition::new("review");
        def.add_state(StateDef::new("created")).unwrap();
        def.add_state(StateDef::new("submitted").with_label("Waiting for review"))
            .unwrap();
        def.add_state(StateDef::new("done")).unwrap();
        def.add_transition(Transition::automatic("submit", "created", "submitted"))
            .unwrap();
        def.add_transition(Transition::manual("finish", "submitted", "done"))
            .unwrap();
        def
    }

    fn make_engine(workflow: Workflow) -> Engine<MemoryStore> {
        make_engine_with_store(workflow, MemoryStore::new())
    }

    fn make_engine_with_store(workflow: Workflow, store: MemoryStore) -> Engine<MemoryStore> {
        let mut registry = Registry::new();
        registry.register(workflow).unwrap();
        Engine::new(Arc::new(registry), store)
    }

    fn target(id: &str) -> TargetRef {
        TargetRef::new("demo.document", id)
    }

    // ── Process instantiation ────────────────────────────────────────

    #[test]
    fn test_open_uses_first_state_by_default() {
        let engine = make_engine(Workflow::new(linear_definition()));
        let process = engine.open("review", 1, target("d1"), None).unwrap();

        assert_eq!(process.state, StateId::new("created"));
        assert_eq!(process.workflow_name, "review");
        assert_eq!(process.workflow_version, 1);
    }

    #[test]
    fn test_open_honors_requested_initial_state() {
        let engine = make_engine(Workflow::new(linear_definition()));
        let process = engine
            .open("review", 1, target("d1"), Some(StateId::new("submitted")))
            .unwrap();
        assert_eq!(process.state, StateId::new("submitted"));
    }

    #[test]
    fn test_open_honors_definition_initial_override() {
        let def = linear_definition().with_initial_state("submitted");
        let engine = make_engine(Workflow::new(def));
        let process = engine.open("review", 1, target("d1"), None).unwrap();
        assert_eq!(process.state, StateId::new("submitted"));
    }

    #[test]
    fn test_open_returns_existing_unchanged() {
        let engine = make_engine(Workflow::new(linear_definition()));
        let process = engine.open("review", 1, target("d1"), None).unwrap();
        engine.advance(&process.id).unwrap();

        // The requested initial state is ignored for an existing process
        let reopened = engine
            .open("review", 1, target("d1"), Some(StateId::new("created")))
            .unwrap();
        assert_eq!(reopened.id, process.id);
        assert_eq!(reopened.state, StateId::new("submitted"));
    }

    #[test]
    fn test_open_unregistered_workflow_fails() {
        let engine = make_engine(Workflow::new(linear_definition()));
        let result = engine.open("fulfilment", 1, target("d1"), None);
        assert!(matches!(
            result,
            Err(EngineError::Workflow(WorkflowError::NotRegistered { .. }))
        ));
    }

    #[test]
    fn test_open_stateless_definition_requires_initial() {
        let engine = make_engine(Workflow::new(WorkflowDefinition::new("empty")));

        let result = engine.open("empty", 1, target("d1"), None);
        assert!(matches!(
            result,
            Err(EngineError::Workflow(WorkflowError::InvalidDefinition(_)))
        ));

        // With a supplied state the process opens and immediately rests
        let process = engine
            .open("empty", 1, target("d1"), Some(StateId::new("limbo")))
            .unwrap();
        let advance = engine.advance(&process.id).unwrap();
        assert!(matches!(advance, Advance::Exhausted { .. }));
    }

    #[test]
    fn test_open_validates_registered_targets() {
        let documents = Arc::new(MemoryEntities::new("demo"));
        documents.add("d1");
        let entities = EntityDirectory::new().with("demo.document", documents);

        let engine = make_engine(Workflow::new(linear_definition()))
            .with_entities(Arc::new(entities));

        assert!(engine.open("review", 1, target("d1"), None).is_ok());
        let result = engine.open("review", 1, target("d2"), None);
        assert!(matches!(
            result,
            Err(EngineError::Workflow(WorkflowError::TargetNotFound { .. }))
        ));

        // Entity types without an accessor are not validated
        let other = TargetRef::new("demo.note", "n1");
        assert!(engine.open("review", 1, other, None).is_ok());
    }

    #[test]
    fn test_concurrent_open_converges_on_one_record() {
        let engine = Arc::new(make_engine(Workflow::new(linear_definition())));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let engine = Arc::clone(&engine);
                thread::spawn(move || engine.open("review", 1, target("d1"), None).unwrap())
            })
            .collect();

        let ids: HashSet<ProcessId> = handles
            .into_iter()
            .map(|h| h.join().unwrap().id)
            .collect();
        assert_eq!(ids.len(), 1);

        let winner = ids.into_iter().next().unwrap();
        assert!(engine.store().get_process(&winner).is_ok());
    }

    // ── Single-step resolution ───────────────────────────────────────

    #[test]
    fn test_next_transition_policy() {
        let engine = make_engine(Workflow::new(linear_definition()));
        let def = linear_definition();

        // Single outgoing
        let next = engine.next_transition(&def, &StateId::new("created")).unwrap();
        assert_eq!(next.name, "submit");

        // Terminal state
        let result = engine.next_transition(&def, &StateId::new("done"));
        assert!(matches!(
            result,
            Err(WorkflowError::TransitionUnavailable { .. })
        ));

        // All-manual gateway: first in definition order
        let mut gateway = WorkflowDefinition::new("gateway");
        gateway.add_state(StateDef::new("submitted")).unwrap();
        gateway.add_state(StateDef::new("accepted")).unwrap();
        gateway.add_state(StateDef::new("rejected")).unwrap();
        gateway
            .add_transition(Transition::manual("accept", "submitted", "accepted"))
            .unwrap();
        gateway
            .add_transition(Transition::manual("reject", "submitted", "rejected"))
            .unwrap();
        let next = engine
            .next_transition(&gateway, &StateId::new("submitted"))
            .unwrap();
        assert_eq!(next.name, "accept");

        // Mixed outgoing is malformed for automatic purposes
        let mut mixed = gateway.clone();
        mixed.add_state(StateDef::new("expired")).unwrap();
        mixed
            .add_transition(Transition::automatic("expire", "submitted", "expired"))
            .unwrap();
        let result = engine.next_transition(&mixed, &StateId::new("submitted"));
        assert!(matches!(
            result,
            Err(WorkflowError::TransitionAmbiguous { count: 3, .. })
        ));
    }

    // ── Advancing ────────────────────────────────────────────────────

    #[test]
    fn test_advance_runs_auto_then_pauses_behind_task() {
        let workflow = Workflow::new(linear_definition())
            .assign_users("finish", |_| vec![UserId::new("alice")]);
        let engine = make_engine(workflow);
        let process = engine.open("review", 1, target("d1"), None).unwrap();

        let advance = engine.advance(&process.id).unwrap();
        let Advance::AwaitingTask {
            process,
            task,
            executed,
        } = advance
        else {
            panic!("expected a pending task");
        };

        assert_eq!(executed, vec!["submit".to_string()]);
        assert_eq!(process.state, StateId::new("submitted"));
        assert_eq!(task.task, StateId::new("submitted"));
        assert_eq!(task.name, "Waiting for review");
        assert_eq!(task.state, TaskState::Created);
        assert!(task.users.contains(&UserId::new("alice")));
    }

    #[test]
    fn test_repeated_advance_keeps_single_open_task() {
        let engine = make_engine(Workflow::new(linear_definition()));
        let process = engine.open("review", 1, target("d1"), None).unwrap();

        let first = engine.advance(&process.id).unwrap();
        let second = engine.advance(&process.id).unwrap();

        assert_eq!(first.task().unwrap().id, second.task().unwrap().id);
        assert_eq!(engine.store().tasks_for_process(&process.id).unwrap().len(), 1);
    }

    #[test]
    fn test_advance_exhausts_without_outgoing() {
        let engine = make_engine(Workflow::new(linear_definition()));
        let process = engine
            .open("review", 1, target("d1"), Some(StateId::new("done")))
            .unwrap();

        let advance = engine.advance(&process.id).unwrap();
        let Advance::Exhausted { executed, .. } = advance else {
            panic!("expected exhaustion");
        };
        assert!(executed.is_empty());
    }

    #[test]
    fn test_advance_detects_cycle_and_rolls_back() {
        let mut def = WorkflowDefinition::new("pingpong");
        def.add_state(StateDef::new("a")).unwrap();
        def.add_state(StateDef::new("b")).unwrap();
        def.add_transition(Transition::automatic("ping", "a", "b"))
            .unwrap();
        def.add_transition(Transition::automatic("pong", "b", "a"))
            .unwrap();

        let engine = make_engine(Workflow::new(def));
        let process = engine.open("pingpong", 1, target("d1"), None).unwrap();

        let result = engine.advance(&process.id);
        assert!(matches!(
            result,
            Err(EngineError::Workflow(WorkflowError::CircularWorkflow { .. }))
        ));

        // The aborted advance left no partial state behind
        let stored = engine.store().get_process(&process.id).unwrap();
        assert_eq!(stored.state, StateId::new("a"));
    }

    #[test]
    fn test_manual_without_task_executes_directly() {
        let mut def = WorkflowDefinition::new("expiry");
        def.add_state(StateDef::new("active")).unwrap();
        def.add_state(StateDef::new("expired")).unwrap();
        def.add_transition(Transition::manual("expire", "active", "expired").without_task())
            .unwrap();

        let engine = make_engine(Workflow::new(def));
        let process = engine.open("expiry", 1, target("d1"), None).unwrap();

        let advance = engine.advance(&process.id).unwrap();
        let Advance::Exhausted { process, executed } = advance else {
            panic!("expected exhaustion");
        };
        assert_eq!(process.state, StateId::new("expired"));
        assert_eq!(executed, vec!["expire".to_string()]);
        assert!(engine.store().tasks_for_process(&process.id).unwrap().is_empty());
    }

    #[test]
    fn test_gateway_creates_task_for_first_manual() {
        let mut def = WorkflowDefinition::new("moderation");
        def.add_state(StateDef::new("submitted")).unwrap();
        def.add_state(StateDef::new("accepted")).unwrap();
        def.add_state(StateDef::new("rejected")).unwrap();
        def.add_transition(Transition::manual("accept", "submitted", "accepted"))
            .unwrap();
        def.add_transition(Transition::manual("reject", "submitted", "rejected"))
            .unwrap();

        let engine = make_engine(Workflow::new(def));
        let process = engine.open("moderation", 1, target("d1"), None).unwrap();

        let advance = engine.advance(&process.id).unwrap();
        let task = advance.task().unwrap().clone();
        assert_eq!(task.task, StateId::new("submitted"));

        // The gateway task may still be completed with the second branch
        let advance = engine.complete(&task.id, "reject", None).unwrap();
        assert_eq!(advance.process().state, StateId::new("rejected"));
    }

    #[test]
    fn test_advance_fails_on_mixed_ambiguity() {
        let mut def = WorkflowDefinition::new("mixed");
        def.add_state(StateDef::new("submitted")).unwrap();
        def.add_state(StateDef::new("accepted")).unwrap();
        def.add_state(StateDef::new("expired")).unwrap();
        def.add_transition(Transition::manual("accept", "submitted", "accepted"))
            .unwrap();
        def.add_transition(Transition::automatic("expire", "submitted", "expired"))
            .unwrap();

        let engine = make_engine(Workflow::new(def));
        let process = engine.open("mixed", 1, target("d1"), None).unwrap();

        let result = engine.advance(&process.id);
        assert!(matches!(
            result,
            Err(EngineError::Workflow(WorkflowError::TransitionAmbiguous { .. }))
        ));
    }

    #[test]
    fn test_advance_once_named_and_resolved() {
        let engine = make_engine(Workflow::new(linear_definition()));
        let process = engine.open("review", 1, target("d1"), None).unwrap();

        let advance = engine.advance_once(&process.id, Some("submit")).unwrap();
        let Advance::Moved { process, executed } = advance else {
            panic!("expected a plain move");
        };
        assert_eq!(process.state, StateId::new("submitted"));
        assert_eq!(executed, vec!["submit".to_string()]);

        // Unnamed resolution now reaches the manual transition
        let advance = engine.advance_once(&process.id, None).unwrap();
        assert!(advance.task().is_some());

        // A named transition must fire from the current state
        let result = engine.advance_once(&process.id, Some("submit"));
        assert!(matches!(
            result,
            Err(EngineError::Workflow(WorkflowError::InvalidTransition { .. }))
        ));
    }

    // ── Actions and side effects ─────────────────────────────────────

    #[test]
    fn test_transition_handler_runs_before_move() {
        let workflow = Workflow::new(linear_definition()).on_transition(
            "submit",
            |process: &mut Process, transition: &Transition| {
                assert_eq!(process.state, transition.source);
                process
                    .data
                    .insert("submitted_via".to_string(), serde_json::json!("auto"));
                Ok(())
            },
        );
        let engine = make_engine(workflow);
        let process = engine.open("review", 1, target("d1"), None).unwrap();

        engine.advance(&process.id).unwrap();
        let stored = engine.store().get_process(&process.id).unwrap();
        assert_eq!(stored.data["submitted_via"], "auto");
    }

    #[test]
    fn test_failing_handler_aborts_and_rolls_back() {
        let workflow = Workflow::new(linear_definition()).on_transition("submit", |_, _| {
            Err(WorkflowError::InvalidDefinition(
                "side effect failed".to_string(),
            ))
        });
        let engine = make_engine(workflow);
        let process = engine.open("review", 1, target("d1"), None).unwrap();

        assert!(engine.advance(&process.id).is_err());
        let stored = engine.store().get_process(&process.id).unwrap();
        assert_eq!(stored.state, StateId::new("created"));
    }

    // ── Assignment ───────────────────────────────────────────────────

    #[test]
    fn test_assignment_falls_back_to_defaults() {
        let workflow = Workflow::new(linear_definition())
            .default_users(|_| vec![UserId::new("fallback")])
            .default_groups(|_| vec![GroupId::new("operators")]);
        let engine = make_engine(workflow);
        let process = engine.open("review", 1, target("d1"), None).unwrap();

        let advance = engine.advance(&process.id).unwrap();
        let task = advance.task().unwrap();
        assert!(task.users.contains(&UserId::new("fallback")));
        assert!(task.groups.contains(&GroupId::new("operators")));
    }

    #[test]
    fn test_reassignment_overwrites_with_fresh_resolution() {
        let candidates = Arc::new(RwLock::new(vec![UserId::new("alice")]));
        let source = Arc::clone(&candidates);
        let workflow = Workflow::new(linear_definition())
            .assign_users("finish", move |_| source.read().clone());

        let cache = AssignmentCache::new();
        let engine = make_engine(workflow).with_cache(cache.clone());
        let process = engine.open("review", 1, target("d1"), None).unwrap();

        let first = engine.advance(&process.id).unwrap();
        assert!(first.task().unwrap().users.contains(&UserId::new("alice")));

        // Resolver output changes; invalidating the cache re-resolves,
        // and the open task's assignment is replaced, not extended
        *candidates.write() = vec![UserId::new("carol")];
        cache.invalidate();
        let second = engine.advance(&process.id).unwrap();
        let task = second.task().unwrap();
        assert_eq!(task.id, first.task().unwrap().id);
        assert!(!task.users.contains(&UserId::new("alice")));
        assert!(task.users.contains(&UserId::new("carol")));
    }

    // ── Completion ───────────────────────────────────────────────────

    #[test]
    fn test_complete_executes_and_keeps_advancing() {
        let engine = make_engine(Workflow::new(linear_definition()));
        let process = engine.open("review", 1, target("d1"), None).unwrap();
        let task = engine.advance(&process.id).unwrap().task().unwrap().clone();

        let mut extra = Map::new();
        extra.insert("reason".to_string(), serde_json::json!("looks good"));
        let advance = engine.complete(&task.id, "finish", Some(extra)).unwrap();

        let Advance::Exhausted { process, executed } = advance else {
            panic!("expected exhaustion after the final transition");
        };
        assert_eq!(process.state, StateId::new("done"));
        assert_eq!(executed, vec!["finish".to_string()]);

        let stored = engine.store().get_task(&task.id).unwrap();
        assert_eq!(stored.state, TaskState::Done);
        assert_eq!(stored.data["reason"], "looks good");
    }

    #[test]
    fn test_complete_continues_through_auto_transitions() {
        let mut def = WorkflowDefinition::new("publishing");
        def.add_state(StateDef::new("submitted")).unwrap();
        def.add_state(StateDef::new("approved")).unwrap();
        def.add_state(StateDef::new("archived")).unwrap();
        def.add_transition(Transition::manual("approve", "submitted", "approved"))
            .unwrap();
        def.add_transition(Transition::automatic("archive", "approved", "archived"))
            .unwrap();

        let engine = make_engine(Workflow::new(def));
        let process = engine.open("publishing", 1, target("d1"), None).unwrap();
        let task = engine.advance(&process.id).unwrap().task().unwrap().clone();

        let advance = engine.complete(&task.id, "approve", None).unwrap();
        assert_eq!(advance.process().state, StateId::new("archived"));
        assert_eq!(
            advance.executed(),
            &["approve".to_string(), "archive".to_string()]
        );
    }

    #[test]
    fn test_complete_rejects_processed_task() {
        let engine = make_engine(Workflow::new(linear_definition()));
        let process = engine.open("review", 1, target("d1"), None).unwrap();
        let task = engine.advance(&process.id).unwrap().task().unwrap().clone();

        engine.complete(&task.id, "finish", None).unwrap();
        let result = engine.complete(&task.id, "finish", None);
        assert!(matches!(
            result,
            Err(EngineError::Workflow(WorkflowError::TaskAlreadyProcessed { .. }))
        ));

        // The rejected attempt left the process untouched
        let stored = engine.store().get_process(&process.id).unwrap();
        assert_eq!(stored.state, StateId::new("done"));
    }

    #[test]
    fn test_complete_with_unknown_transition_rolls_back() {
        let engine = make_engine(Workflow::new(linear_definition()));
        let process = engine.open("review", 1, target("d1"), None).unwrap();
        let task = engine.advance(&process.id).unwrap().task().unwrap().clone();

        let result = engine.complete(&task.id, "bogus", None);
        assert!(matches!(
            result,
            Err(EngineError::Workflow(WorkflowError::UnknownTransition { .. }))
        ));

        // The done mark was rolled back together with the failure
        let stored = engine.store().get_task(&task.id).unwrap();
        assert_eq!(stored.state, TaskState::Created);
    }

    #[test]
    fn test_complete_with_illegal_transition_rolls_back() {
        let engine = make_engine(Workflow::new(linear_definition()));
        let process = engine.open("review", 1, target("d1"), None).unwrap();
        let task = engine.advance(&process.id).unwrap().task().unwrap().clone();

        // "submit" exists but fires from "created", not "submitted"
        let result = engine.complete(&task.id, "submit", None);
        assert!(matches!(
            result,
            Err(EngineError::Workflow(WorkflowError::InvalidTransition { .. }))
        ));

        let stored = engine.store().get_task(&task.id).unwrap();
        assert!(stored.is_open());
        let stored = engine.store().get_process(&process.id).unwrap();
        assert_eq!(stored.state, StateId::new("submitted"));
    }

    // ── Concurrency ──────────────────────────────────────────────────

    #[test]
    fn test_lock_timeout_surfaces_as_retryable() {
        let store = MemoryStore::new().with_lock_timeout(Duration::from_millis(50));
        let engine = Arc::new(make_engine_with_store(
            Workflow::new(linear_definition()),
            store,
        ));
        let process = engine.open("review", 1, target("d1"), None).unwrap();

        let held = engine.store().lock_process(&process.id).unwrap();

        let contender = Arc::clone(&engine);
        let id = process.id.clone();
        let result = thread::spawn(move || contender.advance(&id)).join().unwrap();
        let err = result.err().expect("advance should time out");
        assert!(err.is_retryable());

        drop(held);
        assert!(engine.advance(&process.id).is_ok());
    }
}
