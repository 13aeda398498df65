//! Registered workflows: a definition plus behavior.
//!
//! The definition itself is plain data. What a transition *does* beyond
//! moving state, and who gets assigned to its tasks, attaches here at
//! registration time:
//!
//! - the **action table** maps a transition name to an explicit action
//!   descriptor: the default pure state move, or a side-effecting
//!   handler that runs before the move. Resolution is by lookup, never
//!   reflection.
//! - **assignment resolvers** are ordered lists of functions per
//!   transition name, one list for users and one for groups. Each
//!   receives the transition's immutable fields and returns candidates.
//!   When every resolver comes back empty, the workflow-wide
//!   `default_users`/`default_groups` resolvers apply.

use procession_types::{GroupId, Process, Transition, UserId, WorkflowDefinition, WorkflowResult};
use std::collections::HashMap;
use std::sync::Arc;

/// Side-effecting handler run when a transition executes, before the
/// state move. A handler failure aborts the transition.
pub type TransitionHandler =
    Arc<dyn Fn(&mut Process, &Transition) -> WorkflowResult<()> + Send + Sync>;

/// Resolver producing candidate users for a transition's task
pub type UserResolver = Arc<dyn Fn(&Transition) -> Vec<UserId> + Send + Sync>;

/// Resolver producing candidate groups for a transition's task
pub type GroupResolver = Arc<dyn Fn(&Transition) -> Vec<GroupId> + Send + Sync>;

/// What executing a transition does
#[derive(Clone)]
pub enum TransitionAction {
    /// Move the process to the transition's destination state
    Move,
    /// Run the handler for its side effects, then move
    Invoke(TransitionHandler),
}

impl std::fmt::Debug for TransitionAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Move => write!(f, "Move"),
            Self::Invoke(_) => write!(f, "Invoke(..)"),
        }
    }
}

/// A workflow definition bundled with its runtime behavior
pub struct Workflow {
    definition: WorkflowDefinition,
    actions: HashMap<String, TransitionAction>,
    user_resolvers: HashMap<String, Vec<UserResolver>>,
    group_resolvers: HashMap<String, Vec<GroupResolver>>,
    default_users: Option<UserResolver>,
    default_groups: Option<GroupResolver>,
    target_entity: Option<String>,
}

impl Workflow {
    pub fn new(definition: WorkflowDefinition) -> Self {
        Self {
            definition,
            actions: HashMap::new(),
            user_resolvers: HashMap::new(),
            group_resolvers: HashMap::new(),
            default_users: None,
            default_groups: None,
            target_entity: None,
        }
    }

    /// Attach a side-effecting handler to a transition name
    pub fn on_transition(
        mut self,
        name: impl Into<String>,
        handler: impl Fn(&mut Process, &Transition) -> WorkflowResult<()> + Send + Sync + 'static,
    ) -> Self {
        self.actions
            .insert(name.into(), TransitionAction::Invoke(Arc::new(handler)));
        self
    }

    /// Register a user resolver for a transition name. Resolvers
    /// accumulate in registration order.
    pub fn assign_users(
        mut self,
        transition: impl Into<String>,
        resolver: impl Fn(&Transition) -> Vec<UserId> + Send + Sync + 'static,
    ) -> Self {
        self.user_resolvers
            .entry(transition.into())
            .or_default()
            .push(Arc::new(resolver));
        self
    }

    /// Register a group resolver for a transition name
    pub fn assign_groups(
        mut self,
        transition: impl Into<String>,
        resolver: impl Fn(&Transition) -> Vec<GroupId> + Send + Sync + 'static,
    ) -> Self {
        self.group_resolvers
            .entry(transition.into())
            .or_default()
            .push(Arc::new(resolver));
        self
    }

    /// Fallback user resolver applied when a transition resolves to
    /// nobody at all
    pub fn default_users(
        mut self,
        resolver: impl Fn(&Transition) -> Vec<UserId> + Send + Sync + 'static,
    ) -> Self {
        self.default_users = Some(Arc::new(resolver));
        self
    }

    /// Fallback group resolver applied when a transition resolves to
    /// nobody at all
    pub fn default_groups(
        mut self,
        resolver: impl Fn(&Transition) -> Vec<GroupId> + Send + Sync + 'static,
    ) -> Self {
        self.default_groups = Some(Arc::new(resolver));
        self
    }

    /// Bind this workflow to a target entity type; permission checks
    /// derive their permission strings from the type's app namespace
    pub fn bind_entity(mut self, entity_type: impl Into<String>) -> Self {
        self.target_entity = Some(entity_type.into());
        self
    }

    // ── Accessors ────────────────────────────────────────────────────

    pub fn definition(&self) -> &WorkflowDefinition {
        &self.definition
    }

    pub fn name(&self) -> &str {
        &self.definition.name
    }

    pub fn version(&self) -> u32 {
        self.definition.version
    }

    pub fn target_entity(&self) -> Option<&str> {
        self.target_entity.as_deref()
    }

    /// The action for a transition name; unregistered names resolve to
    /// the default pure move
    pub fn action(&self, transition: &str) -> TransitionAction {
        self.actions
            .get(transition)
            .cloned()
            .unwrap_or(TransitionAction::Move)
    }

    pub fn user_resolvers_for(&self, transition: &str) -> &[UserResolver] {
        self.user_resolvers
            .get(transition)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn group_resolvers_for(&self, transition: &str) -> &[GroupResolver] {
        self.group_resolvers
            .get(transition)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn default_user_resolver(&self) -> Option<&UserResolver> {
        self.default_users.as_ref()
    }

    pub fn default_group_resolver(&self) -> Option<&GroupResolver> {
        self.default_groups.as_ref()
    }
}

impl std::fmt::Debug for Workflow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workflow")
            .field("name", &self.definition.name)
            .field("version", &self.definition.version)
            .field("actions", &self.actions.len())
            .field("user_resolvers", &self.user_resolvers.len())
            .field("group_resolvers", &self.group_resolvers.len())
            .field("target_entity", &self.target_entity)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use procession_types::{StateDef, StateId, TargetRef};

    fn make_definition() -> WorkflowDefinition {
        let mut def = WorkflowDefinition::new("launch");
        def.add_state(StateDef::new("created")).unwrap();
        def.add_state(StateDef::new("launched")).unwrap();
        def.add_transition(Transition::manual("ignite", "created", "launched"))
            .unwrap();
        def
    }

    #[test]
    fn test_action_table_lookup() {
        let workflow = Workflow::new(make_definition()).on_transition("ignite", |process, _| {
            process.data.insert("ignited".into(), serde_json::json!(true));
            Ok(())
        });

        assert!(matches!(
            workflow.action("ignite"),
            TransitionAction::Invoke(_)
        ));
        assert!(matches!(workflow.action("abort"), TransitionAction::Move));

        // Run the handler the way the engine does
        let mut process = Process::new(
            TargetRef::new("demo.rocket", "r1"),
            "launch",
            1,
            StateId::new("created"),
        );
        let transition = workflow.definition().transition("ignite").unwrap().clone();
        if let TransitionAction::Invoke(handler) = workflow.action("ignite") {
            handler(&mut process, &transition).unwrap();
        }
        assert_eq!(process.data["ignited"], true);
    }

    #[test]
    fn test_resolver_registration_order() {
        let workflow = Workflow::new(make_definition())
            .assign_users("ignite", |_| vec![UserId::new("alice")])
            .assign_users("ignite", |_| vec![UserId::new("bob")]);

        assert_eq!(workflow.user_resolvers_for("ignite").len(), 2);
        assert!(workflow.user_resolvers_for("abort").is_empty());
        assert!(workflow.group_resolvers_for("ignite").is_empty());
    }

    #[test]
    fn test_entity_binding() {
        let workflow = Workflow::new(make_definition()).bind_entity("demo.rocket");
        assert_eq!(workflow.target_entity(), Some("demo.rocket"));
        assert!(Workflow::new(make_definition()).target_entity().is_none());
    }
}
