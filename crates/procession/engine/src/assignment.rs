//! Assignment resolution with explicit memoization.
//!
//! Resolver output for a transition depends only on its immutable field
//! set, so results are cached per distinct input to avoid repeated
//! external lookups within a resolution window. The cache is not a
//! consistency mechanism and may be invalidated freely.

use crate::Workflow;
use parking_lot::RwLock;
use procession_types::{GroupId, Transition, UserId};
use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeSet, HashMap};
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// The resolved assignment for one transition
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Assignees {
    pub users: BTreeSet<UserId>,
    pub groups: BTreeSet<GroupId>,
}

impl Assignees {
    /// Nobody resolved; the task will be open to all
    pub fn is_empty(&self) -> bool {
        self.users.is_empty() && self.groups.is_empty()
    }
}

/// Shared, injectable cache of resolver output.
///
/// Cloning shares the underlying entries, so the engine and the
/// authorizer can observe the same resolution window.
#[derive(Clone, Debug, Default)]
pub struct AssignmentCache {
    entries: Arc<RwLock<HashMap<u64, Assignees>>>,
}

impl AssignmentCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve assignees for a transition, consulting the cache first.
    ///
    /// Runs every registered group resolver, then every user resolver,
    /// accumulating candidates; when the union is empty the workflow's
    /// default resolvers apply. The post-fallback result is what gets
    /// cached, so task assignment and authorization agree.
    pub fn resolve(&self, workflow: &Workflow, transition: &Transition) -> Assignees {
        let key = fingerprint(workflow, transition);
        if let Some(hit) = self.entries.read().get(&key) {
            tracing::debug!(transition = %transition.name, "assignment cache hit");
            return hit.clone();
        }

        let resolved = resolve_uncached(workflow, transition);
        self.entries.write().insert(key, resolved.clone());
        resolved
    }

    /// Drop all cached entries
    pub fn invalidate(&self) {
        self.entries.write().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

fn resolve_uncached(workflow: &Workflow, transition: &Transition) -> Assignees {
    let mut assignees = Assignees::default();
    for resolver in workflow.group_resolvers_for(&transition.name) {
        assignees.groups.extend(resolver(transition));
    }
    for resolver in workflow.user_resolvers_for(&transition.name) {
        assignees.users.extend(resolver(transition));
    }

    if assignees.is_empty() {
        if let Some(resolver) = workflow.default_user_resolver() {
            assignees.users.extend(resolver(transition));
        }
        if let Some(resolver) = workflow.default_group_resolver() {
            assignees.groups.extend(resolver(transition));
        }
    }

    assignees
}

/// Cache key over the transition's immutable fields, qualified by the
/// owning workflow's identity
fn fingerprint(workflow: &Workflow, transition: &Transition) -> u64 {
    let mut hasher = DefaultHasher::new();
    workflow.name().hash(&mut hasher);
    workflow.version().hash(&mut hasher);
    transition.hash(&mut hasher);
    hasher.finish()
}
