//! Authorization filter: the read path.
//!
//! Computes, per user, which transitions are visible and executable.
//! Manual transitions are resolved speculatively through the same
//! resolvers (and cache) the task protocol uses; the authorizer holds
//! no store handle, so the check can never create a task.
//!
//! Permission strings are opt-in: a permission that was never declared
//! leaves the workflow unrestricted.

use crate::{AssignmentCache, EntityDirectory, Registry, Workflow};
use parking_lot::RwLock;
use procession_types::{Process, Transition, User, UserId, WorkflowResult};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// The two permission kinds a workflow can gate on
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Permission {
    Read,
    Write,
}

impl Permission {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
        }
    }
}

/// External permission subsystem boundary
pub trait PermissionLookup: Send + Sync {
    /// Whether the user holds the permission
    fn has_permission(&self, user: &UserId, permission: &str) -> bool;

    /// Whether the permission string is declared at all for the entity
    /// type. Undeclared means unrestricted
    fn permission_declared(&self, entity_type: &str, permission: &str) -> bool;
}

/// In-memory permission subsystem for tests and demos
#[derive(Default)]
pub struct MemoryPermissions {
    declared: RwLock<HashSet<(String, String)>>,
    grants: RwLock<HashMap<UserId, HashSet<String>>>,
}

impl MemoryPermissions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a permission string for an entity type
    pub fn declare(&self, entity_type: impl Into<String>, permission: impl Into<String>) {
        self.declared
            .write()
            .insert((entity_type.into(), permission.into()));
    }

    /// Grant a declared permission to a user
    pub fn grant(&self, user: impl Into<String>, permission: impl Into<String>) {
        self.grants
            .write()
            .entry(UserId::new(user))
            .or_default()
            .insert(permission.into());
    }
}

impl PermissionLookup for MemoryPermissions {
    fn has_permission(&self, user: &UserId, permission: &str) -> bool {
        self.grants
            .read()
            .get(user)
            .map(|perms| perms.contains(permission))
            .unwrap_or(false)
    }

    fn permission_declared(&self, entity_type: &str, permission: &str) -> bool {
        self.declared
            .read()
            .contains(&(entity_type.to_string(), permission.to_string()))
    }
}

// ── Authorizer ───────────────────────────────────────────────────────

/// Per-user visibility over a process's transitions
pub struct Authorizer {
    registry: Arc<Registry>,
    entities: Arc<EntityDirectory>,
    permissions: Arc<dyn PermissionLookup>,
    cache: AssignmentCache,
}

impl Authorizer {
    pub fn new(
        registry: Arc<Registry>,
        entities: Arc<EntityDirectory>,
        permissions: Arc<dyn PermissionLookup>,
    ) -> Self {
        Self {
            registry,
            entities,
            permissions,
            cache: AssignmentCache::new(),
        }
    }

    /// Share a resolution cache with the engine
    pub fn with_cache(mut self, cache: AssignmentCache) -> Self {
        self.cache = cache;
        self
    }

    /// Transitions available from the process's current state, filtered
    /// by what `user` may execute.
    ///
    /// With no user, every outgoing transition is returned. With a
    /// user: automatic transitions always; manual ones when the user is
    /// a superuser, appears in the resolved user set, shares a group
    /// with the resolved group set, or the transition resolves to
    /// nobody at all (unassigned means open to all).
    pub fn authorized_transitions<'a>(
        &'a self,
        process: &Process,
        user: Option<&User>,
    ) -> WorkflowResult<Vec<&'a Transition>> {
        let workflow = self
            .registry
            .lookup(&process.workflow_name, process.workflow_version)?;
        let available = workflow.definition().outgoing(&process.state);

        Ok(match user {
            None => available,
            Some(user) => available
                .into_iter()
                .filter(|transition| self.may_execute(workflow, transition, user))
                .collect(),
        })
    }

    fn may_execute(&self, workflow: &Workflow, transition: &Transition, user: &User) -> bool {
        if !transition.manual || user.superuser {
            return true;
        }
        let assignees = self.cache.resolve(workflow, transition);
        if assignees.is_empty() {
            return true;
        }
        assignees.users.contains(&user.id) || user.in_any(&assignees.groups)
    }

    /// Whether `user` holds the given permission on the workflow.
    ///
    /// True when the workflow has no bound entity type, the user is
    /// absent or a superuser, the derived permission string was never
    /// declared, or the user explicitly holds it.
    pub fn is_allowed(&self, workflow: &Workflow, user: Option<&User>, perm: Permission) -> bool {
        let Some(entity_type) = workflow.target_entity() else {
            return true;
        };
        let Some(user) = user else {
            return true;
        };
        if user.superuser {
            return true;
        }
        let Some(app) = self.entities.app_name(entity_type) else {
            return true;
        };

        let permission = format!("{}.{}_{}", app, perm.as_str(), snake_case(workflow.name()));
        if !self
            .permissions
            .permission_declared(entity_type, &permission)
        {
            return true;
        }
        self.permissions.has_permission(&user.id, &permission)
    }
}

impl std::fmt::Debug for Authorizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Authorizer")
            .field("workflows", &self.registry.count())
            .finish()
    }
}

/// CamelCase → snake_case for permission string derivation
fn snake_case(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    let mut out = String::with_capacity(value.len() + 4);
    for (i, c) in chars.iter().enumerate() {
        if c.is_uppercase() && i > 0 {
            let after_lower = chars[i - 1].is_lowercase() || chars[i - 1].is_ascii_digit();
            let before_lower =
                chars[i - 1].is_uppercase() && chars.get(i + 1).is_some_and(|n| n.is_lowercase());
            if after_lower || before_lower {
                out.push('_');
            }
        }
        out.extend(c.to_lowercase());
    }
    out
}
