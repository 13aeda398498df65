//! Target entity directory.
//!
//! Processes reference external entities by an explicit
//! (entity type, entity id) pair. This module maps an entity type to
//! its accessor capability: an existence check (a workflow may only be
//! opened against a persisted entity) and the permission namespace used
//! to derive permission strings.

use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Capability handle for one entity type
pub trait EntityAccessor: Send + Sync {
    /// Permission namespace ("app") for entities of this type
    fn app_name(&self) -> &str;

    /// Whether a persisted entity exists with this id
    fn exists(&self, entity_id: &str) -> bool;
}

/// Registry mapping entity type → accessor
#[derive(Clone, Default)]
pub struct EntityDirectory {
    accessors: HashMap<String, Arc<dyn EntityAccessor>>,
}

impl EntityDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, entity_type: impl Into<String>, accessor: Arc<dyn EntityAccessor>) {
        self.accessors.insert(entity_type.into(), accessor);
    }

    /// Chainable variant of [`register`](Self::register)
    pub fn with(mut self, entity_type: impl Into<String>, accessor: Arc<dyn EntityAccessor>) -> Self {
        self.register(entity_type, accessor);
        self
    }

    pub fn accessor(&self, entity_type: &str) -> Option<&Arc<dyn EntityAccessor>> {
        self.accessors.get(entity_type)
    }

    pub fn app_name(&self, entity_type: &str) -> Option<&str> {
        self.accessors.get(entity_type).map(|a| a.app_name())
    }

    pub fn contains(&self, entity_type: &str) -> bool {
        self.accessors.contains_key(entity_type)
    }
}

impl std::fmt::Debug for EntityDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityDirectory")
            .field("entity_types", &self.accessors.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// In-memory accessor for tests and demos
pub struct MemoryEntities {
    app: String,
    known: RwLock<HashSet<String>>,
}

impl MemoryEntities {
    pub fn new(app: impl Into<String>) -> Self {
        Self {
            app: app.into(),
            known: RwLock::new(HashSet::new()),
        }
    }

    /// Record an entity id as persisted
    pub fn add(&self, entity_id: impl Into<String>) {
        self.known.write().insert(entity_id.into());
    }
}

impl EntityAccessor for MemoryEntities {
    fn app_name(&self) -> &str {
        &self.app
    }

    fn exists(&self, entity_id: &str) -> bool {
        self.known.read().contains(entity_id)
    }
}
