//! Workflow registry: explicit (name, version) → workflow lookup.
//!
//! The registry is a plain value populated at startup and read-only
//! afterwards, typically shared as `Arc<Registry>`. Registering the
//! same (name, version) twice replaces the earlier entry and logs a
//! warning: last write wins, explicitly.

use crate::Workflow;
use procession_types::{WorkflowError, WorkflowResult};
use std::collections::HashMap;

/// Registry of workflows keyed by (name, version)
#[derive(Debug, Default)]
pub struct Registry {
    workflows: HashMap<(String, u32), Workflow>,
}

impl Registry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a workflow. Validates the definition before storing.
    pub fn register(&mut self, workflow: Workflow) -> WorkflowResult<()> {
        workflow.definition().validate()?;

        let key = (workflow.name().to_string(), workflow.version());
        if self.workflows.contains_key(&key) {
            tracing::warn!(
                workflow = %key.0,
                version = key.1,
                "duplicate workflow registration, replacing earlier entry"
            );
        } else {
            tracing::info!(workflow = %key.0, version = key.1, "workflow registered");
        }
        self.workflows.insert(key, workflow);
        Ok(())
    }

    /// Look up a workflow by name and version
    pub fn lookup(&self, name: &str, version: u32) -> WorkflowResult<&Workflow> {
        self.workflows
            .get(&(name.to_string(), version))
            .ok_or_else(|| WorkflowError::NotRegistered {
                name: name.to_string(),
                version,
            })
    }

    /// Workflows bound to a target entity type
    pub fn for_entity(&self, entity_type: &str) -> Vec<&Workflow> {
        self.workflows
            .values()
            .filter(|w| w.target_entity() == Some(entity_type))
            .collect()
    }

    /// All registered workflows
    pub fn list(&self) -> Vec<&Workflow> {
        self.workflows.values().collect()
    }

    pub fn count(&self) -> usize {
        self.workflows.len()
    }

    pub fn contains(&self, name: &str, version: u32) -> bool {
        self.workflows.contains_key(&(name.to_string(), version))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use procession_types::{StateDef, Transition, WorkflowDefinition};

    fn make_workflow(name: &str, version: u32) -> Workflow {
        let mut def = WorkflowDefinition::new(name).with_version(version);
        def.add_state(StateDef::new("created")).unwrap();
        def.add_state(StateDef::new("done")).unwrap();
        def.add_transition(Transition::manual("finish", "created", "done"))
            .unwrap();
        Workflow::new(def)
    }

    #[test]
    fn test_register_and_lookup() {
        let mut registry = Registry::new();
        registry.register(make_workflow("approval", 1)).unwrap();
        registry.register(make_workflow("approval", 2)).unwrap();

        assert_eq!(registry.count(), 2);
        assert_eq!(registry.lookup("approval", 1).unwrap().version(), 1);
        assert_eq!(registry.lookup("approval", 2).unwrap().version(), 2);
        assert!(registry.contains("approval", 2));
        assert!(!registry.contains("approval", 3));
    }

    #[test]
    fn test_lookup_miss() {
        let registry = Registry::new();
        let result = registry.lookup("approval", 1);
        assert!(matches!(
            result,
            Err(WorkflowError::NotRegistered { version: 1, .. })
        ));
    }

    #[test]
    fn test_duplicate_registration_replaces() {
        let mut registry = Registry::new();
        registry.register(make_workflow("approval", 1)).unwrap();

        let replacement = make_workflow("approval", 1).bind_entity("billing.invoice");
        registry.register(replacement).unwrap();

        assert_eq!(registry.count(), 1);
        assert_eq!(
            registry.lookup("approval", 1).unwrap().target_entity(),
            Some("billing.invoice")
        );
    }

    #[test]
    fn test_register_rejects_invalid_definition() {
        let mut def = WorkflowDefinition::new("broken").with_version(0);
        def.add_state(StateDef::new("created")).unwrap();

        let mut registry = Registry::new();
        let result = registry.register(Workflow::new(def));
        assert!(matches!(result, Err(WorkflowError::InvalidDefinition(_))));
        assert_eq!(registry.count(), 0);
    }

    #[test]
    fn test_for_entity() {
        let mut registry = Registry::new();
        registry
            .register(make_workflow("approval", 1).bind_entity("billing.invoice"))
            .unwrap();
        registry
            .register(make_workflow("fulfilment", 1).bind_entity("shop.order"))
            .unwrap();
        registry.register(make_workflow("unbound", 1)).unwrap();

        let bound = registry.for_entity("billing.invoice");
        assert_eq!(bound.len(), 1);
        assert_eq!(bound[0].name(), "approval");
        assert!(registry.for_entity("shop.customer").is_empty());
        assert_eq!(registry.list().len(), 3);
    }
}
