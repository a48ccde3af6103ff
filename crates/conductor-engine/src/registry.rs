//! Workflow registry: stores validated workflow definitions
//!
//! Definitions are immutable once registered apart from the active
//! flag. Registering the same name again creates a new version; the
//! name index keeps versions in registration order.

use conductor_types::{WorkflowDefinition, WorkflowError, WorkflowId, WorkflowResult};
use std::collections::BTreeMap;

/// Registry of workflow definitions, keyed by content-addressed id.
#[derive(Clone, Debug, Default)]
pub struct WorkflowRegistry {
    definitions: BTreeMap<WorkflowId, WorkflowDefinition>,
    by_name: BTreeMap<String, Vec<WorkflowId>>,
}

impl WorkflowRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a validated definition.
    pub fn insert(&mut self, definition: WorkflowDefinition) -> WorkflowId {
        let id = definition.id;
        self.by_name
            .entry(definition.name.clone())
            .or_default()
            .push(id);
        self.definitions.insert(id, definition);
        tracing::info!(workflow_id = %id, "workflow definition registered");
        id
    }

    pub fn get(&self, id: &WorkflowId) -> WorkflowResult<&WorkflowDefinition> {
        self.definitions
            .get(id)
            .ok_or(WorkflowError::WorkflowNotFound(*id))
    }

    pub fn contains(&self, id: &WorkflowId) -> bool {
        self.definitions.contains_key(id)
    }

    /// Flip the active flag; inactive workflows reject new executions.
    pub fn set_active(&mut self, id: &WorkflowId, active: bool) -> WorkflowResult<()> {
        let definition = self
            .definitions
            .get_mut(id)
            .ok_or(WorkflowError::WorkflowNotFound(*id))?;
        definition.is_active = active;
        tracing::info!(workflow_id = %id, active, "workflow active flag changed");
        Ok(())
    }

    /// All versions registered under a name, in registration order.
    pub fn versions_by_name(&self, name: &str) -> Vec<&WorkflowDefinition> {
        self.by_name
            .get(name)
            .map(|ids| ids.iter().filter_map(|id| self.definitions.get(id)).collect())
            .unwrap_or_default()
    }

    /// The most recently registered version under a name.
    pub fn latest_by_name(&self, name: &str) -> Option<&WorkflowDefinition> {
        self.by_name
            .get(name)
            .and_then(|ids| ids.last())
            .and_then(|id| self.definitions.get(id))
    }

    pub fn list(&self) -> impl Iterator<Item = &WorkflowDefinition> {
        self.definitions.values()
    }

    pub fn count(&self) -> usize {
        self.definitions.len()
    }
}
