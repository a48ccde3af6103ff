//! Access control: admin gating and scoped authorization tables
//!
//! The admin principal is fixed at construction. Creator and
//! trigger-source tables are owned by the engine instance, never
//! global state.

use conductor_types::{Principal, WorkflowDefinition, WorkflowError, WorkflowResult};
use std::collections::BTreeSet;

/// Authorization tables for one engine instance.
#[derive(Clone, Debug)]
pub struct AccessControl {
    /// May authorize creators and trigger sources, set fees, and
    /// deactivate workflows
    admin: Principal,
    /// Principals permitted to register workflows
    creators: BTreeSet<Principal>,
    /// Principals permitted to fire conditional phases of any workflow
    trigger_sources: BTreeSet<Principal>,
}

impl AccessControl {
    pub fn new(admin: Principal) -> Self {
        Self {
            admin,
            creators: BTreeSet::new(),
            trigger_sources: BTreeSet::new(),
        }
    }

    pub fn admin(&self) -> &Principal {
        &self.admin
    }

    pub fn require_admin(&self, caller: &Principal) -> WorkflowResult<()> {
        if *caller == self.admin {
            Ok(())
        } else {
            Err(WorkflowError::Unauthorized)
        }
    }

    // ── Creators ─────────────────────────────────────────────────────

    pub fn authorize_creator(&mut self, creator: Principal) {
        self.creators.insert(creator);
    }

    pub fn is_creator(&self, caller: &Principal) -> bool {
        self.creators.contains(caller)
    }

    pub fn require_creator(&self, caller: &Principal) -> WorkflowResult<()> {
        if self.is_creator(caller) {
            Ok(())
        } else {
            Err(WorkflowError::Unauthorized)
        }
    }

    // ── Trigger sources ──────────────────────────────────────────────

    pub fn authorize_trigger_source(&mut self, source: Principal) {
        self.trigger_sources.insert(source);
    }

    pub fn is_trigger_source(&self, caller: &Principal) -> bool {
        self.trigger_sources.contains(caller)
    }

    /// A conditional phase may be fired by a global trigger source,
    /// one of the workflow's own authorized triggers, or its creator.
    pub fn require_trigger(
        &self,
        definition: &WorkflowDefinition,
        caller: &Principal,
    ) -> WorkflowResult<()> {
        if self.is_trigger_source(caller) || definition.may_trigger(caller) {
            Ok(())
        } else {
            Err(WorkflowError::NotAuthorizedTrigger)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;
    use conductor_types::{OperatorSetId, PhaseSpec, WorkflowId};

    fn principal(n: u8) -> Principal {
        Principal::new([n; 20])
    }

    fn definition(creator: Principal, triggers: &[Principal]) -> WorkflowDefinition {
        let at = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        WorkflowDefinition::new(
            WorkflowId::derive("wf", &creator, at, 0),
            "wf",
            creator,
            vec![PhaseSpec::immediate("p", OperatorSetId(0))],
            triggers.iter().copied().collect(),
            at,
        )
        .unwrap()
    }

    #[test]
    fn admin_gate() {
        let access = AccessControl::new(principal(1));
        assert!(access.require_admin(&principal(1)).is_ok());
        assert!(matches!(
            access.require_admin(&principal(2)),
            Err(WorkflowError::Unauthorized)
        ));
    }

    #[test]
    fn creators_must_be_authorized() {
        let mut access = AccessControl::new(principal(1));
        assert!(access.require_creator(&principal(2)).is_err());

        access.authorize_creator(principal(2));
        assert!(access.require_creator(&principal(2)).is_ok());
        // the admin is not implicitly a creator
        assert!(access.require_creator(&principal(1)).is_err());
    }

    #[test]
    fn trigger_authorization_is_a_union() {
        let mut access = AccessControl::new(principal(1));
        let def = definition(principal(2), &[principal(3)]);

        assert!(access.require_trigger(&def, &principal(2)).is_ok()); // creator
        assert!(access.require_trigger(&def, &principal(3)).is_ok()); // workflow-listed
        assert!(matches!(
            access.require_trigger(&def, &principal(4)),
            Err(WorkflowError::NotAuthorizedTrigger)
        ));

        access.authorize_trigger_source(principal(4));
        assert!(access.require_trigger(&def, &principal(4)).is_ok()); // global
    }
}
