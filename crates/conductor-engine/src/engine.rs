//! The workflow engine: registration, execution, submissions, timeouts
//!
//! The engine owns the definition registry, the execution store, the
//! authorization tables, and the collaborator seams. Every operation
//! takes `&mut self` and completes bounded work; state transitions for
//! one execution are therefore serialized, and embedders that need
//! cross-execution parallelism shard engines or serialize access.
//!
//! Time-sensitive operations come in pairs: the wall-clock entry point
//! and an explicit-`now` variant (`..._at`). Deterministic embeddings
//! and tests use the latter.

use crate::access::AccessControl;
use crate::collaborators::{
    FeeLedger, FeeSink, OperatorRegistry, QueueMailbox, StaticOperatorRegistry, TaskMailbox,
};
use crate::executors::DispatchContext;
use crate::registry::WorkflowRegistry;
use crate::scheduler::PhaseScheduler;
use crate::timeout::DeadlineMonitor;
use chrono::{DateTime, Utc};
use conductor_types::{
    ConditionVerdict, EventLog, EventRecord, EventSink, ExecutionId, PhaseSpec, PhaseStatus,
    Principal, WorkflowDefinition, WorkflowError, WorkflowEvent, WorkflowExecution, WorkflowId,
    WorkflowResult,
};
use std::collections::{BTreeMap, BTreeSet};

// ── Configuration ────────────────────────────────────────────────────

/// Construction-time configuration of a workflow engine.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// The engine's own identity, attached to dispatched tasks
    pub identity: Principal,
    /// The admin principal: authorizes creators and trigger sources,
    /// sets fees, deactivates workflows
    pub admin: Principal,
    /// Minimum fee to register a workflow
    pub creation_fee: u64,
    /// Minimum fee to start an execution
    pub execution_fee: u64,
}

impl EngineConfig {
    pub fn new(identity: Principal, admin: Principal) -> Self {
        Self {
            identity,
            admin,
            creation_fee: 0,
            execution_fee: 0,
        }
    }

    pub fn with_fees(mut self, creation_fee: u64, execution_fee: u64) -> Self {
        self.creation_fee = creation_fee;
        self.execution_fee = execution_fee;
        self
    }
}

// ── Engine ───────────────────────────────────────────────────────────

/// The workflow orchestration engine.
pub struct WorkflowEngine {
    identity: Principal,
    creation_fee: u64,
    execution_fee: u64,
    /// Monotonic nonce folded into derived ids
    nonce: u64,
    access: AccessControl,
    registry: WorkflowRegistry,
    executions: BTreeMap<ExecutionId, WorkflowExecution>,
    scheduler: PhaseScheduler,
    monitor: DeadlineMonitor,
    mailbox: Box<dyn TaskMailbox>,
    operators: Box<dyn OperatorRegistry>,
    fee_sink: Box<dyn FeeSink>,
    events: EventLog,
}

impl WorkflowEngine {
    /// Create an engine with the bundled in-memory collaborators.
    pub fn new(config: EngineConfig) -> Self {
        Self {
            identity: config.identity,
            creation_fee: config.creation_fee,
            execution_fee: config.execution_fee,
            nonce: 0,
            access: AccessControl::new(config.admin),
            registry: WorkflowRegistry::new(),
            executions: BTreeMap::new(),
            scheduler: PhaseScheduler::new(),
            monitor: DeadlineMonitor::new(),
            mailbox: Box::new(QueueMailbox::new()),
            operators: Box::new(StaticOperatorRegistry::new()),
            fee_sink: Box::new(FeeLedger::new()),
            events: EventLog::new(),
        }
    }

    pub fn with_mailbox(mut self, mailbox: impl TaskMailbox + 'static) -> Self {
        self.mailbox = Box::new(mailbox);
        self
    }

    pub fn with_operator_registry(mut self, operators: impl OperatorRegistry + 'static) -> Self {
        self.operators = Box::new(operators);
        self
    }

    pub fn with_fee_sink(mut self, fee_sink: impl FeeSink + 'static) -> Self {
        self.fee_sink = Box::new(fee_sink);
        self
    }

    // ── Registration ─────────────────────────────────────────────────

    /// Validate and store a workflow definition.
    pub fn register_workflow(
        &mut self,
        caller: Principal,
        name: impl Into<String>,
        phases: Vec<PhaseSpec>,
        authorized_triggers: BTreeSet<Principal>,
        fee: u64,
    ) -> WorkflowResult<WorkflowId> {
        self.register_workflow_at(caller, name, phases, authorized_triggers, fee, Utc::now())
    }

    pub fn register_workflow_at(
        &mut self,
        caller: Principal,
        name: impl Into<String>,
        phases: Vec<PhaseSpec>,
        authorized_triggers: BTreeSet<Principal>,
        fee: u64,
        now: DateTime<Utc>,
    ) -> WorkflowResult<WorkflowId> {
        self.access.require_creator(&caller)?;
        if fee < self.creation_fee {
            return Err(WorkflowError::InsufficientFee {
                required: self.creation_fee,
                provided: fee,
            });
        }

        let name = name.into();
        let workflow_id = WorkflowId::derive(&name, &caller, now, self.nonce);
        let definition =
            WorkflowDefinition::new(workflow_id, name, caller, phases, authorized_triggers, now)?;
        self.nonce += 1;
        self.fee_sink.collect(fee);

        self.events.emit(WorkflowEvent::WorkflowRegistered {
            workflow_id,
            name: definition.name.clone(),
            creator: caller,
            phase_count: definition.phase_count(),
        });
        self.registry.insert(definition);
        Ok(workflow_id)
    }

    // ── Execution start ──────────────────────────────────────────────

    /// Start an execution of a registered workflow.
    pub fn execute_workflow(
        &mut self,
        caller: Principal,
        workflow_id: WorkflowId,
        payload: Vec<u8>,
        fee: u64,
    ) -> WorkflowResult<ExecutionId> {
        self.execute_workflow_at(caller, workflow_id, payload, fee, Utc::now())
    }

    pub fn execute_workflow_at(
        &mut self,
        caller: Principal,
        workflow_id: WorkflowId,
        payload: Vec<u8>,
        fee: u64,
        now: DateTime<Utc>,
    ) -> WorkflowResult<ExecutionId> {
        let definition = self.registry.get(&workflow_id)?.clone();
        if !definition.is_active {
            return Err(WorkflowError::WorkflowInactive(workflow_id));
        }
        if fee < self.execution_fee {
            return Err(WorkflowError::InsufficientFee {
                required: self.execution_fee,
                provided: fee,
            });
        }

        let execution_id = ExecutionId::derive(&workflow_id, &caller, now, self.nonce);
        self.nonce += 1;
        self.fee_sink.collect(fee);

        let mut execution = WorkflowExecution::new(
            execution_id,
            workflow_id,
            payload,
            caller,
            definition.phase_count(),
            now,
        );
        self.events.emit(WorkflowEvent::WorkflowExecutionStarted {
            execution_id,
            workflow_id,
            initiator: caller,
        });
        tracing::info!(
            execution_id = %execution_id.short(),
            workflow_id = %workflow_id.short(),
            "workflow execution started"
        );

        let Self {
            identity,
            scheduler,
            mailbox,
            operators,
            events,
            ..
        } = self;
        let mut ctx = DispatchContext {
            now,
            identity: *identity,
            mailbox: mailbox.as_mut(),
            operators: operators.as_ref(),
            events,
        };
        scheduler.advance(&mut execution, &definition, &mut ctx);

        self.executions.insert(execution_id, execution);
        Ok(execution_id)
    }

    // ── Coordination submissions ─────────────────────────────────────

    /// Record one operator's response to a coordination phase. The
    /// response that meets the quorum completes the phase.
    pub fn submit_coordination_response(
        &mut self,
        caller: Principal,
        execution_id: ExecutionId,
        phase_index: usize,
        response: Vec<u8>,
    ) -> WorkflowResult<()> {
        self.submit_coordination_response_at(caller, execution_id, phase_index, response, Utc::now())
    }

    pub fn submit_coordination_response_at(
        &mut self,
        caller: Principal,
        execution_id: ExecutionId,
        phase_index: usize,
        response: Vec<u8>,
        now: DateTime<Utc>,
    ) -> WorkflowResult<()> {
        let Self {
            identity,
            scheduler,
            executions,
            registry,
            mailbox,
            operators,
            events,
            ..
        } = self;
        let execution = executions
            .get_mut(&execution_id)
            .ok_or(WorkflowError::ExecutionNotFound(execution_id))?;
        let definition = registry.get(&execution.workflow_id)?.clone();
        check_phase_index(&definition, phase_index)?;

        {
            let round = execution
                .coordination
                .get(&phase_index)
                .ok_or(WorkflowError::PhaseNotActive { phase: phase_index })?;
            if round.quorum_met() {
                return Err(WorkflowError::QuorumAlreadyMet { phase: phase_index });
            }
            if round.has_responded(&caller) {
                return Err(WorkflowError::DuplicateResponder { phase: phase_index });
            }
        }
        if execution.is_complete {
            return Err(WorkflowError::ExecutionComplete(execution_id));
        }
        if execution.phase_status(phase_index) != Some(PhaseStatus::Active) {
            return Err(WorkflowError::PhaseNotActive { phase: phase_index });
        }

        let (received, required, consensus) = {
            let round = execution
                .coordination
                .get_mut(&phase_index)
                .ok_or(WorkflowError::PhaseNotActive { phase: phase_index })?;
            round.record(caller, response);
            (
                round.received_responses,
                round.required_responses,
                round.quorum_met().then(|| round.aggregate()),
            )
        };
        events.emit(WorkflowEvent::CoordinationResponseReceived {
            execution_id,
            phase_index,
            responder: caller,
            received,
            required,
        });

        if let Some(consensus) = consensus {
            execution.complete_phase(phase_index, consensus);
            events.emit(WorkflowEvent::PhaseCompleted {
                execution_id,
                phase_index,
            });
            let mut ctx = DispatchContext {
                now,
                identity: *identity,
                mailbox: mailbox.as_mut(),
                operators: operators.as_ref(),
                events,
            };
            scheduler.advance(execution, &definition, &mut ctx);
        }
        Ok(())
    }

    // ── Monitoring submissions ───────────────────────────────────────

    /// Record one operator's monitoring update, rate-limited per
    /// operator. The update that meets the target completes the phase
    /// with the encoded update log as its result.
    pub fn submit_monitoring_update(
        &mut self,
        caller: Principal,
        execution_id: ExecutionId,
        phase_index: usize,
        update: Vec<u8>,
    ) -> WorkflowResult<()> {
        self.submit_monitoring_update_at(caller, execution_id, phase_index, update, Utc::now())
    }

    pub fn submit_monitoring_update_at(
        &mut self,
        caller: Principal,
        execution_id: ExecutionId,
        phase_index: usize,
        update: Vec<u8>,
        now: DateTime<Utc>,
    ) -> WorkflowResult<()> {
        let Self {
            identity,
            scheduler,
            executions,
            registry,
            mailbox,
            operators,
            events,
            ..
        } = self;
        let execution = executions
            .get_mut(&execution_id)
            .ok_or(WorkflowError::ExecutionNotFound(execution_id))?;
        let definition = registry.get(&execution.workflow_id)?.clone();
        check_phase_index(&definition, phase_index)?;

        if !execution.monitoring.contains_key(&phase_index) {
            return Err(WorkflowError::PhaseNotActive { phase: phase_index });
        }
        if execution.is_complete {
            return Err(WorkflowError::ExecutionComplete(execution_id));
        }
        if execution.phase_status(phase_index) != Some(PhaseStatus::Active) {
            return Err(WorkflowError::PhaseNotActive { phase: phase_index });
        }

        let (received, required, log) = {
            let state = execution
                .monitoring
                .get_mut(&phase_index)
                .ok_or(WorkflowError::PhaseNotActive { phase: phase_index })?;
            if !state.accepts_from(&caller, now) {
                return Err(WorkflowError::UpdateTooFrequent { phase: phase_index });
            }
            state.record(caller, update, now);
            (
                state.received_updates,
                state.required_updates,
                state.target_met().then(|| state.encoded_log()),
            )
        };
        events.emit(WorkflowEvent::MonitoringUpdateReceived {
            execution_id,
            phase_index,
            operator: caller,
            received,
            required,
        });

        if let Some(log) = log {
            execution.complete_phase(phase_index, log);
            events.emit(WorkflowEvent::PhaseCompleted {
                execution_id,
                phase_index,
            });
            let mut ctx = DispatchContext {
                now,
                identity: *identity,
                mailbox: mailbox.as_mut(),
                operators: operators.as_ref(),
                events,
            };
            scheduler.advance(execution, &definition, &mut ctx);
        }
        Ok(())
    }

    // ── Conditional triggers ─────────────────────────────────────────

    /// Fire a conditional phase's trigger with the presented data.
    /// The caller must be a global trigger source, one of the
    /// workflow's authorized triggers, or the workflow creator.
    pub fn trigger_conditional_phase(
        &mut self,
        caller: Principal,
        execution_id: ExecutionId,
        phase_index: usize,
        trigger_data: Vec<u8>,
    ) -> WorkflowResult<()> {
        self.trigger_conditional_phase_at(caller, execution_id, phase_index, trigger_data, Utc::now())
    }

    pub fn trigger_conditional_phase_at(
        &mut self,
        caller: Principal,
        execution_id: ExecutionId,
        phase_index: usize,
        trigger_data: Vec<u8>,
        now: DateTime<Utc>,
    ) -> WorkflowResult<()> {
        let Self {
            identity,
            access,
            scheduler,
            executions,
            registry,
            mailbox,
            operators,
            events,
            ..
        } = self;
        let execution = executions
            .get_mut(&execution_id)
            .ok_or(WorkflowError::ExecutionNotFound(execution_id))?;
        let definition = registry.get(&execution.workflow_id)?.clone();
        check_phase_index(&definition, phase_index)?;

        let verdict = {
            let record = execution
                .triggers
                .get(&phase_index)
                .ok_or(WorkflowError::PhaseNotActive { phase: phase_index })?;
            if record.triggered {
                return Err(WorkflowError::AlreadyTriggered { phase: phase_index });
            }
            record.condition.evaluate(&trigger_data, now)
        };
        if execution.is_complete {
            return Err(WorkflowError::ExecutionComplete(execution_id));
        }
        if execution.phase_status(phase_index) != Some(PhaseStatus::ConditionalWaiting) {
            return Err(WorkflowError::PhaseNotActive { phase: phase_index });
        }
        access.require_trigger(&definition, &caller)?;

        if let ConditionVerdict::NotSatisfied { reason } = verdict {
            return Err(WorkflowError::InvalidTriggerCondition(reason));
        }

        if let Some(record) = execution.triggers.get_mut(&phase_index) {
            record.fire(caller, trigger_data.clone(), now);
        }
        execution.complete_phase(phase_index, trigger_data);
        events.emit(WorkflowEvent::ConditionalTriggerActivated {
            execution_id,
            phase_index,
            source: caller,
        });
        events.emit(WorkflowEvent::PhaseCompleted {
            execution_id,
            phase_index,
        });

        let mut ctx = DispatchContext {
            now,
            identity: *identity,
            mailbox: mailbox.as_mut(),
            operators: operators.as_ref(),
            events,
        };
        scheduler.advance(execution, &definition, &mut ctx);
        Ok(())
    }

    // ── Timeouts ─────────────────────────────────────────────────────

    /// Time out one overdue phase, failing the whole execution.
    pub fn check_phase_timeout(
        &mut self,
        execution_id: ExecutionId,
        phase_index: usize,
    ) -> WorkflowResult<()> {
        self.check_phase_timeout_at(execution_id, phase_index, Utc::now())
    }

    pub fn check_phase_timeout_at(
        &mut self,
        execution_id: ExecutionId,
        phase_index: usize,
        now: DateTime<Utc>,
    ) -> WorkflowResult<()> {
        let Self {
            identity,
            scheduler,
            executions,
            monitor,
            mailbox,
            operators,
            events,
            ..
        } = self;
        let execution = executions
            .get_mut(&execution_id)
            .ok_or(WorkflowError::ExecutionNotFound(execution_id))?;
        if execution.is_complete {
            return Err(WorkflowError::ExecutionComplete(execution_id));
        }
        monitor.check(execution, phase_index, now)?;

        execution.time_out_phase(phase_index);
        events.emit(WorkflowEvent::PhaseTimedOut {
            execution_id,
            phase_index,
        });
        tracing::warn!(
            execution_id = %execution_id.short(),
            phase = phase_index,
            "phase timed out"
        );

        let mut ctx = DispatchContext {
            now,
            identity: *identity,
            mailbox: mailbox.as_mut(),
            operators: operators.as_ref(),
            events,
        };
        scheduler.settle(execution, &mut ctx);
        Ok(())
    }

    /// Sweep every live execution for overdue phases and time them
    /// out. Returns the `(execution, phase)` pairs that fired.
    pub fn check_timeouts(&mut self) -> Vec<(ExecutionId, usize)> {
        self.check_timeouts_at(Utc::now())
    }

    pub fn check_timeouts_at(&mut self, now: DateTime<Utc>) -> Vec<(ExecutionId, usize)> {
        let candidates: Vec<(ExecutionId, usize)> = self
            .executions
            .iter()
            .filter(|(_, execution)| !execution.is_complete)
            .flat_map(|(id, execution)| {
                self.monitor
                    .overdue(execution, now)
                    .into_iter()
                    .map(|index| (*id, index))
                    .collect::<Vec<_>>()
            })
            .collect();

        let mut fired = Vec::new();
        for (execution_id, phase_index) in candidates {
            // the first timeout completes the execution; later
            // candidates for the same execution are rejected
            if self
                .check_phase_timeout_at(execution_id, phase_index, now)
                .is_ok()
            {
                fired.push((execution_id, phase_index));
            }
        }
        fired
    }

    // ── Administration ───────────────────────────────────────────────

    /// Permit a principal to register workflows. Admin only.
    pub fn authorize_workflow_creator(
        &mut self,
        caller: Principal,
        creator: Principal,
    ) -> WorkflowResult<()> {
        self.access.require_admin(&caller)?;
        self.access.authorize_creator(creator);
        self.events
            .emit(WorkflowEvent::WorkflowCreatorAuthorized { creator });
        Ok(())
    }

    /// Permit a principal to fire conditional phases of any workflow.
    /// Admin only.
    pub fn authorize_trigger_source(
        &mut self,
        caller: Principal,
        source: Principal,
    ) -> WorkflowResult<()> {
        self.access.require_admin(&caller)?;
        self.access.authorize_trigger_source(source);
        self.events
            .emit(WorkflowEvent::TriggerSourceAuthorized { source });
        Ok(())
    }

    /// Update the creation and execution fees. Admin only.
    pub fn set_fees(
        &mut self,
        caller: Principal,
        creation_fee: u64,
        execution_fee: u64,
    ) -> WorkflowResult<()> {
        self.access.require_admin(&caller)?;
        self.creation_fee = creation_fee;
        self.execution_fee = execution_fee;
        Ok(())
    }

    /// Activate or deactivate a workflow. Inactive workflows reject
    /// new executions; running executions are unaffected. Admin only.
    pub fn set_workflow_active(
        &mut self,
        caller: Principal,
        workflow_id: WorkflowId,
        active: bool,
    ) -> WorkflowResult<()> {
        self.access.require_admin(&caller)?;
        self.registry.set_active(&workflow_id, active)
    }

    // ── Views ────────────────────────────────────────────────────────

    pub fn workflow(&self, workflow_id: &WorkflowId) -> WorkflowResult<&WorkflowDefinition> {
        self.registry.get(workflow_id)
    }

    pub fn execution(&self, execution_id: &ExecutionId) -> WorkflowResult<&WorkflowExecution> {
        self.executions
            .get(execution_id)
            .ok_or(WorkflowError::ExecutionNotFound(*execution_id))
    }

    pub fn phase_status(
        &self,
        execution_id: &ExecutionId,
        phase_index: usize,
    ) -> WorkflowResult<PhaseStatus> {
        let execution = self.execution(execution_id)?;
        execution
            .phase_status(phase_index)
            .ok_or(WorkflowError::PhaseNotFound {
                index: phase_index,
                phase_count: execution.phase_count(),
            })
    }

    /// The phase result, present exactly when the phase completed.
    pub fn phase_result(
        &self,
        execution_id: &ExecutionId,
        phase_index: usize,
    ) -> WorkflowResult<Option<&[u8]>> {
        let execution = self.execution(execution_id)?;
        if phase_index >= execution.phase_count() {
            return Err(WorkflowError::PhaseNotFound {
                index: phase_index,
                phase_count: execution.phase_count(),
            });
        }
        Ok(execution.phase_result(phase_index))
    }

    pub fn workflows_by_name(&self, name: &str) -> Vec<&WorkflowDefinition> {
        self.registry.versions_by_name(name)
    }

    pub fn workflow_count(&self) -> usize {
        self.registry.count()
    }

    pub fn execution_count(&self) -> usize {
        self.executions.len()
    }

    /// Executions that have not reached a terminal state.
    pub fn active_executions(&self) -> Vec<&WorkflowExecution> {
        self.executions
            .values()
            .filter(|e| !e.is_complete)
            .collect()
    }

    /// Events for one execution, in emission order.
    pub fn events_for(&self, execution_id: &ExecutionId) -> &[EventRecord] {
        self.events.events_for(execution_id)
    }

    /// Registration and authorization events, in emission order.
    pub fn registry_events(&self) -> &[EventRecord] {
        self.events.registry_events()
    }

    pub fn fees(&self) -> (u64, u64) {
        (self.creation_fee, self.execution_fee)
    }
}

fn check_phase_index(definition: &WorkflowDefinition, index: usize) -> WorkflowResult<()> {
    if index >= definition.phase_count() {
        return Err(WorkflowError::PhaseNotFound {
            index,
            phase_count: definition.phase_count(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use conductor_types::OperatorSetId;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn principal(n: u8) -> Principal {
        Principal::new([n; 20])
    }

    const ADMIN: u8 = 1;
    const CREATOR: u8 = 2;

    fn ts() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    fn make_engine() -> WorkflowEngine {
        let mut engine =
            WorkflowEngine::new(EngineConfig::new(principal(0xFF), principal(ADMIN)));
        engine
            .authorize_workflow_creator(principal(ADMIN), principal(CREATOR))
            .unwrap();
        engine
    }

    fn one_immediate() -> Vec<PhaseSpec> {
        vec![PhaseSpec::immediate("dispatch", OperatorSetId(0))]
    }

    #[test]
    fn unauthorized_creator_rejected() {
        let mut engine = make_engine();
        let result = engine.register_workflow_at(
            principal(9),
            "wf",
            one_immediate(),
            BTreeSet::new(),
            0,
            ts(),
        );
        assert!(matches!(result, Err(WorkflowError::Unauthorized)));
        assert_eq!(engine.workflow_count(), 0);
    }

    #[test]
    fn creation_fee_enforced_and_forwarded() {
        #[derive(Clone, Default)]
        struct SharedFees(Rc<RefCell<u64>>);
        impl FeeSink for SharedFees {
            fn collect(&mut self, amount: u64) {
                *self.0.borrow_mut() += amount;
            }
        }

        let fees = SharedFees::default();
        let mut engine = WorkflowEngine::new(
            EngineConfig::new(principal(0xFF), principal(ADMIN)).with_fees(100, 10),
        )
        .with_fee_sink(fees.clone());
        engine
            .authorize_workflow_creator(principal(ADMIN), principal(CREATOR))
            .unwrap();

        let short = engine.register_workflow_at(
            principal(CREATOR),
            "wf",
            one_immediate(),
            BTreeSet::new(),
            99,
            ts(),
        );
        assert!(matches!(
            short,
            Err(WorkflowError::InsufficientFee {
                required: 100,
                provided: 99
            })
        ));
        assert_eq!(*fees.0.borrow(), 0);

        engine
            .register_workflow_at(
                principal(CREATOR),
                "wf",
                one_immediate(),
                BTreeSet::new(),
                120,
                ts(),
            )
            .unwrap();
        assert_eq!(*fees.0.borrow(), 120);
    }

    #[test]
    fn invalid_definition_leaves_no_state() {
        let mut engine = make_engine();
        let phases = vec![PhaseSpec::immediate("p", OperatorSetId(0)).with_timeout(0)];
        let result =
            engine.register_workflow_at(principal(CREATOR), "wf", phases, BTreeSet::new(), 0, ts());
        assert!(matches!(
            result,
            Err(WorkflowError::InvalidTimeout { phase: 0 })
        ));
        assert_eq!(engine.workflow_count(), 0);
        assert!(engine.registry_events().is_empty());
    }

    #[test]
    fn same_inputs_get_distinct_ids_via_nonce() {
        let mut engine = make_engine();
        let a = engine
            .register_workflow_at(
                principal(CREATOR),
                "wf",
                one_immediate(),
                BTreeSet::new(),
                0,
                ts(),
            )
            .unwrap();
        let b = engine
            .register_workflow_at(
                principal(CREATOR),
                "wf",
                one_immediate(),
                BTreeSet::new(),
                0,
                ts(),
            )
            .unwrap();
        assert_ne!(a, b);
        assert_eq!(engine.workflows_by_name("wf").len(), 2);
    }

    #[test]
    fn execute_unknown_workflow_rejected() {
        let mut engine = make_engine();
        let missing = WorkflowId::derive("x", &principal(1), ts(), 99);
        assert!(matches!(
            engine.execute_workflow_at(principal(3), missing, Vec::new(), 0, ts()),
            Err(WorkflowError::WorkflowNotFound(_))
        ));
    }

    #[test]
    fn inactive_workflow_rejects_executions() {
        let mut engine = make_engine();
        let wf = engine
            .register_workflow_at(
                principal(CREATOR),
                "wf",
                one_immediate(),
                BTreeSet::new(),
                0,
                ts(),
            )
            .unwrap();

        // only the admin may deactivate
        assert!(matches!(
            engine.set_workflow_active(principal(CREATOR), wf, false),
            Err(WorkflowError::Unauthorized)
        ));
        engine
            .set_workflow_active(principal(ADMIN), wf, false)
            .unwrap();

        assert!(matches!(
            engine.execute_workflow_at(principal(3), wf, Vec::new(), 0, ts()),
            Err(WorkflowError::WorkflowInactive(_))
        ));

        engine.set_workflow_active(principal(ADMIN), wf, true).unwrap();
        assert!(engine
            .execute_workflow_at(principal(3), wf, Vec::new(), 0, ts())
            .is_ok());
    }

    #[test]
    fn set_fees_is_admin_gated() {
        let mut engine = make_engine();
        assert!(engine.set_fees(principal(9), 5, 5).is_err());
        engine.set_fees(principal(ADMIN), 5, 7).unwrap();
        assert_eq!(engine.fees(), (5, 7));
    }

    #[test]
    fn views_report_execution_state() {
        let mut engine = make_engine();
        let wf = engine
            .register_workflow_at(
                principal(CREATOR),
                "wf",
                one_immediate(),
                BTreeSet::new(),
                0,
                ts(),
            )
            .unwrap();
        let exec = engine
            .execute_workflow_at(principal(3), wf, vec![0xAA], 0, ts())
            .unwrap();

        assert_eq!(
            engine.phase_status(&exec, 0).unwrap(),
            PhaseStatus::Completed
        );
        assert!(engine.phase_result(&exec, 0).unwrap().is_some());
        assert!(matches!(
            engine.phase_status(&exec, 7),
            Err(WorkflowError::PhaseNotFound { index: 7, .. })
        ));
        assert_eq!(engine.execution_count(), 1);
        assert!(engine.active_executions().is_empty());
    }

    #[test]
    fn submissions_to_completed_execution_rejected() {
        let mut engine = make_engine();
        let wf = engine
            .register_workflow_at(
                principal(CREATOR),
                "wf",
                vec![
                    PhaseSpec::immediate("a", OperatorSetId(0)),
                    PhaseSpec::continuous("watch", OperatorSetId(0), 60, 1)
                        .with_dependencies(vec![0]),
                ],
                BTreeSet::new(),
                0,
                ts(),
            )
            .unwrap();
        let exec = engine
            .execute_workflow_at(principal(3), wf, Vec::new(), 0, ts())
            .unwrap();

        engine
            .submit_monitoring_update_at(principal(4), exec, 1, vec![1], ts())
            .unwrap();
        assert!(engine.execution(&exec).unwrap().is_complete);

        let result = engine.submit_monitoring_update_at(principal(5), exec, 1, vec![2], ts());
        assert!(matches!(result, Err(WorkflowError::ExecutionComplete(_))));
    }
}
