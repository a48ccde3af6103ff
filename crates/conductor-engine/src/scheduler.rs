//! Dependency scheduler: advances executions as phases complete
//!
//! The scheduler walks phases in index order and dispatches every
//! pending phase whose dependencies have all completed. Because
//! immediate and aggregation phases complete synchronously, one
//! advance may unlock further phases; the scheduler repeats passes
//! until nothing new dispatches, then settles the workflow outcome.
//!
//! Index-ordered iteration is what makes the engine deterministic:
//! for a given execution state, two runs dispatch the same phases in
//! the same order and emit the same events.

use crate::executors::{DispatchContext, PhaseLauncher};
use conductor_types::{
    EventSink, PhaseStatus, WorkflowDefinition, WorkflowEvent, WorkflowExecution,
};

/// Drives phase dispatch and workflow completion.
#[derive(Clone, Debug, Default)]
pub struct PhaseScheduler {
    launcher: PhaseLauncher,
}

impl PhaseScheduler {
    pub fn new() -> Self {
        Self {
            launcher: PhaseLauncher::new(),
        }
    }

    /// Dispatch every phase that is ready, repeating until quiescent,
    /// then settle the workflow outcome. No-op on a complete execution.
    pub(crate) fn advance(
        &self,
        execution: &mut WorkflowExecution,
        definition: &WorkflowDefinition,
        ctx: &mut DispatchContext<'_>,
    ) {
        if execution.is_complete {
            return;
        }

        loop {
            let mut dispatched = false;
            for index in 0..definition.phase_count() {
                if execution.phase_status(index) != Some(PhaseStatus::Pending) {
                    continue;
                }
                if !execution.dependencies_met(&definition.phases[index].dependencies) {
                    continue;
                }
                self.launcher.launch(execution, definition, index, ctx);
                dispatched = true;
            }
            // a failed dispatch is workflow-fatal; stop opening new work
            if !dispatched || execution.has_failed_phase() {
                break;
            }
        }

        self.settle(execution, ctx);
    }

    /// Mark the execution complete if its outcome is decided: any
    /// failed or timed-out phase fails the workflow; all phases
    /// completed succeeds it.
    pub(crate) fn settle(&self, execution: &mut WorkflowExecution, ctx: &mut DispatchContext<'_>) {
        if execution.is_complete {
            return;
        }

        let successful = if execution.has_failed_phase() {
            false
        } else if execution.all_phases_completed() {
            true
        } else {
            return;
        };

        execution.finish(successful, ctx.now);
        ctx.events.emit(WorkflowEvent::WorkflowCompleted {
            execution_id: execution.execution_id,
            successful,
        });
        tracing::info!(
            execution_id = %execution.execution_id.short(),
            successful,
            "workflow execution completed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{
        MailboxError, QueueMailbox, StaticOperatorRegistry, TaskHandle, TaskMailbox, TaskRequest,
    };
    use crate::executors::TaskPayload;
    use chrono::{DateTime, Utc};
    use conductor_types::{
        EventLog, ExecutionId, OperatorSetId, PhaseSpec, Principal, TriggerCondition, WorkflowId,
    };
    use std::collections::BTreeSet;

    fn principal(n: u8) -> Principal {
        Principal::new([n; 20])
    }

    fn ts() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    fn make_definition(phases: Vec<PhaseSpec>) -> WorkflowDefinition {
        WorkflowDefinition::new(
            WorkflowId::derive("wf", &principal(1), ts(), 0),
            "wf",
            principal(1),
            phases,
            BTreeSet::new(),
            ts(),
        )
        .unwrap()
    }

    fn make_execution(definition: &WorkflowDefinition) -> WorkflowExecution {
        let id = ExecutionId::derive(&definition.id, &principal(2), ts(), 0);
        WorkflowExecution::new(
            id,
            definition.id,
            vec![0xAA],
            principal(2),
            definition.phase_count(),
            ts(),
        )
    }

    struct Harness {
        mailbox: QueueMailbox,
        operators: StaticOperatorRegistry,
        events: EventLog,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                mailbox: QueueMailbox::new(),
                operators: StaticOperatorRegistry::new(),
                events: EventLog::new(),
            }
        }

        fn ctx(&mut self) -> DispatchContext<'_> {
            DispatchContext {
                now: ts(),
                identity: principal(0xFF),
                mailbox: &mut self.mailbox,
                operators: &self.operators,
                events: &mut self.events,
            }
        }
    }

    #[test]
    fn chain_of_immediates_runs_to_completion() {
        let definition = make_definition(vec![
            PhaseSpec::immediate("a", OperatorSetId(0)),
            PhaseSpec::immediate("b", OperatorSetId(0)).with_dependencies(vec![0]),
            PhaseSpec::immediate("c", OperatorSetId(0)).with_dependencies(vec![1]),
        ]);
        let mut execution = make_execution(&definition);
        let mut harness = Harness::new();
        let scheduler = PhaseScheduler::new();

        scheduler.advance(&mut execution, &definition, &mut harness.ctx());

        assert!(execution.is_complete);
        assert!(execution.successful);
        assert!(execution.all_phases_completed());
        // one mailbox task per immediate phase
        assert_eq!(harness.mailbox.submitted().len(), 3);

        // the second task carries the first phase's result as context
        let payload = TaskPayload::decode(&harness.mailbox.submitted()[1].payload).unwrap();
        assert_eq!(payload.initial_payload, vec![0xAA]);
        assert_eq!(payload.dependency_results, vec![b"task-0".to_vec()]);
    }

    #[test]
    fn waiting_phase_blocks_completion() {
        let definition = make_definition(vec![
            PhaseSpec::immediate("a", OperatorSetId(0)),
            PhaseSpec::coordination("quorum", OperatorSetId(0), 5_000).with_dependencies(vec![0]),
        ]);
        let mut execution = make_execution(&definition);
        let mut harness = Harness::new();
        let scheduler = PhaseScheduler::new();

        scheduler.advance(&mut execution, &definition, &mut harness.ctx());

        assert!(!execution.is_complete);
        assert_eq!(execution.phase_status(0), Some(PhaseStatus::Completed));
        assert_eq!(execution.phase_status(1), Some(PhaseStatus::Active));
        assert!(execution.coordination.contains_key(&1));
    }

    #[test]
    fn dependent_of_waiting_phase_stays_pending() {
        let definition = make_definition(vec![
            PhaseSpec::conditional("gate", OperatorSetId(0), TriggerCondition::None),
            PhaseSpec::immediate("after", OperatorSetId(0)).with_dependencies(vec![0]),
        ]);
        let mut execution = make_execution(&definition);
        let mut harness = Harness::new();
        let scheduler = PhaseScheduler::new();

        scheduler.advance(&mut execution, &definition, &mut harness.ctx());

        assert_eq!(
            execution.phase_status(0),
            Some(PhaseStatus::ConditionalWaiting)
        );
        assert_eq!(execution.phase_status(1), Some(PhaseStatus::Pending));
        assert!(harness.mailbox.submitted().is_empty());
    }

    #[test]
    fn independent_phases_dispatch_in_index_order() {
        let definition = make_definition(vec![
            PhaseSpec::immediate("a", OperatorSetId(0)),
            PhaseSpec::immediate("b", OperatorSetId(0)),
            PhaseSpec::aggregation("fold", OperatorSetId(0)).with_dependencies(vec![0, 1]),
        ]);
        let mut execution = make_execution(&definition);
        let mut harness = Harness::new();
        let scheduler = PhaseScheduler::new();

        scheduler.advance(&mut execution, &definition, &mut harness.ctx());

        assert!(execution.is_complete);
        let started: Vec<usize> = harness
            .events
            .events_for(&execution.execution_id)
            .iter()
            .filter_map(|r| match &r.event {
                WorkflowEvent::PhaseStarted { phase_index, .. } => Some(*phase_index),
                _ => None,
            })
            .collect();
        assert_eq!(started, vec![0, 1, 2]);
    }

    #[test]
    fn mailbox_rejection_fails_the_workflow() {
        struct RejectingMailbox;
        impl TaskMailbox for RejectingMailbox {
            fn create_task(&mut self, _: TaskRequest) -> Result<TaskHandle, MailboxError> {
                Err(MailboxError("queue full".into()))
            }
        }

        let definition = make_definition(vec![
            PhaseSpec::immediate("a", OperatorSetId(0)),
            PhaseSpec::immediate("b", OperatorSetId(0)).with_dependencies(vec![0]),
        ]);
        let mut execution = make_execution(&definition);
        let mut mailbox = RejectingMailbox;
        let operators = StaticOperatorRegistry::new();
        let mut events = EventLog::new();
        let mut ctx = DispatchContext {
            now: ts(),
            identity: principal(0xFF),
            mailbox: &mut mailbox,
            operators: &operators,
            events: &mut events,
        };

        PhaseScheduler::new().advance(&mut execution, &definition, &mut ctx);

        assert!(execution.is_complete);
        assert!(!execution.successful);
        assert_eq!(execution.phase_status(0), Some(PhaseStatus::Failed));
        // the dependent phase never dispatched
        assert_eq!(execution.phase_status(1), Some(PhaseStatus::Pending));
    }

    #[test]
    fn advance_is_a_noop_on_complete_execution() {
        let definition = make_definition(vec![PhaseSpec::immediate("a", OperatorSetId(0))]);
        let mut execution = make_execution(&definition);
        let mut harness = Harness::new();
        let scheduler = PhaseScheduler::new();

        scheduler.advance(&mut execution, &definition, &mut harness.ctx());
        assert!(execution.is_complete);

        let events_before = harness.events.total_events();
        scheduler.advance(&mut execution, &definition, &mut harness.ctx());
        assert_eq!(harness.events.total_events(), events_before);
    }
}
