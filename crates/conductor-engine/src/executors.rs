//! Phase launch strategies: one per execution discipline
//!
//! The launcher dispatches a phase whose dependencies are met.
//! Immediate and aggregation phases complete synchronously; the other
//! three arm state and wait for external submissions. The launcher
//! mutates only the execution record and the supplied collaborators —
//! it never looks at other phases beyond the declared dependencies.

use crate::collaborators::{OperatorRegistry, TaskMailbox, TaskRequest};
use conductor_types::{
    CoordinationRound, EventSink, MonitoringState, PhaseKind, Principal, TriggerCondition,
    TriggerRecord, WorkflowDefinition, WorkflowEvent, WorkflowExecution, BASIS_POINTS,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Operator count assumed when the registry does not know a set.
pub const DEFAULT_OPERATOR_COUNT: u32 = 5;

/// Everything a dispatch needs beyond the execution record itself.
pub(crate) struct DispatchContext<'a> {
    pub now: DateTime<Utc>,
    pub identity: Principal,
    pub mailbox: &'a mut dyn TaskMailbox,
    pub operators: &'a dyn OperatorRegistry,
    pub events: &'a mut dyn EventSink,
}

/// The context-enriched payload submitted with an immediate task:
/// the execution's initial payload, the results of the phase's
/// declared dependencies in order, and the phase's shaping hints.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskPayload {
    pub initial_payload: Vec<u8>,
    pub dependency_results: Vec<Vec<u8>>,
    pub metadata: Vec<u8>,
}

impl TaskPayload {
    pub fn encode(&self) -> Vec<u8> {
        serde_json::to_vec(self).expect("payload serialization is infallible")
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

/// Quorum for a coordination phase: the threshold fraction of the
/// operator set, floored, but never below one response.
pub fn quorum_size(operator_count: u32, threshold_bp: u32) -> u32 {
    let required = u64::from(operator_count) * u64::from(threshold_bp) / u64::from(BASIS_POINTS);
    (required as u32).max(1)
}

/// Dispatches phases according to their execution discipline.
#[derive(Clone, Debug, Default)]
pub struct PhaseLauncher;

impl PhaseLauncher {
    pub fn new() -> Self {
        Self
    }

    /// Dispatch phase `index`. The caller has verified the phase is
    /// pending and its dependencies are completed.
    pub(crate) fn launch(
        &self,
        execution: &mut WorkflowExecution,
        definition: &WorkflowDefinition,
        index: usize,
        ctx: &mut DispatchContext<'_>,
    ) {
        let phase = &definition.phases[index];
        match &phase.kind {
            PhaseKind::Immediate => self.launch_immediate(execution, definition, index, ctx),
            PhaseKind::Coordination {
                consensus_threshold_bp,
            } => self.launch_coordination(execution, definition, index, *consensus_threshold_bp, ctx),
            PhaseKind::Continuous {
                update_interval_secs,
                required_updates,
            } => self.launch_continuous(
                execution,
                definition,
                index,
                *update_interval_secs,
                *required_updates,
                ctx,
            ),
            PhaseKind::Conditional { condition } => {
                self.launch_conditional(execution, definition, index, condition.clone(), ctx)
            }
            PhaseKind::Aggregation => self.launch_aggregation(execution, definition, index, ctx),
        }
    }

    fn launch_immediate(
        &self,
        execution: &mut WorkflowExecution,
        definition: &WorkflowDefinition,
        index: usize,
        ctx: &mut DispatchContext<'_>,
    ) {
        let phase = &definition.phases[index];
        execution.begin_phase(index, ctx.now, phase.timeout_secs);
        ctx.events.emit(WorkflowEvent::PhaseStarted {
            execution_id: execution.execution_id,
            phase_index: index,
        });

        let payload = TaskPayload {
            initial_payload: execution.initial_payload.clone(),
            dependency_results: phase
                .dependencies
                .iter()
                .map(|&d| execution.phase_result(d).unwrap_or(&[]).to_vec())
                .collect(),
            metadata: phase.metadata.clone(),
        };
        let request = TaskRequest {
            refund_collector: execution.initiator,
            avs_fee: 0,
            executor_identity: ctx.identity,
            operator_set: phase.operator_set,
            payload: payload.encode(),
        };

        match ctx.mailbox.create_task(request) {
            Ok(handle) => {
                tracing::debug!(
                    execution_id = %execution.execution_id.short(),
                    phase = index,
                    "immediate task dispatched"
                );
                execution.complete_phase(index, handle.into_bytes());
                ctx.events.emit(WorkflowEvent::PhaseCompleted {
                    execution_id: execution.execution_id,
                    phase_index: index,
                });
            }
            Err(err) => {
                tracing::warn!(
                    execution_id = %execution.execution_id.short(),
                    phase = index,
                    error = %err,
                    "immediate task rejected by mailbox"
                );
                execution.fail_phase(index);
                ctx.events.emit(WorkflowEvent::PhaseFailed {
                    execution_id: execution.execution_id,
                    phase_index: index,
                    reason: err.to_string(),
                });
            }
        }
    }

    fn launch_coordination(
        &self,
        execution: &mut WorkflowExecution,
        definition: &WorkflowDefinition,
        index: usize,
        threshold_bp: u32,
        ctx: &mut DispatchContext<'_>,
    ) {
        let phase = &definition.phases[index];
        execution.begin_phase(index, ctx.now, phase.timeout_secs);
        ctx.events.emit(WorkflowEvent::PhaseStarted {
            execution_id: execution.execution_id,
            phase_index: index,
        });

        let operator_count = ctx
            .operators
            .operator_count(phase.operator_set)
            .unwrap_or(DEFAULT_OPERATOR_COUNT);
        let required = quorum_size(operator_count, threshold_bp);
        execution
            .coordination
            .insert(index, CoordinationRound::new(required));

        ctx.events.emit(WorkflowEvent::CoordinationPhaseStarted {
            execution_id: execution.execution_id,
            phase_index: index,
            required_responses: required,
        });
    }

    fn launch_continuous(
        &self,
        execution: &mut WorkflowExecution,
        definition: &WorkflowDefinition,
        index: usize,
        update_interval_secs: u64,
        required_updates: u32,
        ctx: &mut DispatchContext<'_>,
    ) {
        let phase = &definition.phases[index];
        execution.begin_phase(index, ctx.now, phase.timeout_secs);
        ctx.events.emit(WorkflowEvent::PhaseStarted {
            execution_id: execution.execution_id,
            phase_index: index,
        });

        execution.monitoring.insert(
            index,
            MonitoringState::new(update_interval_secs, required_updates),
        );
        ctx.events.emit(WorkflowEvent::ContinuousMonitoringStarted {
            execution_id: execution.execution_id,
            phase_index: index,
            required_updates,
        });
    }

    fn launch_conditional(
        &self,
        execution: &mut WorkflowExecution,
        definition: &WorkflowDefinition,
        index: usize,
        condition: TriggerCondition,
        ctx: &mut DispatchContext<'_>,
    ) {
        let phase = &definition.phases[index];
        execution.begin_conditional_wait(index, ctx.now, phase.timeout_secs);
        execution.triggers.insert(index, TriggerRecord::armed(condition));

        ctx.events.emit(WorkflowEvent::ConditionalTriggerSet {
            execution_id: execution.execution_id,
            phase_index: index,
        });
    }

    fn launch_aggregation(
        &self,
        execution: &mut WorkflowExecution,
        definition: &WorkflowDefinition,
        index: usize,
        ctx: &mut DispatchContext<'_>,
    ) {
        let phase = &definition.phases[index];
        execution.begin_phase(index, ctx.now, phase.timeout_secs);
        ctx.events.emit(WorkflowEvent::PhaseStarted {
            execution_id: execution.execution_id,
            phase_index: index,
        });

        // dependency results are present: the phase only dispatches
        // once every dependency has completed
        let results: Vec<Vec<u8>> = phase
            .dependencies
            .iter()
            .map(|&d| execution.phase_result(d).unwrap_or(&[]).to_vec())
            .collect();
        let aggregated =
            serde_json::to_vec(&results).expect("aggregate serialization is infallible");

        execution.complete_phase(index, aggregated);
        ctx.events.emit(WorkflowEvent::PhaseCompleted {
            execution_id: execution.execution_id,
            phase_index: index,
        });
    }
}
