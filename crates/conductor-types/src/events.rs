//! Events emitted by the engine and the sink they flow through
//!
//! Every externally visible transition emits one event. Events carry
//! no timestamps — timing lives in the execution record — so two
//! engines fed identical operation sequences emit identical event
//! sequences.

use crate::{ExecutionId, Principal, WorkflowId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Events emitted during registration and execution.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkflowEvent {
    WorkflowRegistered {
        workflow_id: WorkflowId,
        name: String,
        creator: Principal,
        phase_count: usize,
    },
    WorkflowExecutionStarted {
        execution_id: ExecutionId,
        workflow_id: WorkflowId,
        initiator: Principal,
    },
    PhaseStarted {
        execution_id: ExecutionId,
        phase_index: usize,
    },
    PhaseCompleted {
        execution_id: ExecutionId,
        phase_index: usize,
    },
    PhaseFailed {
        execution_id: ExecutionId,
        phase_index: usize,
        reason: String,
    },
    PhaseTimedOut {
        execution_id: ExecutionId,
        phase_index: usize,
    },
    ConditionalTriggerSet {
        execution_id: ExecutionId,
        phase_index: usize,
    },
    ConditionalTriggerActivated {
        execution_id: ExecutionId,
        phase_index: usize,
        source: Principal,
    },
    CoordinationPhaseStarted {
        execution_id: ExecutionId,
        phase_index: usize,
        required_responses: u32,
    },
    CoordinationResponseReceived {
        execution_id: ExecutionId,
        phase_index: usize,
        responder: Principal,
        received: u32,
        required: u32,
    },
    ContinuousMonitoringStarted {
        execution_id: ExecutionId,
        phase_index: usize,
        required_updates: u32,
    },
    MonitoringUpdateReceived {
        execution_id: ExecutionId,
        phase_index: usize,
        operator: Principal,
        received: u32,
        required: u32,
    },
    WorkflowCompleted {
        execution_id: ExecutionId,
        successful: bool,
    },
    WorkflowCreatorAuthorized {
        creator: Principal,
    },
    TriggerSourceAuthorized {
        source: Principal,
    },
}

impl WorkflowEvent {
    /// The execution this event belongs to, if any. Registry-level
    /// events (registration, authorization) return `None`.
    pub fn execution_id(&self) -> Option<&ExecutionId> {
        match self {
            Self::WorkflowExecutionStarted { execution_id, .. }
            | Self::PhaseStarted { execution_id, .. }
            | Self::PhaseCompleted { execution_id, .. }
            | Self::PhaseFailed { execution_id, .. }
            | Self::PhaseTimedOut { execution_id, .. }
            | Self::ConditionalTriggerSet { execution_id, .. }
            | Self::ConditionalTriggerActivated { execution_id, .. }
            | Self::CoordinationPhaseStarted { execution_id, .. }
            | Self::CoordinationResponseReceived { execution_id, .. }
            | Self::ContinuousMonitoringStarted { execution_id, .. }
            | Self::MonitoringUpdateReceived { execution_id, .. }
            | Self::WorkflowCompleted { execution_id, .. } => Some(execution_id),
            Self::WorkflowRegistered { .. }
            | Self::WorkflowCreatorAuthorized { .. }
            | Self::TriggerSourceAuthorized { .. } => None,
        }
    }

    /// Snake-case tag for logs.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::WorkflowRegistered { .. } => "workflow_registered",
            Self::WorkflowExecutionStarted { .. } => "workflow_execution_started",
            Self::PhaseStarted { .. } => "phase_started",
            Self::PhaseCompleted { .. } => "phase_completed",
            Self::PhaseFailed { .. } => "phase_failed",
            Self::PhaseTimedOut { .. } => "phase_timed_out",
            Self::ConditionalTriggerSet { .. } => "conditional_trigger_set",
            Self::ConditionalTriggerActivated { .. } => "conditional_trigger_activated",
            Self::CoordinationPhaseStarted { .. } => "coordination_phase_started",
            Self::CoordinationResponseReceived { .. } => "coordination_response_received",
            Self::ContinuousMonitoringStarted { .. } => "continuous_monitoring_started",
            Self::MonitoringUpdateReceived { .. } => "monitoring_update_received",
            Self::WorkflowCompleted { .. } => "workflow_completed",
            Self::WorkflowCreatorAuthorized { .. } => "workflow_creator_authorized",
            Self::TriggerSourceAuthorized { .. } => "trigger_source_authorized",
        }
    }
}

impl std::fmt::Display for WorkflowEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.tag())
    }
}

// ── Event sink ───────────────────────────────────────────────────────

/// Where emitted events go. Production embedders can route events to
/// a log, a bus, or a callback; the engine only needs `emit`.
pub trait EventSink {
    fn emit(&mut self, event: WorkflowEvent);
}

/// A recorded event with its position in the global emission order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Monotonically increasing across the whole engine
    pub sequence: u64,
    /// The event itself
    pub event: WorkflowEvent,
}

/// The bundled sink: an in-memory, queryable event log indexed by
/// execution, with registry-level events kept separately.
#[derive(Clone, Debug, Default)]
pub struct EventLog {
    next_sequence: u64,
    by_execution: BTreeMap<ExecutionId, Vec<EventRecord>>,
    registry: Vec<EventRecord>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Events for one execution, in emission order.
    pub fn events_for(&self, execution_id: &ExecutionId) -> &[EventRecord] {
        self.by_execution
            .get(execution_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Registration and authorization events, in emission order.
    pub fn registry_events(&self) -> &[EventRecord] {
        &self.registry
    }

    pub fn event_count(&self, execution_id: &ExecutionId) -> usize {
        self.events_for(execution_id).len()
    }

    /// Total events recorded across the engine.
    pub fn total_events(&self) -> usize {
        self.next_sequence as usize
    }
}

impl EventSink for EventLog {
    fn emit(&mut self, event: WorkflowEvent) {
        let record = EventRecord {
            sequence: self.next_sequence,
            event,
        };
        self.next_sequence += 1;
        match record.event.execution_id().copied() {
            Some(id) => self.by_execution.entry(id).or_default().push(record),
            None => self.registry.push(record),
        }
    }
}
