//! Data model for the conductor workflow engine
//!
//! A workflow is a named, immutable DAG of phases; an execution is a
//! live instance of one. Phases carry one of five execution
//! disciplines — immediate dispatch, multi-party coordination,
//! continuous monitoring, conditional wait, and dependency
//! aggregation — and type-specific configuration decoded once at the
//! API boundary.
//!
//! This crate is pure data: identifiers, definitions, execution
//! records, trigger conditions, the event vocabulary, and the error
//! taxonomy. The transition rules live in `conductor-engine`.

#![deny(unsafe_code)]

mod condition;
mod definition;
mod errors;
mod events;
mod execution;
mod identity;

pub use condition::{encode_u64, ConditionVerdict, TriggerCondition};
pub use definition::{
    PhaseKind, PhaseSpec, WorkflowDefinition, BASIS_POINTS, MAX_DEPENDENCIES, MAX_PHASES,
};
pub use errors::{WorkflowError, WorkflowResult};
pub use events::{EventLog, EventRecord, EventSink, WorkflowEvent};
pub use execution::{
    CoordinationRound, MonitoringState, MonitoringUpdate, PhaseStatus, TriggerRecord,
    WorkflowExecution,
};
pub use identity::{ExecutionId, OperatorSetId, Principal, WorkflowId};
