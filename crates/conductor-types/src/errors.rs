//! Error types for the conductor engine
//!
//! Validation and authorization errors abort an operation without
//! state change. Phase failures and timeouts are not errors — they are
//! terminal execution states reached through the normal transition
//! path and observed through events and views.

use crate::{ExecutionId, WorkflowId};

/// Errors that can occur in conductor operations
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    // ── Registration-time validation ─────────────────────────────────
    #[error("workflow name must not be empty")]
    EmptyName,

    #[error("phase count {0} outside 1..={max}", max = crate::MAX_PHASES)]
    PhaseCountOutOfRange(usize),

    #[error("phase {phase}: dependency {dependency} is not an earlier phase")]
    InvalidDependency { phase: usize, dependency: usize },

    #[error("phase {phase}: more than {max} dependencies", max = crate::MAX_DEPENDENCIES)]
    TooManyDependencies { phase: usize },

    #[error("phase {phase}: timeout must be positive")]
    InvalidTimeout { phase: usize },

    #[error("phase {phase}: consensus threshold {threshold} outside 1..={max}", max = crate::BASIS_POINTS)]
    InvalidConsensusThreshold { phase: usize, threshold: u32 },

    #[error("phase {phase}: monitoring interval and required updates must be positive")]
    InvalidMonitoringConfig { phase: usize },

    // ── Authorization ────────────────────────────────────────────────
    #[error("caller is not authorized")]
    Unauthorized,

    #[error("caller is not the workflow creator")]
    NotWorkflowCreator,

    #[error("caller is not an authorized trigger source")]
    NotAuthorizedTrigger,

    // ── Economic ─────────────────────────────────────────────────────
    #[error("insufficient fee: required {required}, provided {provided}")]
    InsufficientFee { required: u64, provided: u64 },

    // ── Existence ────────────────────────────────────────────────────
    #[error("workflow not found: {0}")]
    WorkflowNotFound(WorkflowId),

    #[error("execution not found: {0}")]
    ExecutionNotFound(ExecutionId),

    #[error("workflow is inactive: {0}")]
    WorkflowInactive(WorkflowId),

    #[error("phase index {index} out of range for {phase_count} phases")]
    PhaseNotFound { index: usize, phase_count: usize },

    // ── Execution state ──────────────────────────────────────────────
    #[error("execution already complete: {0}")]
    ExecutionComplete(ExecutionId),

    #[error("phase {phase} is not accepting submissions")]
    PhaseNotActive { phase: usize },

    #[error("phase {phase}: caller has already responded")]
    DuplicateResponder { phase: usize },

    #[error("phase {phase}: quorum already met")]
    QuorumAlreadyMet { phase: usize },

    #[error("phase {phase}: update arrived before the operator's interval elapsed")]
    UpdateTooFrequent { phase: usize },

    #[error("phase {phase}: conditional trigger already fired")]
    AlreadyTriggered { phase: usize },

    #[error("phase {phase}: no deadline set")]
    NoTimeoutSet { phase: usize },

    #[error("phase {phase}: deadline has not passed")]
    NotYetTimedOut { phase: usize },

    // ── Semantic ─────────────────────────────────────────────────────
    #[error("trigger condition not satisfied: {0}")]
    InvalidTriggerCondition(String),
}

/// Result type alias for conductor operations
pub type WorkflowResult<T> = Result<T, WorkflowError>;
