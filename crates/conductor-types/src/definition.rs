//! Workflow definitions: the blueprint for multi-phase executions
//!
//! A definition is an ordered sequence of phase specs. Dependencies
//! are phase indices that must be strictly smaller than the dependent
//! phase's own index, so every valid definition is a DAG in
//! topological order by construction.
//!
//! Definitions are immutable once registered.

use crate::{OperatorSetId, Principal, TriggerCondition, WorkflowError, WorkflowId, WorkflowResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Maximum number of phases in a workflow.
pub const MAX_PHASES: usize = 50;
/// Maximum number of dependencies per phase.
pub const MAX_DEPENDENCIES: usize = 10;
/// Denominator for consensus thresholds.
pub const BASIS_POINTS: u32 = 10_000;

// ── Phase kind ───────────────────────────────────────────────────────

/// The execution discipline of a phase, with its type-specific
/// configuration decoded at the API boundary.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PhaseKind {
    /// Dispatch a task to the external mailbox and complete at once.
    Immediate,

    /// Collect responses from the phase's operator set until a quorum
    /// derived from the consensus threshold is reached.
    Coordination {
        /// Required fraction of the operator set, in basis points (1..=10000)
        consensus_threshold_bp: u32,
    },

    /// Collect periodic monitoring updates, rate-limited per operator.
    Continuous {
        /// Minimum seconds between accepted updates from one operator
        update_interval_secs: u64,
        /// Updates required to complete the phase
        required_updates: u32,
    },

    /// Wait for an authorized caller to satisfy the armed condition.
    Conditional {
        /// The condition that must hold for the trigger to fire
        condition: TriggerCondition,
    },

    /// Fold the results of all dependencies into one value and
    /// complete at once.
    Aggregation,
}

impl PhaseKind {
    /// Short tag used in logs and events.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Immediate => "immediate",
            Self::Coordination { .. } => "coordination",
            Self::Continuous { .. } => "continuous",
            Self::Conditional { .. } => "conditional",
            Self::Aggregation => "aggregation",
        }
    }
}

impl std::fmt::Display for PhaseKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.tag())
    }
}

// ── Phase spec ───────────────────────────────────────────────────────

/// One phase of a workflow definition.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseSpec {
    /// Human-readable name
    pub name: String,
    /// Execution discipline and its configuration
    pub kind: PhaseKind,
    /// Seconds from dispatch to deadline
    pub timeout_secs: u64,
    /// Indices of phases that must complete first; each strictly less
    /// than this phase's own index
    pub dependencies: Vec<usize>,
    /// The operator pool responsible for this phase
    pub operator_set: OperatorSetId,
    /// Opaque shaping hints folded into dispatched payloads
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub metadata: Vec<u8>,
    /// Minimum operator stake (informational)
    pub required_stake: u64,
}

impl PhaseSpec {
    const DEFAULT_TIMEOUT_SECS: u64 = 3_600;

    pub fn new(name: impl Into<String>, kind: PhaseKind, operator_set: OperatorSetId) -> Self {
        Self {
            name: name.into(),
            kind,
            timeout_secs: Self::DEFAULT_TIMEOUT_SECS,
            dependencies: Vec::new(),
            operator_set,
            metadata: Vec::new(),
            required_stake: 0,
        }
    }

    /// An immediate-dispatch phase.
    pub fn immediate(name: impl Into<String>, operator_set: OperatorSetId) -> Self {
        Self::new(name, PhaseKind::Immediate, operator_set)
    }

    /// A coordination phase with a consensus threshold in basis points.
    pub fn coordination(
        name: impl Into<String>,
        operator_set: OperatorSetId,
        consensus_threshold_bp: u32,
    ) -> Self {
        Self::new(
            name,
            PhaseKind::Coordination {
                consensus_threshold_bp,
            },
            operator_set,
        )
    }

    /// A continuous-monitoring phase.
    pub fn continuous(
        name: impl Into<String>,
        operator_set: OperatorSetId,
        update_interval_secs: u64,
        required_updates: u32,
    ) -> Self {
        Self::new(
            name,
            PhaseKind::Continuous {
                update_interval_secs,
                required_updates,
            },
            operator_set,
        )
    }

    /// A conditional phase armed with a trigger condition.
    pub fn conditional(
        name: impl Into<String>,
        operator_set: OperatorSetId,
        condition: TriggerCondition,
    ) -> Self {
        Self::new(name, PhaseKind::Conditional { condition }, operator_set)
    }

    /// An aggregation phase folding its dependencies' results.
    pub fn aggregation(name: impl Into<String>, operator_set: OperatorSetId) -> Self {
        Self::new(name, PhaseKind::Aggregation, operator_set)
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn with_dependencies(mut self, deps: impl Into<Vec<usize>>) -> Self {
        self.dependencies = deps.into();
        self
    }

    pub fn with_metadata(mut self, metadata: impl Into<Vec<u8>>) -> Self {
        self.metadata = metadata.into();
        self
    }

    pub fn with_required_stake(mut self, stake: u64) -> Self {
        self.required_stake = stake;
        self
    }

    /// Validate this spec in the context of its position in the phase list.
    fn validate(&self, index: usize) -> WorkflowResult<()> {
        if self.timeout_secs == 0 {
            return Err(WorkflowError::InvalidTimeout { phase: index });
        }
        if self.dependencies.len() > MAX_DEPENDENCIES {
            return Err(WorkflowError::TooManyDependencies { phase: index });
        }
        for &dep in &self.dependencies {
            if dep >= index {
                return Err(WorkflowError::InvalidDependency {
                    phase: index,
                    dependency: dep,
                });
            }
        }
        match &self.kind {
            PhaseKind::Coordination {
                consensus_threshold_bp,
            } => {
                if *consensus_threshold_bp == 0 || *consensus_threshold_bp > BASIS_POINTS {
                    return Err(WorkflowError::InvalidConsensusThreshold {
                        phase: index,
                        threshold: *consensus_threshold_bp,
                    });
                }
            }
            PhaseKind::Continuous {
                update_interval_secs,
                required_updates,
            } => {
                if *update_interval_secs == 0 || *required_updates == 0 {
                    return Err(WorkflowError::InvalidMonitoringConfig { phase: index });
                }
            }
            PhaseKind::Immediate | PhaseKind::Conditional { .. } | PhaseKind::Aggregation => {}
        }
        Ok(())
    }
}

// ── Workflow definition ──────────────────────────────────────────────

/// A registered workflow — immutable apart from the active flag,
/// which the engine's admin may clear.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    /// Content-addressed identifier
    pub id: WorkflowId,
    /// Human-readable name
    pub name: String,
    /// Who registered this workflow
    pub creator: Principal,
    /// The ordered phase list
    pub phases: Vec<PhaseSpec>,
    /// Principals permitted to fire this workflow's conditional phases
    pub authorized_triggers: BTreeSet<Principal>,
    /// Sum of per-phase required stakes (informational)
    pub total_stake: u64,
    /// Inactive workflows reject new executions
    pub is_active: bool,
    /// When the definition was registered
    pub created_at: DateTime<Utc>,
}

impl WorkflowDefinition {
    /// Validate and assemble a definition. The id is derived by the
    /// engine from the registration inputs and a monotonic nonce.
    pub fn new(
        id: WorkflowId,
        name: impl Into<String>,
        creator: Principal,
        phases: Vec<PhaseSpec>,
        authorized_triggers: BTreeSet<Principal>,
        created_at: DateTime<Utc>,
    ) -> WorkflowResult<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(WorkflowError::EmptyName);
        }
        if phases.is_empty() || phases.len() > MAX_PHASES {
            return Err(WorkflowError::PhaseCountOutOfRange(phases.len()));
        }
        for (index, phase) in phases.iter().enumerate() {
            phase.validate(index)?;
        }

        let total_stake = phases.iter().map(|p| p.required_stake).sum();
        Ok(Self {
            id,
            name,
            creator,
            phases,
            authorized_triggers,
            total_stake,
            is_active: true,
            created_at,
        })
    }

    pub fn phase(&self, index: usize) -> Option<&PhaseSpec> {
        self.phases.get(index)
    }

    pub fn phase_count(&self) -> usize {
        self.phases.len()
    }

    /// Whether `caller` may fire this workflow's conditional phases,
    /// before consulting the engine's global trigger sources.
    pub fn may_trigger(&self, caller: &Principal) -> bool {
        *caller == self.creator || self.authorized_triggers.contains(caller)
    }
}
