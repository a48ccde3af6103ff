//! External collaborators consumed by the engine
//!
//! The engine defers three concerns to its embedder: task dispatch
//! (immediate phases), operator-set sizing (coordination quorums), and
//! fee custody. Each is a trait seam with a bundled in-memory
//! implementation used by default and in tests.

use conductor_types::{OperatorSetId, Principal};
use std::collections::BTreeMap;

// ── Task mailbox ─────────────────────────────────────────────────────

/// A task submitted to the external mailbox by an immediate phase.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TaskRequest {
    /// Where unused fees return (the execution's initiator)
    pub refund_collector: Principal,
    /// Fee attached to the task; immediate phases attach none
    pub avs_fee: u64,
    /// The engine's own identity, paired with the operator set
    pub executor_identity: Principal,
    /// The operator pool asked to perform the task
    pub operator_set: OperatorSetId,
    /// Context-enriched payload
    pub payload: Vec<u8>,
}

/// Opaque handle returned by the mailbox for a submitted task.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TaskHandle(pub Vec<u8>);

impl TaskHandle {
    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }
}

/// The mailbox rejected a task submission.
#[derive(Debug, thiserror::Error)]
#[error("task mailbox rejected the submission: {0}")]
pub struct MailboxError(pub String);

/// Downstream task dispatcher used by immediate phases.
pub trait TaskMailbox {
    fn create_task(&mut self, request: TaskRequest) -> Result<TaskHandle, MailboxError>;
}

/// In-memory mailbox: accepts every task, hands out sequential
/// handles, and keeps the requests for inspection.
#[derive(Debug, Default)]
pub struct QueueMailbox {
    submitted: Vec<TaskRequest>,
}

impl QueueMailbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn submitted(&self) -> &[TaskRequest] {
        &self.submitted
    }
}

impl TaskMailbox for QueueMailbox {
    fn create_task(&mut self, request: TaskRequest) -> Result<TaskHandle, MailboxError> {
        let handle = TaskHandle(format!("task-{}", self.submitted.len()).into_bytes());
        self.submitted.push(request);
        Ok(handle)
    }
}

// ── Operator registry ────────────────────────────────────────────────

/// External lookup from operator set to roster size.
pub trait OperatorRegistry {
    /// Number of operators in the set, or `None` if the set is unknown.
    fn operator_count(&self, operator_set: OperatorSetId) -> Option<u32>;
}

/// Registry answering from a fixed table.
#[derive(Debug, Default)]
pub struct StaticOperatorRegistry {
    counts: BTreeMap<OperatorSetId, u32>,
}

impl StaticOperatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_count(mut self, operator_set: OperatorSetId, count: u32) -> Self {
        self.counts.insert(operator_set, count);
        self
    }
}

impl OperatorRegistry for StaticOperatorRegistry {
    fn operator_count(&self, operator_set: OperatorSetId) -> Option<u32> {
        self.counts.get(&operator_set).copied()
    }
}

// ── Fee sink ─────────────────────────────────────────────────────────

/// Receives creation and execution fees. Write-only from the engine's
/// perspective; custody is the embedder's concern.
pub trait FeeSink {
    fn collect(&mut self, amount: u64);
}

/// Fee sink that tallies what it received.
#[derive(Debug, Default)]
pub struct FeeLedger {
    total_collected: u64,
}

impl FeeLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn total_collected(&self) -> u64 {
        self.total_collected
    }
}

impl FeeSink for FeeLedger {
    fn collect(&mut self, amount: u64) {
        self.total_collected = self.total_collected.saturating_add(amount);
    }
}
