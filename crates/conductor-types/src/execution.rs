//! Workflow executions: live instances of workflow definitions
//!
//! An execution owns all of its per-phase state as one value record:
//! statuses, results, timing, coordination tallies, monitoring logs,
//! and armed conditional triggers, each indexed by phase. Once
//! `is_complete` is set the record is frozen; the engine rejects any
//! further mutation.

use crate::{ExecutionId, Principal, TriggerCondition, WorkflowId};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ── Phase status ─────────────────────────────────────────────────────

/// Status of one phase of an execution.
///
/// Ordinary phases move `Pending → Active → (Completed | Failed |
/// TimedOut)`. Conditional phases move `Pending → ConditionalWaiting →
/// (Completed | TimedOut | Failed)`. Terminal statuses never change.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseStatus {
    /// Not yet dispatched; waiting on dependencies
    #[default]
    Pending,
    /// Dispatched and accepting submissions
    Active,
    /// Armed and waiting for an authorized trigger
    ConditionalWaiting,
    /// Finished with a result
    Completed,
    /// Finished unsuccessfully
    Failed,
    /// Deadline passed before completion
    TimedOut,
}

impl PhaseStatus {
    /// Terminal statuses never transition again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::TimedOut)
    }

    /// Whether the deadline monitor may still time this phase out.
    pub fn is_awaiting(&self) -> bool {
        matches!(self, Self::Active | Self::ConditionalWaiting)
    }
}

impl std::fmt::Display for PhaseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tag = match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::ConditionalWaiting => "conditional_waiting",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::TimedOut => "timed_out",
        };
        write!(f, "{}", tag)
    }
}

// ── Coordination state ───────────────────────────────────────────────

/// Tally of a coordination phase: who has responded and with what.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordinationRound {
    /// Responses needed to meet the quorum
    pub required_responses: u32,
    /// Responses accepted so far
    pub received_responses: u32,
    /// One response per principal, ordered for deterministic folding
    pub responses: BTreeMap<Principal, Vec<u8>>,
}

impl CoordinationRound {
    pub fn new(required_responses: u32) -> Self {
        Self {
            required_responses,
            received_responses: 0,
            responses: BTreeMap::new(),
        }
    }

    pub fn has_responded(&self, responder: &Principal) -> bool {
        self.responses.contains_key(responder)
    }

    pub fn quorum_met(&self) -> bool {
        self.received_responses >= self.required_responses
    }

    /// Record a response. The caller must have checked `has_responded`
    /// and `quorum_met` first.
    pub fn record(&mut self, responder: Principal, response: Vec<u8>) {
        self.responses.insert(responder, response);
        self.received_responses += 1;
    }

    /// Fold the collected responses into the phase result: the
    /// plurality response, ties broken by the lexicographically
    /// smallest bytes. Independent of submission order.
    pub fn aggregate(&self) -> Vec<u8> {
        let mut counts: BTreeMap<&[u8], u32> = BTreeMap::new();
        for response in self.responses.values() {
            *counts.entry(response.as_slice()).or_default() += 1;
        }
        let mut winner: &[u8] = &[];
        let mut winner_count = 0;
        for (response, count) in counts {
            // strictly-greater keeps the smallest response on ties,
            // since iteration is ascending
            if count > winner_count {
                winner = response;
                winner_count = count;
            }
        }
        winner.to_vec()
    }
}

// ── Monitoring state ─────────────────────────────────────────────────

/// One accepted monitoring update.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitoringUpdate {
    /// The operator that submitted the update
    pub operator: Principal,
    /// When the update was accepted
    pub received_at: DateTime<Utc>,
    /// The update payload
    pub data: Vec<u8>,
}

/// State of a continuous-monitoring phase.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitoringState {
    /// Minimum seconds between accepted updates from one operator
    pub update_interval_secs: u64,
    /// Updates needed to complete the phase
    pub required_updates: u32,
    /// Updates accepted so far
    pub received_updates: u32,
    /// Per-operator time of last accepted update
    pub last_update_at: BTreeMap<Principal, DateTime<Utc>>,
    /// Ordered log of accepted updates
    pub log: Vec<MonitoringUpdate>,
}

impl MonitoringState {
    pub fn new(update_interval_secs: u64, required_updates: u32) -> Self {
        Self {
            update_interval_secs,
            required_updates,
            received_updates: 0,
            last_update_at: BTreeMap::new(),
            log: Vec::new(),
        }
    }

    /// Whether an update from `operator` at `now` respects the
    /// per-operator interval. The first update always does.
    pub fn accepts_from(&self, operator: &Principal, now: DateTime<Utc>) -> bool {
        match self.last_update_at.get(operator) {
            Some(last) => now >= *last + Duration::seconds(self.update_interval_secs as i64),
            None => true,
        }
    }

    pub fn target_met(&self) -> bool {
        self.received_updates >= self.required_updates
    }

    /// Record an accepted update.
    pub fn record(&mut self, operator: Principal, data: Vec<u8>, now: DateTime<Utc>) {
        self.last_update_at.insert(operator, now);
        self.received_updates += 1;
        self.log.push(MonitoringUpdate {
            operator,
            received_at: now,
            data,
        });
    }

    /// The phase result: the accepted update log, JSON-encoded.
    pub fn encoded_log(&self) -> Vec<u8> {
        serde_json::to_vec(&self.log).expect("update log serialization is infallible")
    }
}

// ── Conditional trigger state ────────────────────────────────────────

/// An armed conditional trigger and, once fired, its firing record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerRecord {
    /// The condition that must hold for the trigger to fire
    pub condition: TriggerCondition,
    /// Whether the trigger has fired
    pub triggered: bool,
    /// When it fired
    #[serde(skip_serializing_if = "Option::is_none")]
    pub triggered_at: Option<DateTime<Utc>>,
    /// Who fired it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub triggered_by: Option<Principal>,
    /// The data that satisfied the condition
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub trigger_data: Vec<u8>,
}

impl TriggerRecord {
    pub fn armed(condition: TriggerCondition) -> Self {
        Self {
            condition,
            triggered: false,
            triggered_at: None,
            triggered_by: None,
            trigger_data: Vec::new(),
        }
    }

    /// Mark the trigger as fired.
    pub fn fire(&mut self, source: Principal, data: Vec<u8>, at: DateTime<Utc>) {
        self.triggered = true;
        self.triggered_at = Some(at);
        self.triggered_by = Some(source);
        self.trigger_data = data;
    }
}

// ── Workflow execution ───────────────────────────────────────────────

/// A live instance of a workflow definition.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkflowExecution {
    /// Content-addressed identifier
    pub execution_id: ExecutionId,
    /// The definition this execution runs
    pub workflow_id: WorkflowId,
    /// Caller-supplied payload, folded into dispatched tasks
    pub initial_payload: Vec<u8>,
    /// Who started the execution
    pub initiator: Principal,
    /// One status per phase
    pub phase_statuses: Vec<PhaseStatus>,
    /// Results of completed phases
    pub phase_results: BTreeMap<usize, Vec<u8>>,
    /// When each phase was dispatched
    pub phase_started_at: Vec<Option<DateTime<Utc>>>,
    /// Deadline of each dispatched phase
    pub phase_deadlines: Vec<Option<DateTime<Utc>>>,
    /// Coordination tallies, by phase index
    pub coordination: BTreeMap<usize, CoordinationRound>,
    /// Monitoring state, by phase index
    pub monitoring: BTreeMap<usize, MonitoringState>,
    /// Armed conditional triggers, by phase index
    pub triggers: BTreeMap<usize, TriggerRecord>,
    /// Highest phase index dispatched so far
    pub current_phase: usize,
    /// Terminal flag; once set the record is frozen
    pub is_complete: bool,
    /// Set with `is_complete`: whether every phase completed
    pub successful: bool,
    /// When the execution was created
    pub started_at: DateTime<Utc>,
    /// When the execution reached its terminal state
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl WorkflowExecution {
    /// Create a fresh execution with every phase pending.
    pub fn new(
        execution_id: ExecutionId,
        workflow_id: WorkflowId,
        initial_payload: Vec<u8>,
        initiator: Principal,
        phase_count: usize,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            execution_id,
            workflow_id,
            initial_payload,
            initiator,
            phase_statuses: vec![PhaseStatus::Pending; phase_count],
            phase_results: BTreeMap::new(),
            phase_started_at: vec![None; phase_count],
            phase_deadlines: vec![None; phase_count],
            coordination: BTreeMap::new(),
            monitoring: BTreeMap::new(),
            triggers: BTreeMap::new(),
            current_phase: 0,
            is_complete: false,
            successful: false,
            started_at,
            completed_at: None,
        }
    }

    // ── Transitions ──────────────────────────────────────────────────

    /// Dispatch a phase: stamp its start and deadline and mark it active.
    pub fn begin_phase(&mut self, index: usize, now: DateTime<Utc>, timeout_secs: u64) {
        self.stamp(index, now, timeout_secs);
        self.phase_statuses[index] = PhaseStatus::Active;
    }

    /// Arm a conditional phase: stamp timing and mark it waiting.
    pub fn begin_conditional_wait(&mut self, index: usize, now: DateTime<Utc>, timeout_secs: u64) {
        self.stamp(index, now, timeout_secs);
        self.phase_statuses[index] = PhaseStatus::ConditionalWaiting;
    }

    /// Complete a phase with its result.
    pub fn complete_phase(&mut self, index: usize, result: Vec<u8>) {
        self.phase_statuses[index] = PhaseStatus::Completed;
        self.phase_results.insert(index, result);
    }

    /// Fail a phase.
    pub fn fail_phase(&mut self, index: usize) {
        self.phase_statuses[index] = PhaseStatus::Failed;
    }

    /// Time a phase out.
    pub fn time_out_phase(&mut self, index: usize) {
        self.phase_statuses[index] = PhaseStatus::TimedOut;
    }

    /// Freeze the execution in its terminal state.
    pub fn finish(&mut self, successful: bool, now: DateTime<Utc>) {
        self.is_complete = true;
        self.successful = successful;
        self.completed_at = Some(now);
    }

    fn stamp(&mut self, index: usize, now: DateTime<Utc>, timeout_secs: u64) {
        self.phase_started_at[index] = Some(now);
        self.phase_deadlines[index] = Some(now + Duration::seconds(timeout_secs as i64));
        self.current_phase = self.current_phase.max(index);
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn phase_count(&self) -> usize {
        self.phase_statuses.len()
    }

    pub fn phase_status(&self, index: usize) -> Option<PhaseStatus> {
        self.phase_statuses.get(index).copied()
    }

    pub fn phase_result(&self, index: usize) -> Option<&[u8]> {
        self.phase_results.get(&index).map(Vec::as_slice)
    }

    pub fn phase_deadline(&self, index: usize) -> Option<DateTime<Utc>> {
        self.phase_deadlines.get(index).copied().flatten()
    }

    /// Whether every listed dependency has completed.
    pub fn dependencies_met(&self, dependencies: &[usize]) -> bool {
        dependencies
            .iter()
            .all(|&d| self.phase_statuses.get(d) == Some(&PhaseStatus::Completed))
    }

    /// Whether any phase has failed or timed out.
    pub fn has_failed_phase(&self) -> bool {
        self.phase_statuses
            .iter()
            .any(|s| matches!(s, PhaseStatus::Failed | PhaseStatus::TimedOut))
    }

    /// Whether every phase has completed.
    pub fn all_phases_completed(&self) -> bool {
        self.phase_statuses
            .iter()
            .all(|s| *s == PhaseStatus::Completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn principal(n: u8) -> Principal {
        Principal::new([n; 20])
    }

    fn ts() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    fn make_execution(phase_count: usize) -> WorkflowExecution {
        let wf = WorkflowId::derive("wf", &principal(1), ts(), 0);
        let id = ExecutionId::derive(&wf, &principal(2), ts(), 0);
        WorkflowExecution::new(id, wf, vec![0xAA], principal(2), phase_count, ts())
    }

    #[test]
    fn fresh_execution_is_all_pending() {
        let exec = make_execution(3);
        assert!(exec
            .phase_statuses
            .iter()
            .all(|s| *s == PhaseStatus::Pending));
        assert!(!exec.is_complete);
        assert_eq!(exec.current_phase, 0);
        assert!(exec.phase_results.is_empty());
    }

    #[test]
    fn begin_phase_stamps_timing() {
        let mut exec = make_execution(2);
        exec.begin_phase(1, ts(), 60);

        assert_eq!(exec.phase_status(1), Some(PhaseStatus::Active));
        assert_eq!(exec.phase_started_at[1], Some(ts()));
        assert_eq!(
            exec.phase_deadline(1),
            Some(ts() + Duration::seconds(60))
        );
        assert_eq!(exec.current_phase, 1);
    }

    #[test]
    fn complete_phase_records_result() {
        let mut exec = make_execution(1);
        exec.begin_phase(0, ts(), 60);
        exec.complete_phase(0, vec![1, 2, 3]);

        assert_eq!(exec.phase_status(0), Some(PhaseStatus::Completed));
        assert_eq!(exec.phase_result(0), Some(&[1, 2, 3][..]));
        assert!(exec.all_phases_completed());
    }

    #[test]
    fn dependencies_met_requires_completed() {
        let mut exec = make_execution(3);
        assert!(exec.dependencies_met(&[]));
        assert!(!exec.dependencies_met(&[0]));

        exec.begin_phase(0, ts(), 60);
        assert!(!exec.dependencies_met(&[0]));

        exec.complete_phase(0, Vec::new());
        assert!(exec.dependencies_met(&[0]));
        assert!(!exec.dependencies_met(&[0, 1]));
    }

    #[test]
    fn failure_detection() {
        let mut exec = make_execution(2);
        exec.begin_phase(0, ts(), 60);
        exec.fail_phase(0);
        assert!(exec.has_failed_phase());

        let mut exec = make_execution(2);
        exec.begin_phase(0, ts(), 60);
        exec.time_out_phase(0);
        assert!(exec.has_failed_phase());
    }

    #[test]
    fn finish_freezes_outcome() {
        let mut exec = make_execution(1);
        exec.begin_phase(0, ts(), 60);
        exec.complete_phase(0, Vec::new());
        exec.finish(true, ts());

        assert!(exec.is_complete);
        assert!(exec.successful);
        assert_eq!(exec.completed_at, Some(ts()));
    }

    #[test]
    fn status_terminality() {
        assert!(!PhaseStatus::Pending.is_terminal());
        assert!(!PhaseStatus::Active.is_terminal());
        assert!(!PhaseStatus::ConditionalWaiting.is_terminal());
        assert!(PhaseStatus::Completed.is_terminal());
        assert!(PhaseStatus::Failed.is_terminal());
        assert!(PhaseStatus::TimedOut.is_terminal());

        assert!(PhaseStatus::Active.is_awaiting());
        assert!(PhaseStatus::ConditionalWaiting.is_awaiting());
        assert!(!PhaseStatus::Completed.is_awaiting());
    }

    // ── Coordination ─────────────────────────────────────────────────

    #[test]
    fn coordination_round_tally() {
        let mut round = CoordinationRound::new(2);
        assert!(!round.quorum_met());

        round.record(principal(1), vec![1]);
        assert!(round.has_responded(&principal(1)));
        assert!(!round.has_responded(&principal(2)));
        assert!(!round.quorum_met());

        round.record(principal(2), vec![1]);
        assert!(round.quorum_met());
    }

    #[test]
    fn aggregate_picks_plurality() {
        let mut round = CoordinationRound::new(3);
        round.record(principal(1), vec![7]);
        round.record(principal(2), vec![9]);
        round.record(principal(3), vec![9]);
        assert_eq!(round.aggregate(), vec![9]);
    }

    #[test]
    fn aggregate_breaks_ties_toward_smallest() {
        let mut round = CoordinationRound::new(2);
        round.record(principal(1), vec![9]);
        round.record(principal(2), vec![7]);
        assert_eq!(round.aggregate(), vec![7]);
    }

    #[test]
    fn aggregate_is_order_independent() {
        let mut a = CoordinationRound::new(3);
        a.record(principal(1), vec![5]);
        a.record(principal(2), vec![6]);
        a.record(principal(3), vec![5]);

        let mut b = CoordinationRound::new(3);
        b.record(principal(3), vec![5]);
        b.record(principal(1), vec![5]);
        b.record(principal(2), vec![6]);

        assert_eq!(a.aggregate(), b.aggregate());
    }

    // ── Monitoring ───────────────────────────────────────────────────

    #[test]
    fn monitoring_rate_limit_per_operator() {
        let mut state = MonitoringState::new(60, 3);
        let op = principal(1);

        assert!(state.accepts_from(&op, ts()));
        state.record(op, vec![1], ts());

        // 59 seconds later: too soon for the same operator
        assert!(!state.accepts_from(&op, ts() + Duration::seconds(59)));
        // a different operator is unconstrained
        assert!(state.accepts_from(&principal(2), ts() + Duration::seconds(59)));
        // exactly one interval later: accepted
        assert!(state.accepts_from(&op, ts() + Duration::seconds(60)));
    }

    #[test]
    fn monitoring_target_and_log() {
        let mut state = MonitoringState::new(10, 2);
        state.record(principal(1), vec![1], ts());
        assert!(!state.target_met());
        state.record(principal(2), vec![2], ts());
        assert!(state.target_met());

        assert_eq!(state.log.len(), 2);
        assert_eq!(state.log[0].data, vec![1]);

        let decoded: Vec<MonitoringUpdate> = serde_json::from_slice(&state.encoded_log()).unwrap();
        assert_eq!(decoded, state.log);
    }

    // ── Triggers ─────────────────────────────────────────────────────

    #[test]
    fn trigger_record_fire() {
        let mut record = TriggerRecord::armed(TriggerCondition::None);
        assert!(!record.triggered);

        record.fire(principal(4), vec![0xEE], ts());
        assert!(record.triggered);
        assert_eq!(record.triggered_by, Some(principal(4)));
        assert_eq!(record.triggered_at, Some(ts()));
        assert_eq!(record.trigger_data, vec![0xEE]);
    }
}
