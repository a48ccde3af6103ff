//! Deadline monitor: detects overdue phases
//!
//! The engine has no internal clock task. Callers (or a reaper
//! service) poke it with the current time; the monitor only decides
//! whether a phase is overdue. Applying the timeout — transitioning
//! the phase and failing the workflow — is the engine's job.

use conductor_types::{WorkflowError, WorkflowExecution, WorkflowResult};
use chrono::{DateTime, Utc};

/// Stateless overdue-phase detection.
#[derive(Clone, Debug, Default)]
pub struct DeadlineMonitor;

impl DeadlineMonitor {
    pub fn new() -> Self {
        Self
    }

    /// Verify that phase `index` may be timed out at `now`: it has a
    /// deadline, it is still awaiting (active or conditional-waiting),
    /// and the deadline has passed.
    pub fn check(
        &self,
        execution: &WorkflowExecution,
        index: usize,
        now: DateTime<Utc>,
    ) -> WorkflowResult<()> {
        let status = execution
            .phase_status(index)
            .ok_or(WorkflowError::PhaseNotFound {
                index,
                phase_count: execution.phase_count(),
            })?;
        let deadline = execution
            .phase_deadline(index)
            .ok_or(WorkflowError::NoTimeoutSet { phase: index })?;
        if !status.is_awaiting() {
            return Err(WorkflowError::PhaseNotActive { phase: index });
        }
        if now <= deadline {
            return Err(WorkflowError::NotYetTimedOut { phase: index });
        }
        Ok(())
    }

    /// All overdue phases of an execution, in index order.
    pub fn overdue(&self, execution: &WorkflowExecution, now: DateTime<Utc>) -> Vec<usize> {
        (0..execution.phase_count())
            .filter(|&index| self.check(execution, index, now).is_ok())
            .collect()
    }
}
