use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::backend::ExecutionTarget;

use super::requirement::{Input, Requirement};
use super::trajectory::Trajectory;
use super::verdict::{Verdict, VerificationStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

#[derive(Debug, Error)]
pub enum TransitionError {
    #[error("Invalid transition from {from:?} to {to:?}")]
    InvalidTransition { from: RunStatus, to: RunStatus },
    #[error("Cannot transition from terminal state {state:?}")]
    FromTerminalState { state: RunStatus },
}

/// Run status transitions. Status moves monotonically forward; terminal
/// states absorb.
pub struct StatusTransition;

impl StatusTransition {
    pub fn validate(from: RunStatus, to: RunStatus) -> Result<(), TransitionError> {
        if Self::is_terminal(from) {
            return Err(TransitionError::FromTerminalState { state: from });
        }

        let is_valid = match (from, to) {
            (RunStatus::Pending, RunStatus::Running) => true,
            // A queued run can fail (admission timeout) or be cancelled
            // before it ever holds a slot.
            (RunStatus::Pending, RunStatus::Failed) => true,
            (RunStatus::Pending, RunStatus::Cancelled) => true,
            (RunStatus::Running, RunStatus::Completed) => true,
            (RunStatus::Running, RunStatus::Failed) => true,
            (RunStatus::Running, RunStatus::Cancelled) => true,
            _ => false,
        };

        if is_valid {
            Ok(())
        } else {
            Err(TransitionError::InvalidTransition { from, to })
        }
    }

    pub fn is_terminal(status: RunStatus) -> bool {
        matches!(
            status,
            RunStatus::Completed | RunStatus::Failed | RunStatus::Cancelled
        )
    }
}

/// Token accounting summed over a run's model calls.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Usage {
    pub tokens_in: u64,
    pub tokens_out: u64,
    pub tokens_total: u64,
}

impl Usage {
    pub fn add(&mut self, other: Usage) {
        self.tokens_in += other.tokens_in;
        self.tokens_out += other.tokens_out;
        self.tokens_total += other.tokens_total;
    }
}

/// One verification attempt: requirement, trajectory, verdicts, outcome.
/// The trajectory is exclusively owned by the run's orchestrator instance
/// for its whole lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub id: Uuid,
    pub requirement: Requirement,
    pub input: Input,
    pub target: ExecutionTarget,
    pub status: RunStatus,
    pub trajectory: Trajectory,
    pub verdicts: Vec<Verdict>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Cause of the failure transition, when one happened.
    #[serde(default)]
    pub error: Option<String>,
    /// Last completed step index at the time of a failure transition.
    #[serde(default)]
    pub last_step: Option<usize>,
    #[serde(default)]
    pub usage: Usage,
}

impl Run {
    pub fn new(requirement: Requirement, input: Input, target: ExecutionTarget) -> Self {
        Self {
            id: Uuid::new_v4(),
            requirement,
            input,
            target,
            status: RunStatus::Pending,
            trajectory: Trajectory::new(),
            verdicts: Vec::new(),
            started_at: None,
            finished_at: None,
            error: None,
            last_step: None,
            usage: Usage::default(),
        }
    }

    pub fn transition(&mut self, to: RunStatus) -> Result<(), TransitionError> {
        StatusTransition::validate(self.status, to)?;
        match to {
            RunStatus::Running => self.started_at = Some(Utc::now()),
            s if StatusTransition::is_terminal(s) => self.finished_at = Some(Utc::now()),
            _ => {}
        }
        self.status = to;
        Ok(())
    }

    /// Record a failure cause together with the last completed step index.
    /// No failure is ever discarded without both.
    pub fn record_failure(&mut self, cause: impl Into<String>) {
        self.error = Some(cause.into());
        self.last_step = self.trajectory.last().map(|s| s.index);
    }

    /// Requirement-level rollup of the verdicts; Error for a run that never
    /// produced any.
    pub fn overall(&self) -> VerificationStatus {
        VerificationStatus::rollup(&self.verdicts)
    }

    pub fn elapsed_s(&self) -> Option<f64> {
        match (self.started_at, self.finished_at) {
            (Some(start), Some(end)) => Some((end - start).num_milliseconds() as f64 / 1000.0),
            _ => None,
        }
    }
}
