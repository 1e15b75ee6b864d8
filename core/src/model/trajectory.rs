use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::action::Decision;

/// A fresh capture of the application's screen state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Observation {
    /// Base64-encoded PNG of the display.
    pub screenshot_b64: String,
    /// Optional derived textual summary (accessibility tree, page title, ...).
    #[serde(default)]
    pub summary: Option<String>,
    pub captured_at: DateTime<Utc>,
}

impl Observation {
    pub fn new(screenshot_b64: impl Into<String>) -> Self {
        Self {
            screenshot_b64: screenshot_b64.into(),
            summary: None,
            captured_at: Utc::now(),
        }
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionResult {
    pub ok: bool,
    #[serde(default)]
    pub error: Option<String>,
    /// Set when a transient failure was replayed before succeeding.
    #[serde(default)]
    pub retried: bool,
}

impl ActionResult {
    pub fn success() -> Self {
        Self {
            ok: true,
            error: None,
            retried: false,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            error: Some(error.into()),
            retried: false,
        }
    }
}

/// One observe→decide→act round of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub index: usize,
    pub observation: Observation,
    pub decision: Decision,
    pub result: ActionResult,
    pub completed_at: DateTime<Utc>,
}

/// The full ordered record of one verification attempt. Append-only while the
/// run executes, frozen at completion; indices are dense from 0.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Trajectory {
    steps: Vec<Step>,
    #[serde(default)]
    frozen: bool,
}

impl Trajectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the next step, assigning its dense index. Panics if the
    /// trajectory was already frozen; the orchestrator exclusively owns the
    /// trajectory until then.
    pub fn push(&mut self, observation: Observation, decision: Decision, result: ActionResult) -> usize {
        assert!(!self.frozen, "trajectory is frozen");
        let index = self.steps.len();
        self.steps.push(Step {
            index,
            observation,
            decision,
            result,
            completed_at: Utc::now(),
        });
        index
    }

    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn last(&self) -> Option<&Step> {
        self.steps.last()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Action, Decision};

    fn step_parts() -> (Observation, Decision, ActionResult) {
        (
            Observation::new("aGk="),
            Decision {
                action: Action::Wait { ms: 50 },
                rationale: String::new(),
            },
            ActionResult::success(),
        )
    }

    #[test]
    fn indices_are_dense_and_ordered() {
        let mut t = Trajectory::new();
        for expected in 0..4 {
            let (o, d, r) = step_parts();
            assert_eq!(t.push(o, d, r), expected);
        }
        let indices: Vec<usize> = t.steps().iter().map(|s| s.index).collect();
        assert_eq!(indices, [0, 1, 2, 3]);
    }

    #[test]
    #[should_panic(expected = "frozen")]
    fn push_after_freeze_panics() {
        let mut t = Trajectory::new();
        t.freeze();
        let (o, d, r) = step_parts();
        t.push(o, d, r);
    }
}
