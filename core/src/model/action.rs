use serde::{Deserialize, Serialize};

use super::verdict::CriterionStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScrollDirection {
    Up,
    Down,
    Left,
    Right,
}

/// The closed set of actions the agent may take. The orchestrator matches
/// exhaustively so no decision is ever silently ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    Click {
        x: i32,
        y: i32,
    },
    Type {
        text: String,
    },
    Scroll {
        direction: ScrollDirection,
        amount: u32,
    },
    Wait {
        ms: u64,
    },
    AssertCriterion {
        index: usize,
        status: CriterionStatus,
        rationale: String,
    },
    Finish {
        summary: String,
    },
}

impl Action {
    pub fn kind(&self) -> &'static str {
        match self {
            Action::Click { .. } => "click",
            Action::Type { .. } => "type",
            Action::Scroll { .. } => "scroll",
            Action::Wait { .. } => "wait",
            Action::AssertCriterion { .. } => "assert_criterion",
            Action::Finish { .. } => "finish",
        }
    }

    /// Whether a transient failure of this action may be replayed once.
    /// Text entry and the bookkeeping actions are never replayed; a click or
    /// scroll that the backend reports as not-applied carries no side effect.
    pub fn retry_safe(&self) -> bool {
        matches!(
            self,
            Action::Click { .. } | Action::Scroll { .. } | Action::Wait { .. }
        )
    }
}

/// A parsed model decision: the chosen action plus its stated reasoning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub action: Action,
    #[serde(default)]
    pub rationale: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_round_trips_through_tagged_json() {
        let action = Action::AssertCriterion {
            index: 2,
            status: CriterionStatus::Met,
            rationale: "the filter applied".into(),
        };
        let json = serde_json::to_string(&action).unwrap();
        assert!(json.contains("\"type\":\"assert_criterion\""));
        let back: Action = serde_json::from_str(&json).unwrap();
        assert_eq!(back, action);
    }

    #[test]
    fn retry_whitelist_excludes_side_effects() {
        assert!(Action::Click { x: 1, y: 2 }.retry_safe());
        assert!(Action::Wait { ms: 100 }.retry_safe());
        assert!(!Action::Type { text: "hi".into() }.retry_safe());
        assert!(!Action::Finish { summary: String::new() }.retry_safe());
    }
}
