use serde::{Deserialize, Serialize};

/// Satisfaction level for a single acceptance criterion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CriterionStatus {
    NotMet,
    PartiallyMet,
    Met,
}

/// The final judgement for one acceptance criterion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Verdict {
    pub criterion_index: usize,
    pub criterion_name: String,
    pub status: CriterionStatus,
    pub feedback: String,
    /// Trajectory step the judgement is anchored to, when one exists.
    #[serde(default)]
    pub evidence_step: Option<usize>,
}

/// Requirement-level rollup derived from per-criterion verdicts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    Met,
    Unmet,
    PartiallyMet,
    Error,
}

impl VerificationStatus {
    /// Met when every criterion is met, Unmet when none is, PartiallyMet
    /// otherwise. An empty verdict set means the run never judged anything.
    pub fn rollup(verdicts: &[Verdict]) -> Self {
        if verdicts.is_empty() {
            return VerificationStatus::Error;
        }
        let met = verdicts
            .iter()
            .filter(|v| v.status == CriterionStatus::Met)
            .count();
        if met == verdicts.len() {
            VerificationStatus::Met
        } else if met == 0
            && verdicts
                .iter()
                .all(|v| v.status == CriterionStatus::NotMet)
        {
            VerificationStatus::Unmet
        } else {
            VerificationStatus::PartiallyMet
        }
    }
}
