//! Verdict aggregation.
//!
//! A pure function of the frozen trajectory and the requirement's criterion
//! list: re-running it over the same inputs yields identical verdicts.

use crate::model::{Action, CriterionStatus, Requirement, Trajectory, Verdict};

/// Why the trajectory stopped; drives the synthesized feedback for criteria
/// the agent never asserted.
#[derive(Debug, Clone, PartialEq)]
pub enum Termination {
    /// The agent chose `finish`.
    Finished,
    /// The step budget ran out before `finish`.
    BudgetExhausted,
    /// A fatal error ended the run.
    Failed(String),
    /// Cancellation ended the run.
    Cancelled,
}

/// Produce exactly one verdict per acceptance criterion, in criterion order.
///
/// All `assert_criterion` actions are collected in trajectory order and the
/// last assertion per criterion wins (later evidence supersedes earlier,
/// including a downgrade of an earlier `met`). Criteria never asserted get a
/// synthesized `not_met` verdict citing the termination reason.
pub fn aggregate(
    trajectory: &Trajectory,
    requirement: &Requirement,
    termination: &Termination,
) -> Vec<Verdict> {
    let criteria = &requirement.criteria;
    let mut asserted: Vec<Option<(CriterionStatus, String, usize)>> = vec![None; criteria.len()];

    for step in trajectory.steps() {
        if !step.result.ok {
            continue;
        }
        if let Action::AssertCriterion {
            index,
            status,
            rationale,
        } = &step.decision.action
        {
            if *index >= criteria.len() {
                tracing::warn!(
                    criterion_index = index,
                    step = step.index,
                    "assertion references a criterion outside the requirement; ignored"
                );
                continue;
            }
            asserted[*index] = Some((*status, rationale.clone(), step.index));
        }
    }

    criteria
        .iter()
        .enumerate()
        .map(|(i, criterion)| match &asserted[i] {
            Some((status, rationale, step_index)) => Verdict {
                criterion_index: i,
                criterion_name: criterion.name.clone(),
                status: *status,
                feedback: format!("{rationale} (evidence: step {step_index})"),
                evidence_step: Some(*step_index),
            },
            None => Verdict {
                criterion_index: i,
                criterion_name: criterion.name.clone(),
                status: CriterionStatus::NotMet,
                feedback: synthesized_feedback(termination),
                evidence_step: None,
            },
        })
        .collect()
}

fn synthesized_feedback(termination: &Termination) -> String {
    match termination {
        Termination::Finished => {
            "The agent reported completion without asserting this criterion.".to_string()
        }
        Termination::BudgetExhausted => {
            "The step budget was exhausted before this criterion was checked.".to_string()
        }
        Termination::Failed(cause) => {
            format!("The run failed before this criterion was checked: {cause}")
        }
        Termination::Cancelled => {
            "The run was cancelled before this criterion was checked.".to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ActionResult, Decision, Observation, Requirement};
    use pretty_assertions::assert_eq;

    fn requirement(n: usize) -> Requirement {
        Requirement::new("req", "desc")
            .with_criteria((0..n).map(|i| format!("criterion {i}")))
    }

    fn push_assert(
        trajectory: &mut Trajectory,
        index: usize,
        status: CriterionStatus,
        rationale: &str,
    ) {
        trajectory.push(
            Observation::new("aGk="),
            Decision {
                action: Action::AssertCriterion {
                    index,
                    status,
                    rationale: rationale.to_string(),
                },
                rationale: String::new(),
            },
            ActionResult::success(),
        );
    }

    #[test]
    fn one_verdict_per_criterion_no_duplicates() {
        let req = requirement(3);
        let mut t = Trajectory::new();
        push_assert(&mut t, 1, CriterionStatus::Met, "works");
        t.freeze();

        let verdicts = aggregate(&t, &req, &Termination::Finished);
        assert_eq!(verdicts.len(), 3);
        let indices: Vec<usize> = verdicts.iter().map(|v| v.criterion_index).collect();
        assert_eq!(indices, [0, 1, 2]);
    }

    #[test]
    fn last_assertion_wins() {
        let req = requirement(1);
        let mut t = Trajectory::new();
        push_assert(&mut t, 0, CriterionStatus::PartiallyMet, "half there");
        push_assert(&mut t, 0, CriterionStatus::Met, "now complete");
        t.freeze();

        let verdicts = aggregate(&t, &req, &Termination::Finished);
        assert_eq!(verdicts[0].status, CriterionStatus::Met);
        assert_eq!(verdicts[0].evidence_step, Some(1));
        assert!(verdicts[0].feedback.contains("now complete"));
    }

    #[test]
    fn later_assertion_can_downgrade_met() {
        let req = requirement(1);
        let mut t = Trajectory::new();
        push_assert(&mut t, 0, CriterionStatus::Met, "looked fine");
        push_assert(&mut t, 0, CriterionStatus::NotMet, "regression on reload");
        t.freeze();

        let verdicts = aggregate(&t, &req, &Termination::Finished);
        assert_eq!(verdicts[0].status, CriterionStatus::NotMet);
    }

    #[test]
    fn budget_exhaustion_defaults_to_not_met_with_reason() {
        let req = requirement(3);
        let mut t = Trajectory::new();
        push_assert(&mut t, 0, CriterionStatus::Met, "ok");
        t.freeze();

        let verdicts = aggregate(&t, &req, &Termination::BudgetExhausted);
        assert_eq!(verdicts[2].status, CriterionStatus::NotMet);
        assert!(verdicts[2].feedback.contains("budget was exhausted"));
        assert_eq!(verdicts[2].evidence_step, None);
    }

    #[test]
    fn finish_without_asserting_defaults_to_not_met() {
        let req = requirement(2);
        let mut t = Trajectory::new();
        push_assert(&mut t, 0, CriterionStatus::Met, "ok");
        t.freeze();

        let verdicts = aggregate(&t, &req, &Termination::Finished);
        assert_eq!(verdicts[1].status, CriterionStatus::NotMet);
        assert!(verdicts[1].feedback.contains("without asserting"));
    }

    #[test]
    fn out_of_range_assertions_are_ignored() {
        let req = requirement(1);
        let mut t = Trajectory::new();
        push_assert(&mut t, 5, CriterionStatus::Met, "phantom");
        t.freeze();

        let verdicts = aggregate(&t, &req, &Termination::Finished);
        assert_eq!(verdicts.len(), 1);
        assert_eq!(verdicts[0].status, CriterionStatus::NotMet);
    }

    #[test]
    fn aggregation_is_idempotent() {
        let req = requirement(2);
        let mut t = Trajectory::new();
        push_assert(&mut t, 0, CriterionStatus::PartiallyMet, "partial");
        push_assert(&mut t, 1, CriterionStatus::Met, "full");
        t.freeze();

        let first = aggregate(&t, &req, &Termination::BudgetExhausted);
        let second = aggregate(&t, &req, &Termination::BudgetExhausted);
        assert_eq!(
            serde_json::to_value(&first).unwrap(),
            serde_json::to_value(&second).unwrap()
        );
    }
}
