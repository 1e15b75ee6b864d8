//! Perception & action encoder.
//!
//! Turns a raw observation plus run context into a bounded-size prompt
//! fragment, and parses the reasoning model's reply into one of the closed
//! [`Action`] variants. Malformed replies are never dropped silently: they
//! become a `DecisionParse` error the orchestrator answers with exactly one
//! re-prompt before escalating.

use regex::Regex;

use crate::config::OrchestratorConfig;
use crate::error::VerifyError;
use crate::model::{CriterionStatus, Decision, Input, Requirement, Trajectory};

pub struct Encoder {
    summary_window: usize,
    max_fragment_chars: usize,
    fence_re: Regex,
}

impl Encoder {
    pub fn new(cfg: &OrchestratorConfig) -> Self {
        Self {
            summary_window: cfg.summary_window,
            max_fragment_chars: cfg.max_fragment_chars,
            fence_re: Regex::new(r"```(?:json)?\s*([\s\S]*?)\s*```").expect("static regex"),
        }
    }

    /// The opening prompt: requirement, criteria, inputs, and the action
    /// vocabulary contract. Optional sections are dropped when empty.
    pub fn opening_prompt(
        &self,
        requirement: &Requirement,
        start_url: &str,
        input: &Input,
    ) -> String {
        let mut out = String::new();
        out.push_str(
            "You are verifying whether a running GUI application satisfies a requirement.\n",
        );
        out.push_str(&format!("The application is reachable at {start_url}.\n\n"));
        if !requirement.title.is_empty() {
            out.push_str(&format!("Requirement: {}\n", requirement.title));
        }
        out.push_str(&format!("Description: {}\n", requirement.description));
        if let Some(source) = requirement.source.as_deref() {
            if !source.trim().is_empty() {
                out.push_str(&format!("Source: {source}\n"));
            }
        }
        if !requirement.tags.is_empty() {
            out.push_str(&format!("Tags: {}\n", requirement.tags.join(", ")));
        }
        out.push_str("\nAcceptance criteria:\n");
        for criterion in &requirement.criteria {
            out.push_str(&format!("- {}: {}\n", criterion.name, criterion.text));
        }
        if !input.is_empty() {
            out.push_str("\nUse these values where the application asks for them:\n");
            for (key, value) in &input.values {
                out.push_str(&format!("- {key}: {value}\n"));
            }
        }
        out.push('\n');
        out.push_str(ACTION_CONTRACT);
        collapse_blank_lines(&out)
    }

    /// The per-step prompt: criterion list, a bounded summary of the prior
    /// trajectory, and the instruction to answer with exactly one action.
    pub fn step_prompt(&self, requirement: &Requirement, trajectory: &Trajectory) -> String {
        let mut out = String::new();
        out.push_str("Criteria under verification:\n");
        for (i, criterion) in requirement.criteria.iter().enumerate() {
            out.push_str(&format!("- index {i} ({}): {}\n", criterion.name, criterion.text));
        }
        let summary = self.trajectory_summary(trajectory);
        if !summary.is_empty() {
            out.push_str("\nSteps taken so far:\n");
            out.push_str(&summary);
        }
        out.push_str(
            "\nThe attached screenshot is the current screen. Reply with exactly one JSON \
             object for your next action.\n",
        );
        out
    }

    /// Re-prompt after a malformed reply; cites the parse failure so the
    /// model can correct its format.
    pub fn reprompt(&self, reason: &str) -> String {
        format!(
            "Your previous reply could not be parsed as an action ({}). Reply again with \
             exactly one JSON object in the documented format and nothing else.\n",
            truncate_chars(reason, self.max_fragment_chars)
        )
    }

    /// Last `summary_window` steps, one clipped line each.
    fn trajectory_summary(&self, trajectory: &Trajectory) -> String {
        let steps = trajectory.steps();
        let skip = steps.len().saturating_sub(self.summary_window);
        let mut out = String::new();
        if skip > 0 {
            out.push_str(&format!("(… {skip} earlier steps elided)\n"));
        }
        for step in &steps[skip..] {
            let outcome = if step.result.ok {
                "ok".to_string()
            } else {
                format!(
                    "failed: {}",
                    step.result.error.as_deref().unwrap_or("unknown")
                )
            };
            let line = format!(
                "{}. {} -> {} ({})",
                step.index,
                describe_action(&step.decision),
                outcome,
                truncate_chars(&step.decision.rationale, self.max_fragment_chars),
            );
            out.push_str(&line);
            out.push('\n');
        }
        out
    }

    /// Parse model text into a [`Decision`]. Strips a code fence when
    /// present, then parses the last JSON object found in the reply.
    pub fn parse_decision(&self, text: &str) -> Result<Decision, VerifyError> {
        let candidate = match self.fence_re.captures(text) {
            Some(caps) => caps.get(1).map(|m| m.as_str()).unwrap_or(text),
            None => text,
        };

        let object = last_json_object(candidate)
            .ok_or_else(|| VerifyError::DecisionParse("no_json_object".to_string()))?;

        let decision: Decision = serde_json::from_str(object)
            .map_err(|e| VerifyError::DecisionParse(format!("bad_decision_json: {e}")))?;

        if let crate::model::Action::AssertCriterion { rationale, .. } = &decision.action {
            if rationale.trim().is_empty() {
                return Err(VerifyError::DecisionParse(
                    "assert_criterion requires a rationale".to_string(),
                ));
            }
        }
        Ok(decision)
    }
}

/// Locate the last balanced `{ ... }` span in `text`, ignoring braces inside
/// JSON string literals.
fn last_json_object(text: &str) -> Option<&str> {
    let mut last = None;
    let mut start = None;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, ch) in text.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' if depth > 0 => in_string = true,
            '{' => {
                if depth == 0 {
                    start = Some(i);
                }
                depth += 1;
            }
            '}' => {
                if depth > 0 {
                    depth -= 1;
                    if depth == 0 {
                        last = start.map(|s| &text[s..i + 1]);
                    }
                }
            }
            _ => {}
        }
    }
    last
}

fn describe_action(decision: &Decision) -> String {
    use crate::model::Action::*;
    match &decision.action {
        Click { x, y } => format!("click({x}, {y})"),
        Type { text } => format!("type({} chars)", text.chars().count()),
        Scroll { direction, amount } => format!("scroll({direction:?}, {amount})"),
        Wait { ms } => format!("wait({ms}ms)"),
        AssertCriterion { index, status, .. } => {
            format!("assert_criterion({index}, {})", status_str(*status))
        }
        Finish { summary } => format!("finish({})", truncate_chars(summary, 80)),
    }
}

fn status_str(status: CriterionStatus) -> &'static str {
    match status {
        CriterionStatus::NotMet => "not_met",
        CriterionStatus::PartiallyMet => "partially_met",
        CriterionStatus::Met => "met",
    }
}

/// Char-boundary-safe clip with an ellipsis marker.
pub fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max).collect();
    out.push('…');
    out
}

fn collapse_blank_lines(s: &str) -> String {
    let mut out = Vec::new();
    let mut previous_blank = false;
    for line in s.lines() {
        if line.trim().is_empty() {
            if !previous_blank {
                out.push("");
            }
            previous_blank = true;
        } else {
            out.push(line.trim_end());
            previous_blank = false;
        }
    }
    out.join("\n")
}

const ACTION_CONTRACT: &str = r#"On every step you will receive the current screenshot. Reply with exactly one JSON object:
{"action": {"type": "click", "x": <int>, "y": <int>}, "rationale": "<why>"}
{"action": {"type": "type", "text": "<text>"}, "rationale": "<why>"}
{"action": {"type": "scroll", "direction": "up|down|left|right", "amount": <int>}, "rationale": "<why>"}
{"action": {"type": "wait", "ms": <int>}, "rationale": "<why>"}
{"action": {"type": "assert_criterion", "index": <int>, "status": "not_met|partially_met|met", "rationale": "<evidence>"}, "rationale": "<why>"}
{"action": {"type": "finish", "summary": "<what you verified>"}, "rationale": "<why>"}
Assert each criterion as soon as you have evidence for it; assert again if later evidence changes your judgement. Finish once every criterion has been asserted.
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Action;
    use pretty_assertions::assert_eq;

    fn encoder() -> Encoder {
        Encoder::new(&OrchestratorConfig::default())
    }

    #[test]
    fn parses_bare_json_decision() {
        let decision = encoder()
            .parse_decision(r#"{"action": {"type": "click", "x": 10, "y": 20}, "rationale": "open menu"}"#)
            .unwrap();
        assert_eq!(
            decision.action,
            Action::Click { x: 10, y: 20 }
        );
        assert_eq!(decision.rationale, "open menu");
    }

    #[test]
    fn parses_fenced_decision_with_prose() {
        let text = "I will scroll down to see the results.\n```json\n{\"action\": {\"type\": \"scroll\", \"direction\": \"down\", \"amount\": 300}, \"rationale\": \"see results\"}\n```";
        let decision = encoder().parse_decision(text).unwrap();
        assert!(matches!(decision.action, Action::Scroll { amount: 300, .. }));
    }

    #[test]
    fn takes_last_json_object() {
        let text = r#"{"action": {"type": "wait", "ms": 100}, "rationale": "old"}
some prose
{"action": {"type": "finish", "summary": "done"}, "rationale": "new"}"#;
        let decision = encoder().parse_decision(text).unwrap();
        assert!(matches!(decision.action, Action::Finish { .. }));
    }

    #[test]
    fn unknown_action_type_is_a_parse_error() {
        let err = encoder()
            .parse_decision(r#"{"action": {"type": "teleport"}, "rationale": ""}"#)
            .unwrap_err();
        assert!(matches!(err, VerifyError::DecisionParse(_)));
    }

    #[test]
    fn no_json_is_a_parse_error() {
        let err = encoder().parse_decision("I clicked the button.").unwrap_err();
        assert!(matches!(err, VerifyError::DecisionParse(_)));
    }

    #[test]
    fn assert_without_rationale_is_rejected() {
        let err = encoder()
            .parse_decision(
                r#"{"action": {"type": "assert_criterion", "index": 0, "status": "met", "rationale": "  "}, "rationale": ""}"#,
            )
            .unwrap_err();
        assert!(matches!(err, VerifyError::DecisionParse(_)));
    }

    #[test]
    fn opening_prompt_renders_criteria_and_inputs() {
        let req = Requirement::new("Search staging", "Search only fires on submit")
            .with_criteria(["typing does not filter", "enter triggers search"]);
        let input = Input::new().with("email", "a@b.c");
        let prompt = encoder().opening_prompt(&req, "http://app:8000/", &input);
        assert!(prompt.contains("AC-1: typing does not filter"));
        assert!(prompt.contains("AC-2: enter triggers search"));
        assert!(prompt.contains("email: a@b.c"));
        assert!(prompt.contains("http://app:8000/"));
        assert!(!prompt.contains("Source:"));
    }

    #[test]
    fn step_prompt_elides_old_steps() {
        let req = Requirement::new("t", "d").with_criteria(["c"]);
        let mut trajectory = Trajectory::new();
        for i in 0..12 {
            trajectory.push(
                crate::model::Observation::new("aGk="),
                Decision {
                    action: Action::Wait { ms: i },
                    rationale: String::new(),
                },
                crate::model::ActionResult::success(),
            );
        }
        let prompt = encoder().step_prompt(&req, &trajectory);
        assert!(prompt.contains("4 earlier steps elided"));
        assert!(prompt.contains("11. wait(11ms)"));
        assert!(!prompt.contains("\n2. wait(2ms)"));
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo", 3), "hél…");
        assert_eq!(truncate_chars("hi", 10), "hi");
    }
}
