//! Shared fixtures: a deterministic in-memory execution backend and a
//! scripted reasoner, so orchestration behavior can be pinned without a
//! display or a model endpoint.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use spector_core::api::{
    Action, ActionResult, Backend, DecisionRequest, ExecutionTarget, Input, ModelReply,
    Observation, Reasoner, Requirement, Session, Usage, VerifyError,
};

/// 1x1 transparent PNG.
pub const PIXEL_B64: &str =
    "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mNkYPhfDwAChwGA60e6kgAAAABJRU5ErkJggg==";

/// Tracks how many sessions are open at once, for slot-conservation checks.
#[derive(Default)]
pub struct OpenTracker {
    current: AtomicUsize,
    max: AtomicUsize,
}

impl OpenTracker {
    fn opened(&self) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.max.fetch_max(now, Ordering::SeqCst);
    }

    fn closed(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn max_concurrent(&self) -> usize {
        self.max.load(Ordering::SeqCst)
    }

    pub fn currently_open(&self) -> usize {
        self.current.load(Ordering::SeqCst)
    }
}

/// Per-call failure script, keyed by call index.
#[derive(Debug, Clone, Default)]
pub struct SessionScript {
    /// Capture calls that never return (the orchestrator's timeout fires).
    pub capture_hangs: Vec<usize>,
    /// Perform calls that fail with a transient error.
    pub transient_failures: Vec<usize>,
    /// Perform calls that fail permanently.
    pub permanent_failures: Vec<usize>,
}

pub struct MockBackend {
    name: &'static str,
    script: SessionScript,
    pub tracker: Arc<OpenTracker>,
    /// When set, `open` fails with BackendUnavailable.
    pub unavailable: bool,
}

impl MockBackend {
    pub fn new(name: &'static str, script: SessionScript) -> Self {
        Self {
            name,
            script,
            tracker: Arc::new(OpenTracker::default()),
            unavailable: false,
        }
    }

    pub fn healthy(name: &'static str) -> Self {
        Self::new(name, SessionScript::default())
    }
}

#[async_trait]
impl Backend for MockBackend {
    fn name(&self) -> &str {
        self.name
    }

    async fn open(&self, _target: &ExecutionTarget) -> Result<Box<dyn Session>, VerifyError> {
        if self.unavailable {
            return Err(VerifyError::BackendUnavailable(
                "mock backend is down".to_string(),
            ));
        }
        self.tracker.opened();
        Ok(Box::new(MockSession {
            captures: 0,
            performs: 0,
            script: self.script.clone(),
            tracker: self.tracker.clone(),
        }))
    }
}

pub struct MockSession {
    captures: usize,
    performs: usize,
    script: SessionScript,
    tracker: Arc<OpenTracker>,
}

#[async_trait]
impl Session for MockSession {
    async fn capture(&mut self) -> Result<Observation, VerifyError> {
        let index = self.captures;
        self.captures += 1;
        if self.script.capture_hangs.contains(&index) {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        Ok(Observation::new(PIXEL_B64).with_summary(format!("screen after {index} captures")))
    }

    async fn perform(&mut self, action: &Action) -> Result<ActionResult, VerifyError> {
        let index = self.performs;
        self.performs += 1;
        if self.script.permanent_failures.contains(&index) {
            return Err(VerifyError::ActionFailure(
                "target not actionable".to_string(),
            ));
        }
        if self.script.transient_failures.contains(&index) {
            return Err(VerifyError::TransientAction(
                "target not yet rendered".to_string(),
            ));
        }
        if let Action::Wait { ms } = action {
            tokio::time::sleep(Duration::from_millis(*ms)).await;
        }
        Ok(ActionResult::success())
    }

    async fn close(&mut self) {
        self.tracker.closed();
    }
}

/// Replays a fixed reply sequence, then repeats `fallback` forever.
pub struct ScriptedReasoner {
    replies: Mutex<VecDeque<String>>,
    fallback: String,
    delay: Duration,
}

impl ScriptedReasoner {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().map(Into::into).collect()),
            fallback: wait_reply(1),
            delay: Duration::ZERO,
        }
    }

    /// A reasoner that never finishes: every reply is a short wait.
    pub fn endless_waiter() -> Self {
        Self::new(Vec::<String>::new())
    }

    pub fn with_fallback(mut self, fallback: impl Into<String>) -> Self {
        self.fallback = fallback.into();
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait]
impl Reasoner for ScriptedReasoner {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn decide(&self, _request: DecisionRequest) -> Result<ModelReply, VerifyError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let text = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());
        Ok(ModelReply {
            text,
            usage: Usage {
                tokens_in: 100,
                tokens_out: 20,
                tokens_total: 120,
            },
        })
    }
}

pub fn wait_reply(ms: u64) -> String {
    json!({"action": {"type": "wait", "ms": ms}, "rationale": "let the page settle"}).to_string()
}

pub fn click_reply(x: i32, y: i32) -> String {
    json!({"action": {"type": "click", "x": x, "y": y}, "rationale": "open the control"}).to_string()
}

pub fn assert_reply(index: usize, status: &str, rationale: &str) -> String {
    json!({
        "action": {"type": "assert_criterion", "index": index, "status": status, "rationale": rationale},
        "rationale": "judging a criterion"
    })
    .to_string()
}

pub fn finish_reply(summary: &str) -> String {
    json!({"action": {"type": "finish", "summary": summary}, "rationale": "all criteria judged"})
        .to_string()
}

pub fn requirement(criteria: &[&str]) -> Requirement {
    Requirement::new("sample requirement", "the app behaves as described")
        .with_criteria(criteria.iter().copied())
}

pub fn empty_input() -> Input {
    Input::new()
}
