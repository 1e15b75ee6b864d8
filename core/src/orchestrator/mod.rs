//! Trajectory orchestrator: the observe→decide→act loop.
//!
//! One orchestrator instance drives one run at a time and exclusively owns
//! its trajectory. Every suspension point (capture, model decision, action)
//! is bounded by its own timeout; the step budget guarantees termination
//! despite the open-ended reasoning process. The cancellation flag is
//! checked at the start of every phase transition, so at most one in-flight
//! action completes before teardown.

mod phase;

pub use phase::{Phase, PhaseError, PhaseTransition};

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::timeout;
use uuid::Uuid;

use crate::aggregate::{aggregate, Termination};
use crate::backend::{Backend, Session};
use crate::config::OrchestratorConfig;
use crate::encoder::Encoder;
use crate::error::VerifyError;
use crate::model::{Action, ActionResult, Decision, Observation, Run, RunStatus, Usage};
use crate::reasoner::{DecisionRequest, Reasoner};

/// Cooperative cancellation signal; the scheduler owns the sender.
pub type CancelSignal = watch::Receiver<bool>;

/// Coarse live progress published after every completed step and on every
/// status change; backs the non-blocking status query.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct RunProgress {
    pub status: RunStatus,
    pub steps: usize,
}

pub struct Orchestrator {
    backend: Arc<dyn Backend>,
    reasoner: Arc<dyn Reasoner>,
    encoder: Encoder,
    cfg: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(
        backend: Arc<dyn Backend>,
        reasoner: Arc<dyn Reasoner>,
        cfg: OrchestratorConfig,
    ) -> Self {
        Self {
            backend,
            reasoner,
            encoder: Encoder::new(&cfg),
            cfg,
        }
    }

    /// Drive a run from `Running` to a terminal state. Always returns the
    /// run itself; failures are recorded on it, never thrown past this
    /// boundary.
    #[tracing::instrument(name = "run.execute", skip_all, fields(run_id = %run.id))]
    pub async fn execute(
        &self,
        run: Run,
        cancel: CancelSignal,
        progress: watch::Sender<RunProgress>,
    ) -> Run {
        let run = self.drive(run, cancel, &progress).await;
        let _ = progress.send(RunProgress {
            status: run.status,
            steps: run.trajectory.len(),
        });
        run
    }

    async fn drive(
        &self,
        mut run: Run,
        cancel: CancelSignal,
        progress: &watch::Sender<RunProgress>,
    ) -> Run {
        let mut phase = Phase::Initializing;
        tracing::info!(
            run_id = %run.id,
            requirement = %run.requirement.title,
            url = %run.target.start_url,
            "starting verification run"
        );

        if cancelled(&cancel) {
            return self.finalize(run, None, Termination::Cancelled, phase).await;
        }

        let mut session = match self.backend.open(&run.target).await {
            Ok(session) => session,
            Err(e) => return self.fail(run, None, e).await,
        };
        if let Err(e) = session.prepare(&run.target.start_url).await {
            return self.fail(run, Some(session), e).await;
        }

        let opening =
            self.encoder
                .opening_prompt(&run.requirement, &run.target.start_url, &run.input);

        let termination = loop {
            if cancelled(&cancel) {
                break Termination::Cancelled;
            }
            if run.trajectory.len() >= self.cfg.step_budget {
                tracing::info!(
                    run_id = %run.id,
                    steps = run.trajectory.len(),
                    "step budget exhausted; forcing finalization"
                );
                break Termination::BudgetExhausted;
            }

            // Perceiving
            if let Err(e) = advance(&run.id, &mut phase, Phase::Perceiving) {
                return self.fail(run, Some(session), e).await;
            }
            let observation = match self.capture_with_retry(session.as_mut()).await {
                Ok(observation) => observation,
                Err(e) => return self.fail(run, Some(session), e).await,
            };

            // Deciding
            if cancelled(&cancel) {
                break Termination::Cancelled;
            }
            if let Err(e) = advance(&run.id, &mut phase, Phase::Deciding) {
                return self.fail(run, Some(session), e).await;
            }
            let prompt = format!(
                "{opening}\n{}",
                self.encoder.step_prompt(&run.requirement, &run.trajectory)
            );
            let decision = match self
                .decide_with_reprompt(&prompt, &observation, &mut run.usage)
                .await
            {
                Ok(decision) => decision,
                Err(e) => return self.fail(run, Some(session), e).await,
            };

            // Acting
            if cancelled(&cancel) {
                break Termination::Cancelled;
            }
            if let Err(e) = advance(&run.id, &mut phase, Phase::Acting) {
                return self.fail(run, Some(session), e).await;
            }
            let is_finish = matches!(decision.action, Action::Finish { .. });
            let mut perform_error = None;
            let result = match &decision.action {
                // Bookkeeping actions never touch the backend, so both
                // backend variants see identical trajectories.
                Action::AssertCriterion { index, status, .. } => {
                    tracing::info!(
                        run_id = %run.id,
                        criterion_index = index,
                        status = ?status,
                        "criterion asserted"
                    );
                    ActionResult::success()
                }
                Action::Finish { .. } => ActionResult::success(),
                action => match self.perform_with_retry(session.as_mut(), action).await {
                    Ok(result) => result,
                    Err(e) => {
                        let failure = ActionResult::failure(e.to_string());
                        perform_error = Some(e);
                        failure
                    }
                },
            };
            run.trajectory.push(observation, decision, result);
            let _ = progress.send(RunProgress {
                status: run.status,
                steps: run.trajectory.len(),
            });

            // A permanent action failure is recorded as the final step, then
            // fails the run.
            if let Some(e) = perform_error {
                return self.fail(run, Some(session), e).await;
            }

            if is_finish {
                break Termination::Finished;
            }
        };

        // Loop exits land in Finalizing from whatever phase the loop was in.
        self.finalize(run, Some(session), termination, phase).await
    }

    async fn capture_once(&self, session: &mut dyn Session) -> Result<Observation, VerifyError> {
        match timeout(
            Duration::from_millis(self.cfg.capture_timeout_ms),
            session.capture(),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(VerifyError::ObservationTimeout),
        }
    }

    /// One retry on observation timeout, then the run fails.
    async fn capture_with_retry(
        &self,
        session: &mut dyn Session,
    ) -> Result<Observation, VerifyError> {
        match self.capture_once(session).await {
            Err(VerifyError::ObservationTimeout) => {
                tracing::warn!("observation timed out; retrying once");
                self.capture_once(session).await
            }
            other => other,
        }
    }

    /// One decision round: model call, parse, and a single re-prompt citing
    /// the parse failure before escalating.
    async fn decide_with_reprompt(
        &self,
        prompt: &str,
        observation: &Observation,
        usage: &mut Usage,
    ) -> Result<Decision, VerifyError> {
        let reply = self
            .reasoner
            .decide(DecisionRequest {
                prompt: prompt.to_string(),
                screenshot_b64: observation.screenshot_b64.clone(),
            })
            .await?;
        usage.add(reply.usage);

        match self.encoder.parse_decision(&reply.text) {
            Ok(decision) => Ok(decision),
            Err(VerifyError::DecisionParse(reason)) => {
                tracing::warn!(
                    error.kind = "decision.parse_failed",
                    error.reason = %reason,
                    "malformed model reply; re-prompting once"
                );
                let reprompt = format!("{prompt}\n{}", self.encoder.reprompt(&reason));
                let reply = self
                    .reasoner
                    .decide(DecisionRequest {
                        prompt: reprompt,
                        screenshot_b64: observation.screenshot_b64.clone(),
                    })
                    .await?;
                usage.add(reply.usage);
                self.encoder.parse_decision(&reply.text)
            }
            Err(e) => Err(e),
        }
    }

    async fn perform_once(
        &self,
        session: &mut dyn Session,
        action: &Action,
    ) -> Result<ActionResult, VerifyError> {
        match timeout(
            Duration::from_millis(self.cfg.action_timeout_ms),
            session.perform(action),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(VerifyError::ActionFailure(format!(
                "{} timed out after {}ms",
                action.kind(),
                self.cfg.action_timeout_ms
            ))),
        }
    }

    /// Replay a transient failure once, and only for actions whose retry is
    /// side-effect free. Everything else fails permanently on first error.
    async fn perform_with_retry(
        &self,
        session: &mut dyn Session,
        action: &Action,
    ) -> Result<ActionResult, VerifyError> {
        match self.perform_once(session, action).await {
            Err(VerifyError::TransientAction(reason)) if action.retry_safe() => {
                tracing::warn!(
                    action = action.kind(),
                    error.reason = %reason,
                    "transient action failure; retrying once"
                );
                match self.perform_once(session, action).await {
                    Ok(mut result) => {
                        result.retried = true;
                        Ok(result)
                    }
                    // The retry budget is one; a second transient failure is
                    // permanent.
                    Err(VerifyError::TransientAction(reason)) => {
                        Err(VerifyError::ActionFailure(reason))
                    }
                    Err(e) => Err(e),
                }
            }
            Err(VerifyError::TransientAction(reason)) => Err(VerifyError::ActionFailure(reason)),
            other => other,
        }
    }

    async fn finalize(
        &self,
        mut run: Run,
        session: Option<Box<dyn Session>>,
        termination: Termination,
        mut phase: Phase,
    ) -> Run {
        if let Err(e) = advance(&run.id, &mut phase, Phase::Finalizing) {
            return self.fail(run, session, e).await;
        }

        run.trajectory.freeze();
        run.verdicts = aggregate(&run.trajectory, &run.requirement, &termination);
        close_session(session).await;

        let target = match termination {
            Termination::Cancelled => RunStatus::Cancelled,
            _ => RunStatus::Completed,
        };
        if let Err(e) = run.transition(target) {
            tracing::error!(run_id = %run.id, error.message = %e, "invalid terminal transition");
        }
        let _ = advance(&run.id, &mut phase, Phase::Completed);

        tracing::info!(
            run_id = %run.id,
            status = ?run.status,
            steps = run.trajectory.len(),
            overall = ?run.overall(),
            "run finalized"
        );
        run
    }

    /// Record the cause and last completed step, aggregate whatever verdicts
    /// were asserted, and return the failed run.
    async fn fail(
        &self,
        mut run: Run,
        session: Option<Box<dyn Session>>,
        error: VerifyError,
    ) -> Run {
        tracing::error!(
            run_id = %run.id,
            error.kind = error_kind(&error),
            error.message = %error,
            last_step = run.trajectory.last().map(|s| s.index),
            "run failed"
        );
        run.record_failure(error.to_string());
        run.trajectory.freeze();
        run.verdicts = aggregate(
            &run.trajectory,
            &run.requirement,
            &Termination::Failed(error.to_string()),
        );
        close_session(session).await;
        if let Err(e) = run.transition(RunStatus::Failed) {
            tracing::error!(run_id = %run.id, error.message = %e, "invalid failure transition");
        }
        run
    }
}

fn advance(run_id: &Uuid, phase: &mut Phase, to: Phase) -> Result<(), VerifyError> {
    PhaseTransition::validate(*phase, to)
        .map_err(|e| VerifyError::ActionFailure(format!("orchestrator phase error: {e}")))?;
    tracing::debug!(run_id = %run_id, from = ?*phase, to = ?to, "phase transition");
    *phase = to;
    Ok(())
}

fn cancelled(cancel: &CancelSignal) -> bool {
    *cancel.borrow()
}

async fn close_session(session: Option<Box<dyn Session>>) {
    if let Some(mut session) = session {
        if let Err(e) = session.cleanup().await {
            tracing::warn!(error.message = %e, "session cleanup failed");
        }
        session.close().await;
    }
}

fn error_kind(error: &VerifyError) -> &'static str {
    match error {
        VerifyError::ObservationTimeout => "observation.timeout",
        VerifyError::ActionFailure(_) => "action.failure",
        VerifyError::TransientAction(_) => "action.transient",
        VerifyError::DecisionParse(_) => "decision.parse_failed",
        VerifyError::DecisionTimeout => "decision.timeout",
        VerifyError::AdmissionTimeout => "scheduler.admission_timeout",
        VerifyError::BackendUnavailable(_) => "backend.unavailable",
        VerifyError::Backend(_) => "backend.error",
    }
}
