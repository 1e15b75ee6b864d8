//! Run scheduler.
//!
//! Bounds concurrent verification runs by the display pool's size: a hard
//! resource ceiling, not a soft limit. Each submission spawns a task that
//! waits for a slot (FIFO, bounded by the admission timeout), binds the run
//! to it for the run's whole lifetime, and releases it on every exit path.
//! The scheduler itself surfaces only admission timeouts and cancellation
//! acknowledgements; action-level detail lives on the returned `Run`.

mod pool;

pub use pool::{DisplayPool, SlotLease};

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::config::SchedulerConfig;
use crate::model::{Input, Requirement, Run, RunStatus};
use crate::backend::ExecutionTarget;
use crate::orchestrator::{Orchestrator, RunProgress};

/// One verification request: the requirement, its parameter values, and the
/// application reference to verify against.
#[derive(Debug, Clone)]
pub struct VerificationRequest {
    pub requirement: Requirement,
    pub input: Input,
    pub start_url: String,
}

pub struct Scheduler {
    pool: Arc<DisplayPool>,
    orchestrator: Arc<Orchestrator>,
    admission_timeout: Duration,
    progress: Arc<Mutex<HashMap<Uuid, watch::Receiver<RunProgress>>>>,
}

impl Scheduler {
    pub fn new(orchestrator: Arc<Orchestrator>, cfg: &SchedulerConfig) -> Self {
        Self {
            pool: Arc::new(DisplayPool::new(cfg.pool_size, cfg.display_base)),
            orchestrator,
            admission_timeout: Duration::from_millis(cfg.admission_timeout_ms),
            progress: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn pool(&self) -> &DisplayPool {
        &self.pool
    }

    /// Enqueue a run. Returns immediately with a handle; the run itself
    /// waits for a display slot in FIFO order.
    pub fn submit(&self, request: VerificationRequest) -> RunHandle {
        let run = Run::new(
            request.requirement.clone(),
            request.input.clone(),
            ExecutionTarget::new(request.start_url.clone()),
        );
        let run_id = run.id;

        let (cancel_tx, cancel_rx) = watch::channel(false);
        let (progress_tx, progress_rx) = watch::channel(RunProgress {
            status: RunStatus::Pending,
            steps: 0,
        });
        let (result_tx, result_rx) = oneshot::channel();

        self.progress
            .lock()
            .unwrap()
            .insert(run_id, progress_rx.clone());

        let pool = self.pool.clone();
        let orchestrator = self.orchestrator.clone();
        let admission_timeout = self.admission_timeout;
        let task: JoinHandle<()> = tokio::spawn(async move {
            let run = admit_and_execute(
                run,
                pool,
                orchestrator,
                admission_timeout,
                cancel_rx,
                progress_tx,
            )
            .await;
            let _ = result_tx.send(run);
        });

        RunHandle {
            run_id,
            request,
            cancel: cancel_tx,
            progress: progress_rx,
            result: result_rx,
            _task: task,
        }
    }

    /// Submit an ordered set of requests against the shared pool. Handles
    /// come back in submission order; awaiting them in order yields results
    /// in submission order once all complete.
    pub fn submit_batch(&self, requests: Vec<VerificationRequest>) -> Vec<RunHandle> {
        requests.into_iter().map(|r| self.submit(r)).collect()
    }

    /// Synchronous batch: blocks until every run is terminal, results in
    /// submission order.
    pub async fn run_batch(&self, requests: Vec<VerificationRequest>) -> Vec<Run> {
        let handles = self.submit_batch(requests);
        futures::future::join_all(handles.into_iter().map(RunHandle::await_result)).await
    }

    /// Non-blocking status query: current status plus trajectory length so
    /// far, if the run id is known to this scheduler.
    pub fn status(&self, run_id: &Uuid) -> Option<RunProgress> {
        self.progress
            .lock()
            .unwrap()
            .get(run_id)
            .map(|rx| *rx.borrow())
    }
}

async fn admit_and_execute(
    mut run: Run,
    pool: Arc<DisplayPool>,
    orchestrator: Arc<Orchestrator>,
    admission_timeout: Duration,
    mut cancel_rx: watch::Receiver<bool>,
    progress_tx: watch::Sender<RunProgress>,
) -> Run {
    // A queued run can be cancelled before it ever holds a slot. A dropped
    // handle (sender gone without cancelling) is not a cancellation.
    let lease = tokio::select! {
        biased;
        _ = async {
            if cancel_rx.wait_for(|cancelled| *cancelled).await.is_err() {
                std::future::pending::<()>().await
            }
        } => {
            tracing::info!(run_id = %run.id, "run cancelled while queued");
            let _ = run.transition(RunStatus::Cancelled);
            let _ = progress_tx.send(RunProgress { status: run.status, steps: 0 });
            return run;
        }
        lease = pool.acquire(admission_timeout) => match lease {
            Ok(lease) => lease,
            Err(e) => {
                tracing::error!(run_id = %run.id, error.message = %e, "admission failed");
                run.record_failure(e.to_string());
                let _ = run.transition(RunStatus::Failed);
                let _ = progress_tx.send(RunProgress { status: run.status, steps: 0 });
                return run;
            }
        },
    };

    run.target.slot = Some(lease.slot().clone());
    if let Err(e) = run.transition(RunStatus::Running) {
        tracing::error!(run_id = %run.id, error.message = %e, "invalid admission transition");
    }
    let _ = progress_tx.send(RunProgress {
        status: run.status,
        steps: 0,
    });

    let run = orchestrator.execute(run, cancel_rx, progress_tx).await;
    // Lease drops here: the slot is back in the pool the moment the run is
    // terminal, before the result is delivered.
    drop(lease);
    run
}

/// Handle to one submitted run.
pub struct RunHandle {
    run_id: Uuid,
    request: VerificationRequest,
    cancel: watch::Sender<bool>,
    progress: watch::Receiver<RunProgress>,
    result: oneshot::Receiver<Run>,
    _task: JoinHandle<()>,
}

impl RunHandle {
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Request cooperative cancellation. The orchestrator checks the flag at
    /// every phase transition, so at most one in-flight action completes
    /// before the run lands in `Cancelled` and its slot is released.
    pub fn cancel(&self) {
        let _ = self.cancel.send(true);
    }

    /// Current status and trajectory length, non-blocking.
    pub fn status(&self) -> RunProgress {
        *self.progress.borrow()
    }

    /// Block until the run is terminal and return it. Every outcome, Failed
    /// and Cancelled included, yields a well-formed run with its partial
    /// trajectory and verdicts.
    pub async fn await_result(self) -> Run {
        match self.result.await {
            Ok(run) => run,
            Err(_) => {
                // The executor task died without delivering; synthesize a
                // failed run so the caller contract still holds.
                tracing::error!(run_id = %self.run_id, "run task dropped its result");
                let mut run = Run::new(
                    self.request.requirement,
                    self.request.input,
                    ExecutionTarget::new(self.request.start_url),
                );
                run.id = self.run_id;
                run.record_failure("run task aborted before delivering a result");
                let _ = run.transition(RunStatus::Failed);
                run
            }
        }
    }
}
