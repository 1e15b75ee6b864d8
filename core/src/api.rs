//! Stable re-exports for consumers (`cli`, `backends`, and external crates).
//!
//! Prefer importing from `spector_core::api` instead of reaching into
//! internal modules.

pub use crate::aggregate::{aggregate, Termination};
pub use crate::backend::{Backend, DisplaySlot, ExecutionTarget, Session};
pub use crate::config::{
    load_default, AppConfig, BackendConfig, BackendKind, HttpServerConfig, LoggingConfig,
    ModelConfig, OrchestratorConfig, SchedulerConfig,
};
pub use crate::encoder::Encoder;
pub use crate::error::{CliError, VerifyError};
pub use crate::model::{
    AcceptanceCriterion, Action, ActionResult, CriterionStatus, Decision, Input, Observation,
    Priority, Requirement, Run, RunStatus, ScrollDirection, Step, Trajectory, Usage, Verdict,
    VerificationStatus,
};
pub use crate::orchestrator::{CancelSignal, Orchestrator, Phase, PhaseTransition, RunProgress};
pub use crate::reasoner::{DecisionRequest, ModelReply, Reasoner};
pub use crate::scheduler::{DisplayPool, RunHandle, Scheduler, SlotLease, VerificationRequest};
