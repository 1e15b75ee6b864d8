//! Execution backend contract.
//!
//! The orchestrator is transport-agnostic: it drives whatever implements
//! [`Session`], whether the automation happens in-process against the host
//! display or is proxied over a control channel into an isolated remote
//! display. Backend selection is configuration, never caller logic.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::VerifyError;
use crate::model::{Action, ActionResult, Observation};

/// One unit of isolated-display capacity. Slot `i` maps to display
/// `:(base + i)`; the scheduler is the only component that hands these out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplaySlot {
    pub index: usize,
    pub display: String,
}

impl DisplaySlot {
    pub fn new(index: usize, display_base: u32) -> Self {
        Self {
            index,
            display: format!(":{}", display_base + index as u32),
        }
    }
}

/// Reference to the application under test plus the display slot the run
/// was bound to. The slot is assigned at admission, not submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionTarget {
    pub start_url: String,
    #[serde(default)]
    pub slot: Option<DisplaySlot>,
}

impl ExecutionTarget {
    pub fn new(start_url: impl Into<String>) -> Self {
        Self {
            start_url: start_url.into(),
            slot: None,
        }
    }

    pub fn with_slot(mut self, slot: DisplaySlot) -> Self {
        self.slot = Some(slot);
        self
    }
}

/// A live interaction session against one execution target.
///
/// `perform` reports failures through [`VerifyError`]: `TransientAction` for
/// a failure the caller may replay once (target not yet rendered, display
/// busy, meaning the action did not take effect), `ActionFailure` for anything
/// permanent. `capture` must return a fresh observation every call; the
/// orchestrator bounds it with a timeout and maps expiry to
/// `ObservationTimeout`.
#[async_trait]
pub trait Session: Send {
    async fn capture(&mut self) -> Result<Observation, VerifyError>;

    async fn perform(&mut self, action: &Action) -> Result<ActionResult, VerifyError>;

    /// Open the target application before the loop starts (e.g. a fresh
    /// private browser window on the slot's display). Default no-op.
    async fn prepare(&mut self, _start_url: &str) -> Result<(), VerifyError> {
        Ok(())
    }

    /// Tear down whatever `prepare` opened. Default no-op; must be safe to
    /// call on a session that never prepared.
    async fn cleanup(&mut self) -> Result<(), VerifyError> {
        Ok(())
    }

    async fn close(&mut self);
}

#[async_trait]
pub trait Backend: Send + Sync {
    fn name(&self) -> &str;

    /// Open a session against the target. Failure here means the run never
    /// starts and surfaces as `BackendUnavailable`.
    async fn open(&self, target: &ExecutionTarget) -> Result<Box<dyn Session>, VerifyError>;
}
