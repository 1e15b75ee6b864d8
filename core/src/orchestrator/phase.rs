//! Orchestrator phase transitions and validation.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The orchestrator's loop phases. `Perceiving → Deciding → Acting` repeats
/// until a termination condition moves the machine into `Finalizing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    Initializing,
    Perceiving,
    Deciding,
    Acting,
    Finalizing,
    Completed,
    Failed,
}

#[derive(Debug, Error)]
pub enum PhaseError {
    #[error("Invalid transition from {from:?} to {to:?}")]
    InvalidTransition { from: Phase, to: Phase },
    #[error("Cannot transition from terminal phase {phase:?}")]
    FromTerminalPhase { phase: Phase },
}

pub struct PhaseTransition;

impl PhaseTransition {
    pub fn validate(from: Phase, to: Phase) -> Result<(), PhaseError> {
        if Self::is_terminal(from) {
            return Err(PhaseError::FromTerminalPhase { phase: from });
        }

        let is_valid = match (from, to) {
            (Phase::Initializing, Phase::Perceiving) => true,

            (Phase::Perceiving, Phase::Deciding) => true,
            (Phase::Deciding, Phase::Acting) => true,
            (Phase::Acting, Phase::Perceiving) => true,

            // Termination can interrupt the loop at any point: budget
            // exhaustion and `finish` leave from Acting, cancellation is
            // checked at the start of every transition.
            (Phase::Initializing, Phase::Finalizing) => true,
            (Phase::Perceiving, Phase::Finalizing) => true,
            (Phase::Deciding, Phase::Finalizing) => true,
            (Phase::Acting, Phase::Finalizing) => true,

            (Phase::Finalizing, Phase::Completed) => true,

            // Fatal errors can end the run from anywhere.
            (_, Phase::Failed) => true,

            _ => false,
        };

        if is_valid {
            Ok(())
        } else {
            Err(PhaseError::InvalidTransition { from, to })
        }
    }

    pub fn is_terminal(phase: Phase) -> bool {
        matches!(phase, Phase::Completed | Phase::Failed)
    }
}
