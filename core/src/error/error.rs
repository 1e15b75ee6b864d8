use thiserror::Error;

/// Failure classes a verification run can hit.
///
/// Transient classes (`TransientAction`, one capture retry, one decision
/// re-prompt) are retried inside the component that detected them and never
/// surface past that boundary when the retry succeeds. Everything else forces
/// the run to `Failed`, with the cause recorded on the run itself rather than
/// thrown across the external interface.
#[derive(Error, Debug)]
pub enum VerifyError {
    #[error("observation timed out")]
    ObservationTimeout,
    #[error("action failed permanently: {0}")]
    ActionFailure(String),
    #[error("transient action failure: {0}")]
    TransientAction(String),
    #[error("could not parse model decision: {0}")]
    DecisionParse(String),
    #[error("model decision timed out")]
    DecisionTimeout,
    #[error("no display slot became available in time")]
    AdmissionTimeout,
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),
    #[error("backend error: {0}")]
    Backend(#[from] anyhow::Error),
}

impl VerifyError {
    /// Retryable inside the detecting component, bounded to one attempt.
    pub fn is_transient(&self) -> bool {
        matches!(self, VerifyError::TransientAction(_))
    }
}

#[derive(Error, Debug)]
pub enum CliError {
    #[error("verification failed: {0}")]
    Verify(#[from] VerifyError),
    #[error("command failed: {0}")]
    Command(String),
    #[error("config error: {0}")]
    Config(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("anyhow error: {0}")]
    Anyhow(#[from] anyhow::Error),
}
