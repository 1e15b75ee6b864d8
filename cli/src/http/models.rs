//! Tool-surface request/response models.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use spector_core::api::{CriterionStatus, Run, RunStatus, VerificationStatus};

use crate::registry::{RequirementEntry, RequirementState, SetupEntry};

#[derive(Debug, Serialize)]
pub struct SetupSummary {
    pub id: u32,
    pub name: String,
    pub start_url: String,
    pub num_requirements: usize,
    pub num_unprocessed: usize,
    pub num_processing: usize,
    pub num_met: usize,
    pub num_partially_met: usize,
    pub num_unmet: usize,
    pub num_error: usize,
}

impl SetupSummary {
    pub fn from_entry(setup: &SetupEntry) -> Self {
        let count = |state: RequirementState| {
            setup
                .requirements
                .iter()
                .filter(|r| r.state == state)
                .count()
        };
        Self {
            id: setup.id,
            name: setup.name.clone(),
            start_url: setup.start_url.clone(),
            num_requirements: setup.requirements.len(),
            num_unprocessed: count(RequirementState::Unprocessed),
            num_processing: count(RequirementState::Processing),
            num_met: count(RequirementState::Met),
            num_partially_met: count(RequirementState::PartiallyMet),
            num_unmet: count(RequirementState::Unmet),
            num_error: count(RequirementState::Error),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SetupsResponse {
    pub setups: Vec<SetupSummary>,
}

#[derive(Debug, Serialize)]
pub struct CriterionDto {
    pub name: String,
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct RequirementDto {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub state: RequirementState,
    pub criteria: Vec<CriterionDto>,
}

impl RequirementDto {
    pub fn from_entry(entry: &RequirementEntry) -> Self {
        Self {
            id: entry.requirement.id,
            title: entry.requirement.title.clone(),
            description: entry.requirement.description.clone(),
            state: entry.state,
            criteria: entry
                .requirement
                .criteria
                .iter()
                .map(|c| CriterionDto {
                    name: c.name.clone(),
                    text: c.text.clone(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RequirementsResponse {
    pub requirements: Vec<RequirementDto>,
}

#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    pub setup_id: u32,
    pub requirement_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct VerifyBatchRequest {
    pub setup_id: u32,
    pub requirement_ids: Vec<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct VerdictDto {
    pub criterion_name: String,
    pub status: CriterionStatus,
    pub feedback: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evidence_step: Option<usize>,
}

/// Full report for one finished run. Failed and cancelled runs report the
/// same shape, with their partial trajectory length and verdicts.
#[derive(Debug, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub requirement_id: Uuid,
    pub status: RunStatus,
    pub overall: VerificationStatus,
    pub steps: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elapsed_s: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub verdicts: Vec<VerdictDto>,
}

impl RunReport {
    pub fn from_run(run: &Run) -> Self {
        Self {
            run_id: run.id,
            requirement_id: run.requirement.id,
            status: run.status,
            overall: run.overall(),
            steps: run.trajectory.len(),
            elapsed_s: run.elapsed_s(),
            error: run.error.clone(),
            verdicts: run
                .verdicts
                .iter()
                .map(|v| VerdictDto {
                    criterion_name: v.criterion_name.clone(),
                    status: v.status,
                    feedback: v.feedback.clone(),
                    evidence_step: v.evidence_step,
                })
                .collect(),
        }
    }
}

/// Batch results, in the same order as the submitted `requirement_ids`.
#[derive(Debug, Serialize)]
pub struct BatchReport {
    pub items: Vec<RunReport>,
}

#[derive(Debug, Serialize)]
pub struct RunStatusResponse {
    pub run_id: Uuid,
    pub status: RunStatus,
    pub steps: usize,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug)]
pub enum HttpError {
    NotFound(String),
    BadRequest(String),
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            HttpError::NotFound(m) => (StatusCode::NOT_FOUND, m),
            HttpError::BadRequest(m) => (StatusCode::BAD_REQUEST, m),
        };
        (status, Json(ErrorResponse { error: message })).into_response()
    }
}
