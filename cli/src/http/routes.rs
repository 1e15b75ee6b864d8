//! Tool-surface route handlers.
//!
//! A small fixed set of operations for an external automated caller: list
//! the setups it can work on, fetch unprocessed requirements, run one
//! verification or a batch synchronously (the call blocks until the runs
//! are terminal), and poll run status. Verification handlers always answer
//! with a well-formed run report, failed runs included.

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use uuid::Uuid;

use spector_core::api::VerificationRequest;

use crate::http::models::*;
use crate::http::state::AppState;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/setups", get(setups_list_handler))
        .route(
            "/api/v1/setups/:setup_id/requirements/unprocessed",
            get(unprocessed_handler),
        )
        .route("/api/v1/verify", post(verify_handler))
        .route("/api/v1/verify-batch", post(verify_batch_handler))
        .route("/api/v1/runs/:run_id", get(run_status_handler))
        .route("/api/v1/shutdown", post(shutdown_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

/// GET /api/v1/setups: the caller's "list pending work" entry point.
async fn setups_list_handler(State(state): State<AppState>) -> Json<SetupsResponse> {
    let setups = state
        .registry
        .with_setups(|setups| setups.iter().map(SetupSummary::from_entry).collect());
    Json(SetupsResponse { setups })
}

/// GET /api/v1/setups/{id}/requirements/unprocessed
async fn unprocessed_handler(
    State(state): State<AppState>,
    Path(setup_id): Path<u32>,
) -> Result<Json<RequirementsResponse>, HttpError> {
    let known = state
        .registry
        .with_setups(|setups| setups.iter().any(|s| s.id == setup_id));
    if !known {
        return Err(HttpError::NotFound(format!("no setup with id {setup_id}")));
    }
    let requirements = state.registry.with_setups(|setups| {
        setups
            .iter()
            .filter(|s| s.id == setup_id)
            .flat_map(|s| {
                s.requirements
                    .iter()
                    .filter(|r| {
                        r.state == crate::registry::RequirementState::Unprocessed
                    })
                    .map(RequirementDto::from_entry)
            })
            .collect()
    });
    Ok(Json(RequirementsResponse { requirements }))
}

/// POST /api/v1/verify: run one verification and block until it is
/// terminal.
async fn verify_handler(
    State(state): State<AppState>,
    Json(request): Json<VerifyRequest>,
) -> Result<Json<RunReport>, HttpError> {
    let (requirement, input, start_url) = state
        .registry
        .checkout(request.setup_id, &request.requirement_id)
        .ok_or_else(|| {
            HttpError::NotFound(format!(
                "no requirement {} in setup {}",
                request.requirement_id, request.setup_id
            ))
        })?;

    let run = state
        .scheduler
        .submit(VerificationRequest {
            requirement,
            input,
            start_url,
        })
        .await_result()
        .await;
    state.registry.record_result(&request.requirement_id, &run);
    Ok(Json(RunReport::from_run(&run)))
}

/// POST /api/v1/verify-batch: run an ordered set against the shared pool
/// and block until every item is terminal. Items come back in request
/// order.
async fn verify_batch_handler(
    State(state): State<AppState>,
    Json(request): Json<VerifyBatchRequest>,
) -> Result<Json<BatchReport>, HttpError> {
    if request.requirement_ids.is_empty() {
        return Err(HttpError::BadRequest(
            "requirement_ids must not be empty".to_string(),
        ));
    }

    let mut submissions = Vec::with_capacity(request.requirement_ids.len());
    for requirement_id in &request.requirement_ids {
        let (requirement, input, start_url) = state
            .registry
            .checkout(request.setup_id, requirement_id)
            .ok_or_else(|| {
                HttpError::NotFound(format!(
                    "no requirement {requirement_id} in setup {}",
                    request.setup_id
                ))
            })?;
        submissions.push((
            *requirement_id,
            state.scheduler.submit(VerificationRequest {
                requirement,
                input,
                start_url,
            }),
        ));
    }

    let mut items = Vec::with_capacity(submissions.len());
    for (requirement_id, handle) in submissions {
        let run = handle.await_result().await;
        state.registry.record_result(&requirement_id, &run);
        items.push(RunReport::from_run(&run));
    }
    Ok(Json(BatchReport { items }))
}

/// GET /api/v1/runs/{id}: non-blocking status plus trajectory length.
async fn run_status_handler(
    State(state): State<AppState>,
    Path(run_id): Path<Uuid>,
) -> Result<Json<RunStatusResponse>, HttpError> {
    let progress = state
        .scheduler
        .status(&run_id)
        .ok_or_else(|| HttpError::NotFound(format!("no run with id {run_id}")))?;
    Ok(Json(RunStatusResponse {
        run_id,
        status: progress.status,
        steps: progress.steps,
    }))
}

async fn shutdown_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    let _ = state.shutdown_tx.send(());
    Json(serde_json::json!({"status": "shutting down"}))
}
