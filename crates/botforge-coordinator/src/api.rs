//! HTTP handlers for the trial start/submit protocol.

use crate::{database::Database, evolution::EvolutionEngine};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use botforge_core::{DispatchStats, StartDecision, StartResponse, TrialResult};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<EvolutionEngine>,
    pub db: Database,
}

#[derive(Serialize)]
pub struct HealthResponse {
    status: String,
    version: String,
}

/// Health check endpoint
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

#[derive(Deserialize)]
pub struct TrialStartRequest {
    worker_id: Option<String>,
}

/// `START`: grant or deny one trial. A request arriving between generations
/// is denied, which is also the protocol's "no work right now" signal.
pub async fn request_trial(
    State(state): State<AppState>,
    Json(req): Json<TrialStartRequest>,
) -> Json<StartResponse> {
    let Some(coordinator) = state.engine.current_coordinator() else {
        debug!(worker_id = ?req.worker_id, "start denied: no open generation");
        return Json(StartResponse::denied());
    };

    match coordinator.try_grant() {
        StartDecision::Granted(assignment) => {
            info!(
                worker_id = ?req.worker_id,
                generation = assignment.generation,
                trial_index = assignment.trial_index,
                "trial granted"
            );
            Json(StartResponse::granted(assignment))
        }
        StartDecision::Denied => {
            debug!(worker_id = ?req.worker_id, "start denied: quota exhausted");
            Json(StartResponse::denied())
        }
    }
}

#[derive(Serialize)]
pub struct SubmitResponse {
    success: bool,
}

/// Accept one trial result.
pub async fn submit_result(
    State(state): State<AppState>,
    Json(result): Json<TrialResult>,
) -> Result<Json<SubmitResponse>, ApiError> {
    let Some(coordinator) = state.engine.current_coordinator() else {
        warn!(
            generation = result.generation,
            trial_index = result.trial_index,
            "result submitted with no open generation"
        );
        return Err(ApiError::Conflict("no open generation".to_string()));
    };

    info!(
        generation = result.generation,
        trial_index = result.trial_index,
        status = ?result.status,
        "trial result submitted"
    );
    coordinator.accept_result(result)?;
    Ok(Json(SubmitResponse { success: true }))
}

#[derive(Serialize)]
pub struct StatsResponse {
    /// Dispatch progress for the open generation, absent between generations.
    dispatch: Option<DispatchStats>,
    generations_persisted: u64,
}

/// Get coordination statistics
pub async fn get_stats(State(state): State<AppState>) -> Result<Json<StatsResponse>, ApiError> {
    let dispatch = state.engine.current_coordinator().map(|c| c.stats());
    let generations_persisted = state.db.count_generations().await?;

    Ok(Json(StatsResponse {
        dispatch,
        generations_persisted,
    }))
}

// Error handling
pub enum ApiError {
    Internal(String),
    Conflict(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
        };

        (status, message).into_response()
    }
}

impl From<botforge_core::Error> for ApiError {
    fn from(err: botforge_core::Error) -> Self {
        error!("Core error: {}", err);
        match err {
            botforge_core::Error::InvalidState(msg) => ApiError::Conflict(msg),
            other => ApiError::Internal(other.to_string()),
        }
    }
}
