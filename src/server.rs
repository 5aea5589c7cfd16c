use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{Json, Router, routing::get, routing::post};
use log::{error, info};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::assemble::{self, TimetableView, Viewer};
use crate::config::{EngineConfig, ServerConfig};
use crate::data::{InfeasibleGroup, Schedule, Snapshot};
use crate::error::EngineError;
use crate::jobs::{JobRecord, JobStore, MemoryJobStore};
use crate::solver::{self, Solution};

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SolveRequest {
    pub data: Snapshot,
    #[serde(default)]
    pub config: EngineConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssembleRequest {
    pub schedule: Schedule,
    pub data: Snapshot,
    /// Narrow the view to one student or faculty member.
    #[serde(default)]
    pub viewer: Option<Viewer>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub kind: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub diagnostics: Vec<InfeasibleGroup>,
}

type ApiError = (StatusCode, Json<ErrorBody>);

fn reject(e: EngineError) -> ApiError {
    let status = match &e {
        EngineError::Data(_) | EngineError::Config(_) => StatusCode::BAD_REQUEST,
        EngineError::InfeasibleSchedule { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        EngineError::SolverTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        EngineError::Solver(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    let diagnostics = match &e {
        EngineError::InfeasibleSchedule { diagnostics } => diagnostics.clone(),
        _ => Vec::new(),
    };
    (
        status,
        Json(ErrorBody {
            kind: e.kind().to_string(),
            message: e.to_string(),
            diagnostics,
        }),
    )
}

fn join_failure(e: tokio::task::JoinError) -> ApiError {
    error!("Solve task panicked or was cancelled: {e}");
    reject(EngineError::Solver(format!("solve task failed: {e}")))
}

#[derive(Clone)]
pub struct AppState {
    pub jobs: Arc<dyn JobStore>,
}

async fn solve_handler(Json(request): Json<SolveRequest>) -> Result<Json<Solution>, ApiError> {
    let result = tokio::task::spawn_blocking(move || solver::solve(&request.data, &request.config))
        .await
        .map_err(join_failure)?;
    match result {
        Ok(solution) => Ok(Json(solution)),
        Err(e) => Err(reject(e)),
    }
}

async fn create_job_handler(
    State(state): State<AppState>,
    Json(request): Json<SolveRequest>,
) -> Result<(StatusCode, Json<JobRecord>), ApiError> {
    request.config.validate().map_err(reject)?;
    let record = state.jobs.create();
    let id = record.id;
    info!("Queued solve job {id}");

    let jobs = state.jobs.clone();
    tokio::task::spawn_blocking(move || {
        if let Err(e) = jobs.mark_running(id) {
            error!("Job {id} could not start: {e}");
            return;
        }
        let outcome = solver::solve(&request.data, &request.config);
        if let Err(e) = jobs.finish(id, outcome) {
            error!("Job {id} could not be closed: {e}");
        }
    });
    Ok((StatusCode::ACCEPTED, Json(record)))
}

async fn get_job_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<JobRecord>, ApiError> {
    state.jobs.get(id).map(Json).ok_or_else(|| {
        (
            StatusCode::NOT_FOUND,
            Json(ErrorBody {
                kind: "notFound".to_string(),
                message: format!("job {id} not found"),
                diagnostics: Vec::new(),
            }),
        )
    })
}

async fn assemble_handler(
    Json(request): Json<AssembleRequest>,
) -> Result<Json<TimetableView>, ApiError> {
    let view = assemble::assemble(&request.schedule, &request.data).map_err(reject)?;
    Ok(Json(match &request.viewer {
        Some(viewer) => view.for_viewer(viewer),
        None => view,
    }))
}

pub fn router(jobs: Arc<dyn JobStore>) -> Router {
    Router::new()
        .route("/v1/timetable/solve", post(solve_handler))
        .route("/v1/timetable/jobs", post(create_job_handler))
        .route("/v1/timetable/jobs/:id", get(get_job_handler))
        .route("/v1/timetable/assemble", post(assemble_handler))
        .with_state(AppState { jobs })
}

pub async fn run_server(config: ServerConfig) -> std::io::Result<()> {
    let app = router(Arc::new(MemoryJobStore::new()));

    let listener = tokio::net::TcpListener::bind(config.bind).await?;

    info!("Server running at http://{}", listener.local_addr()?);

    axum::serve(listener, app).await
}
