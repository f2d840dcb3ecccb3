//! Problem handler implementations

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    error::AppResult,
    handlers::sessions::SessionResponse,
    services::{ProblemService, RunService, SessionService},
    state::AppState,
};

use super::{
    request::{RunCodeRequest, StartSessionRequest},
    response::{ProblemResponse, ProblemsListResponse, RunResponse},
};

/// List all problems
pub async fn list_problems(
    State(state): State<AppState>,
) -> AppResult<Json<ProblemsListResponse>> {
    let problems = ProblemService::list_problems(state.stores()).await?;

    Ok(Json(ProblemsListResponse {
        total: problems.len(),
        problems,
    }))
}

/// Get problem by ID
pub async fn get_problem(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ProblemResponse>> {
    let problem = ProblemService::get_problem(state.stores(), id).await?;
    Ok(Json(problem))
}

/// Start an exam session on a problem
pub async fn start_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    payload: Option<Json<StartSessionRequest>>,
) -> AppResult<(StatusCode, Json<SessionResponse>)> {
    let payload = payload.map(|Json(p)| p).unwrap_or_default();
    payload.validate()?;

    let session =
        SessionService::start_exam(state.stores(), id, payload.user_id, payload.contest_id).await?;

    Ok((StatusCode::CREATED, Json(SessionResponse::now(&session))))
}

/// Run code against the visible test cases
pub async fn run_code(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<RunCodeRequest>,
) -> AppResult<Json<RunResponse>> {
    payload.validate()?;

    let feedback = RunService::run(
        state.stores(),
        state.scheduler(),
        state.config().judge.max_source_bytes,
        id,
        &payload.code,
        &payload.language,
    )
    .await?;

    Ok(Json(feedback))
}
