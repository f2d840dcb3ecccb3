//! Session handler implementations

use axum::{
    extract::{Path, State},
    Json,
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    error::AppResult,
    handlers::submissions::SubmissionResponse,
    services::SessionService,
    state::AppState,
};

use super::{request::SubmitRequest, response::SessionResponse};

/// Get session by ID
pub async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<SessionResponse>> {
    let session = SessionService::get_session(state.stores(), id).await?;
    Ok(Json(SessionResponse::now(&session)))
}

/// Submit and judge the session's solution
pub async fn submit(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<SubmitRequest>,
) -> AppResult<Json<SubmissionResponse>> {
    payload.validate()?;

    let record = SessionService::submit(
        state.stores(),
        state.scheduler(),
        &state.config().judge,
        id,
        &payload.code,
        &payload.language,
    )
    .await?;

    Ok(Json(SubmissionResponse::from(record)))
}
