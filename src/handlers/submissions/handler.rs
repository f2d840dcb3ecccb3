//! Submission handler implementations

use axum::{
    extract::{Path, State},
    Json,
};
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    state::AppState,
};

use super::response::SubmissionResponse;

/// Get a submission with its per-test results
pub async fn get_submission(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<SubmissionResponse>> {
    let record = state
        .stores()
        .submissions
        .get(id)
        .await?
        .ok_or(AppError::SubmissionNotFound)?;

    Ok(Json(SubmissionResponse::from(record)))
}
