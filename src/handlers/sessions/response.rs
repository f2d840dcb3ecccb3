//! Session response DTOs

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::models::{ExamSession, SessionState};

/// Session as seen at the time of the request
#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub id: Uuid,
    pub problem_id: Uuid,
    pub user_id: Option<String>,
    pub contest_id: Option<String>,
    /// Reports `completed` once the time budget is spent, even before the
    /// stored state has been moved
    pub state: SessionState,
    pub started_at: DateTime<Utc>,
    pub deadline: DateTime<Utc>,
    pub duration_secs: u64,
    pub remaining_secs: u64,
    pub time_spent_secs: u64,
    pub judging: bool,
    pub score: Option<u32>,
    pub ended_at: Option<DateTime<Utc>>,
    pub submission_ids: Vec<Uuid>,
}

impl SessionResponse {
    pub fn at(session: &ExamSession, now: DateTime<Utc>) -> Self {
        Self {
            id: session.id,
            problem_id: session.problem_id,
            user_id: session.user_id.clone(),
            contest_id: session.contest_id.clone(),
            state: session.effective_state(now),
            started_at: session.started_at,
            deadline: session.deadline(),
            duration_secs: session.duration_secs,
            remaining_secs: session.remaining(now).as_secs(),
            time_spent_secs: session.time_spent(now).as_secs(),
            judging: session.judging,
            score: session.score,
            ended_at: session.ended_at,
            submission_ids: session.submission_ids.clone(),
        }
    }

    pub fn now(session: &ExamSession) -> Self {
        Self::at(session, Utc::now())
    }
}
