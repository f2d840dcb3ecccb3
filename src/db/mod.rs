//! Storage module
//!
//! Store traits the services depend on, plus in-memory repositories that
//! implement them.

pub mod repositories;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::config::ResubmissionPolicy;
use crate::error::AppResult;
use crate::judge::Judgement;
use crate::models::{ExamSession, Problem, ProblemStatistics, Submission, SubmissionRecord};

/// Read access to problems and their submission counters
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProblemStore: Send + Sync {
    async fn get(&self, id: Uuid) -> AppResult<Option<Arc<Problem>>>;

    async fn list(&self) -> AppResult<Vec<Arc<Problem>>>;

    async fn statistics(&self, id: Uuid) -> AppResult<ProblemStatistics>;

    /// Count one terminal submission
    async fn record_outcome(&self, id: Uuid, accepted: bool) -> AppResult<()>;
}

/// Exam sessions; every transition is applied atomically by the store
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create(&self, session: ExamSession) -> AppResult<ExamSession>;

    async fn get(&self, id: Uuid) -> AppResult<Option<ExamSession>>;

    /// Claim the session for judging; returns the remaining time budget
    async fn begin_submit(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
        policy: ResubmissionPolicy,
    ) -> AppResult<Duration>;

    async fn finish_submit(
        &self,
        id: Uuid,
        submission_id: Uuid,
        score: u32,
        now: DateTime<Utc>,
    ) -> AppResult<ExamSession>;

    async fn abort_submit(&self, id: Uuid, submission_id: Option<Uuid>) -> AppResult<()>;
}

/// Submissions and their per-test results
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SubmissionStore: Send + Sync {
    async fn create(&self, submission: Submission) -> AppResult<Submission>;

    async fn get(&self, id: Uuid) -> AppResult<Option<SubmissionRecord>>;

    async fn mark_running(&self, id: Uuid) -> AppResult<()>;

    /// Write status, score and all test results as one unit
    async fn finalize(&self, id: Uuid, judgement: Judgement) -> AppResult<SubmissionRecord>;
}

/// The stores a service call works against
#[derive(Clone)]
pub struct Stores {
    pub problems: Arc<dyn ProblemStore>,
    pub sessions: Arc<dyn SessionStore>,
    pub submissions: Arc<dyn SubmissionStore>,
}

impl Stores {
    /// In-memory stores over an already loaded problem catalogue
    pub fn in_memory(problems: repositories::ProblemRepository) -> Self {
        Self {
            problems: Arc::new(problems),
            sessions: Arc::new(repositories::SessionRepository::new()),
            submissions: Arc::new(repositories::SubmissionRepository::new()),
        }
    }
}
