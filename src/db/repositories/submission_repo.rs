//! Submission repository

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::db::SubmissionStore;
use crate::error::{AppError, AppResult};
use crate::judge::Judgement;
use crate::models::{Submission, SubmissionRecord, SubmissionStatus, TestResult};

#[derive(Debug, Clone)]
struct StoredSubmission {
    submission: Submission,
    results: Vec<TestResult>,
}

/// In-memory submission store.
///
/// A submission and its results live in one map entry, so `finalize`
/// publishes the terminal status and the results together.
#[derive(Debug, Default)]
pub struct SubmissionRepository {
    submissions: RwLock<HashMap<Uuid, StoredSubmission>>,
}

impl SubmissionRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SubmissionStore for SubmissionRepository {
    async fn create(&self, submission: Submission) -> AppResult<Submission> {
        let stored = StoredSubmission {
            submission: submission.clone(),
            results: Vec::new(),
        };
        self.submissions.write().await.insert(submission.id, stored);
        Ok(submission)
    }

    async fn get(&self, id: Uuid) -> AppResult<Option<SubmissionRecord>> {
        Ok(self
            .submissions
            .read()
            .await
            .get(&id)
            .map(|stored| SubmissionRecord::new(&stored.submission, stored.results.clone())))
    }

    async fn mark_running(&self, id: Uuid) -> AppResult<()> {
        let mut submissions = self.submissions.write().await;
        let stored = submissions.get_mut(&id).ok_or(AppError::SubmissionNotFound)?;
        if stored.submission.status == SubmissionStatus::Pending {
            stored.submission.status = SubmissionStatus::Running;
        }
        Ok(())
    }

    async fn finalize(&self, id: Uuid, judgement: Judgement) -> AppResult<SubmissionRecord> {
        let mut submissions = self.submissions.write().await;
        let stored = submissions.get_mut(&id).ok_or(AppError::SubmissionNotFound)?;

        if stored.submission.status.is_final() {
            return Err(AppError::Internal(anyhow::anyhow!(
                "submission {} is already {}",
                id,
                stored.submission.status
            )));
        }

        stored.submission.status = judgement.status;
        stored.submission.score = judgement.score;
        stored.submission.error_message = judgement.error_message;
        stored.submission.judged_at = Some(Utc::now());
        stored.results = judgement.results;

        Ok(SubmissionRecord::new(&stored.submission, stored.results.clone()))
    }
}
