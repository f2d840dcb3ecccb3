//! Session repository

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::config::ResubmissionPolicy;
use crate::db::SessionStore;
use crate::error::{AppError, AppResult};
use crate::models::ExamSession;

/// In-memory session store; transitions run under the write lock
#[derive(Debug, Default)]
pub struct SessionRepository {
    sessions: RwLock<HashMap<Uuid, ExamSession>>,
}

impl SessionRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for SessionRepository {
    async fn create(&self, session: ExamSession) -> AppResult<ExamSession> {
        self.sessions
            .write()
            .await
            .insert(session.id, session.clone());
        Ok(session)
    }

    async fn get(&self, id: Uuid) -> AppResult<Option<ExamSession>> {
        Ok(self.sessions.read().await.get(&id).cloned())
    }

    async fn begin_submit(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
        policy: ResubmissionPolicy,
    ) -> AppResult<Duration> {
        let mut sessions = self.sessions.write().await;
        let session = sessions.get_mut(&id).ok_or(AppError::SessionNotFound)?;
        Ok(session.begin_submit(now, policy)?)
    }

    async fn finish_submit(
        &self,
        id: Uuid,
        submission_id: Uuid,
        score: u32,
        now: DateTime<Utc>,
    ) -> AppResult<ExamSession> {
        let mut sessions = self.sessions.write().await;
        let session = sessions.get_mut(&id).ok_or(AppError::SessionNotFound)?;
        session.finish_submit(submission_id, score, now);
        Ok(session.clone())
    }

    async fn abort_submit(&self, id: Uuid, submission_id: Option<Uuid>) -> AppResult<()> {
        let mut sessions = self.sessions.write().await;
        let session = sessions.get_mut(&id).ok_or(AppError::SessionNotFound)?;
        session.abort_submit(submission_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_only_one_concurrent_claim_succeeds() {
        let repo = Arc::new(SessionRepository::new());
        let now = Utc::now();
        let session = repo
            .create(ExamSession::start(Uuid::new_v4(), Duration::from_secs(60), None, None, now))
            .await
            .unwrap();

        let mut tasks = Vec::new();
        for _ in 0..10 {
            let repo = repo.clone();
            tasks.push(tokio::spawn(async move {
                repo.begin_submit(session.id, now, ResubmissionPolicy::Reject).await
            }));
        }

        let mut claimed = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(_) => claimed += 1,
                Err(err) => assert!(matches!(err, AppError::SubmissionInProgress)),
            }
        }
        assert_eq!(claimed, 1);
    }

    #[tokio::test]
    async fn test_missing_session() {
        let repo = SessionRepository::new();
        let err = repo
            .begin_submit(Uuid::new_v4(), Utc::now(), ResubmissionPolicy::Reject)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::SessionNotFound));
    }
}
