//! Exam session model and its state machine
//!
//! A session starts in `Created` and ends in exactly one terminal state:
//! `Completed` when its time budget runs out, or `Submitted` once a
//! submission has been judged. Expiry is evaluated on demand; nothing
//! runs in the background.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::ResubmissionPolicy;

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Created,
    Completed,
    Submitted,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Completed => "completed",
            Self::Submitted => "submitted",
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Rejected transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("session is already {0}")]
    AlreadyTerminal(SessionState),

    #[error("session time has expired")]
    Expired,

    #[error("a submission is already being judged")]
    SubmissionInProgress,
}

/// Timed attempt of one user at one problem
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExamSession {
    pub id: Uuid,
    pub user_id: Option<String>,
    pub problem_id: Uuid,
    pub contest_id: Option<String>,
    pub started_at: DateTime<Utc>,
    pub duration_secs: u64,
    pub state: SessionState,
    #[serde(skip)]
    pub judging: bool,
    pub score: Option<u32>,
    pub ended_at: Option<DateTime<Utc>>,
    pub submission_ids: Vec<Uuid>,
}

impl ExamSession {
    pub fn start(
        problem_id: Uuid,
        duration: Duration,
        user_id: Option<String>,
        contest_id: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            problem_id,
            contest_id,
            started_at: now,
            duration_secs: duration.as_secs(),
            state: SessionState::Created,
            judging: false,
            score: None,
            ended_at: None,
            submission_ids: Vec::new(),
        }
    }

    pub fn deadline(&self) -> DateTime<Utc> {
        let secs = i64::try_from(self.duration_secs).unwrap_or(i64::MAX);
        TimeDelta::try_seconds(secs)
            .and_then(|budget| self.started_at.checked_add_signed(budget))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// Time left before the deadline, zero once it has passed
    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        (self.deadline() - now).to_std().unwrap_or(Duration::ZERO)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.deadline()
    }

    pub fn is_completed(&self) -> bool {
        self.state == SessionState::Completed
    }

    pub fn is_submitted(&self) -> bool {
        self.state == SessionState::Submitted
    }

    /// State as observed at `now`, counting an unrecorded expiry
    pub fn effective_state(&self, now: DateTime<Utc>) -> SessionState {
        if self.state == SessionState::Created && self.is_expired(now) {
            SessionState::Completed
        } else {
            self.state
        }
    }

    /// Time spent in the session so far, capped by its end
    pub fn time_spent(&self, now: DateTime<Utc>) -> Duration {
        let end = self.ended_at.unwrap_or(now).min(self.deadline());
        (end - self.started_at).to_std().unwrap_or(Duration::ZERO)
    }

    /// Claim the session for judging one submission.
    ///
    /// Returns the remaining time budget. An expired `Created` session is
    /// moved to `Completed` before the error is returned.
    pub fn begin_submit(
        &mut self,
        now: DateTime<Utc>,
        policy: ResubmissionPolicy,
    ) -> Result<Duration, SessionError> {
        if self.judging {
            return Err(SessionError::SubmissionInProgress);
        }

        match self.state {
            SessionState::Created if self.is_expired(now) => {
                self.expire(now);
                return Err(SessionError::Expired);
            }
            SessionState::Created => {}
            SessionState::Submitted
                if policy == ResubmissionPolicy::Overwrite && !self.is_expired(now) => {}
            state => return Err(SessionError::AlreadyTerminal(state)),
        }

        self.judging = true;
        Ok(self.remaining(now))
    }

    /// Record a judged submission; the latest score wins
    pub fn finish_submit(&mut self, submission_id: Uuid, score: u32, now: DateTime<Utc>) {
        self.judging = false;
        self.state = SessionState::Submitted;
        self.score = Some(score);
        self.ended_at = Some(now);
        self.submission_ids.push(submission_id);
    }

    /// Release the judging claim without changing state
    pub fn abort_submit(&mut self, submission_id: Option<Uuid>) {
        self.judging = false;
        if let Some(id) = submission_id {
            self.submission_ids.push(id);
        }
    }

    /// Move an expired `Created` session to `Completed`
    pub fn expire(&mut self, now: DateTime<Utc>) {
        if self.state == SessionState::Created {
            self.state = SessionState::Completed;
            self.ended_at = Some(now.min(self.deadline()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(now: DateTime<Utc>) -> ExamSession {
        ExamSession::start(Uuid::new_v4(), Duration::from_secs(300), None, None, now)
    }

    #[test]
    fn test_remaining_time_saturates() {
        let now = Utc::now();
        let s = session(now);
        assert_eq!(s.remaining(now), Duration::from_secs(300));
        assert_eq!(s.remaining(now + TimeDelta::seconds(100)), Duration::from_secs(200));
        assert_eq!(s.remaining(now + TimeDelta::seconds(900)), Duration::ZERO);
    }

    #[test]
    fn test_submit_once_under_reject_policy() {
        let now = Utc::now();
        let mut s = session(now);

        let remaining = s.begin_submit(now, ResubmissionPolicy::Reject).unwrap();
        assert_eq!(remaining, Duration::from_secs(300));
        s.finish_submit(Uuid::new_v4(), 10, now);

        assert!(s.is_submitted());
        assert_eq!(s.score, Some(10));
        assert_eq!(
            s.begin_submit(now, ResubmissionPolicy::Reject),
            Err(SessionError::AlreadyTerminal(SessionState::Submitted))
        );
    }

    #[test]
    fn test_overwrite_policy_allows_resubmit_until_deadline() {
        let now = Utc::now();
        let mut s = session(now);
        s.begin_submit(now, ResubmissionPolicy::Overwrite).unwrap();
        s.finish_submit(Uuid::new_v4(), 3, now);

        let later = now + TimeDelta::seconds(10);
        s.begin_submit(later, ResubmissionPolicy::Overwrite).unwrap();
        s.finish_submit(Uuid::new_v4(), 7, later);
        assert_eq!(s.score, Some(7));
        assert_eq!(s.submission_ids.len(), 2);

        let expired = now + TimeDelta::seconds(301);
        assert_eq!(
            s.begin_submit(expired, ResubmissionPolicy::Overwrite),
            Err(SessionError::AlreadyTerminal(SessionState::Submitted))
        );
    }

    #[test]
    fn test_expired_session_becomes_completed() {
        let now = Utc::now();
        let mut s = session(now);
        let expired = now + TimeDelta::seconds(301);

        assert_eq!(s.effective_state(expired), SessionState::Completed);
        assert_eq!(
            s.begin_submit(expired, ResubmissionPolicy::Reject),
            Err(SessionError::Expired)
        );
        assert!(s.is_completed());
        assert_eq!(s.ended_at, Some(s.deadline()));
        assert_eq!(
            s.begin_submit(expired, ResubmissionPolicy::Reject),
            Err(SessionError::AlreadyTerminal(SessionState::Completed))
        );
    }

    #[test]
    fn test_concurrent_submit_is_rejected() {
        let now = Utc::now();
        let mut s = session(now);
        s.begin_submit(now, ResubmissionPolicy::Reject).unwrap();
        assert_eq!(
            s.begin_submit(now, ResubmissionPolicy::Reject),
            Err(SessionError::SubmissionInProgress)
        );

        s.abort_submit(None);
        assert_eq!(s.state, SessionState::Created);
        assert!(s.begin_submit(now, ResubmissionPolicy::Reject).is_ok());
    }
}
