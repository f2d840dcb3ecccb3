//! Submission model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::judge::TestErrorKind;

/// Submission record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submission {
    pub id: Uuid,
    pub session_id: Uuid,
    pub problem_id: Uuid,
    pub user_id: Option<String>,
    pub contest_id: Option<String>,
    pub language: String,
    #[serde(skip_serializing)]
    pub source_code: String,
    pub status: SubmissionStatus,
    pub score: u32,
    pub error_message: Option<String>,
    pub submitted_at: DateTime<Utc>,
    pub judged_at: Option<DateTime<Utc>>,
}

impl Submission {
    /// New pending submission
    pub fn pending(
        session_id: Uuid,
        problem_id: Uuid,
        user_id: Option<String>,
        contest_id: Option<String>,
        language: &str,
        source_code: &str,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id,
            problem_id,
            user_id,
            contest_id,
            language: language.to_string(),
            source_code: source_code.to_string(),
            status: SubmissionStatus::Pending,
            score: 0,
            error_message: None,
            submitted_at: Utc::now(),
            judged_at: None,
        }
    }
}

/// Submission status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStatus {
    Pending,
    Running,
    Accepted,
    WrongAnswer,
    TimeLimitExceeded,
    MemoryLimitExceeded,
    RuntimeError,
    CompilationError,
    InternalError,
}

impl SubmissionStatus {
    /// Get status as string
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Accepted => "accepted",
            Self::WrongAnswer => "wrong_answer",
            Self::TimeLimitExceeded => "time_limit_exceeded",
            Self::MemoryLimitExceeded => "memory_limit_exceeded",
            Self::RuntimeError => "runtime_error",
            Self::CompilationError => "compilation_error",
            Self::InternalError => "internal_error",
        }
    }

    /// Check if this is a final status (judging complete)
    pub fn is_final(&self) -> bool {
        !matches!(self, Self::Pending | Self::Running)
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted)
    }
}

impl std::fmt::Display for SubmissionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<TestErrorKind> for SubmissionStatus {
    fn from(kind: TestErrorKind) -> Self {
        match kind {
            TestErrorKind::WrongAnswer => Self::WrongAnswer,
            TestErrorKind::TimedOut | TestErrorKind::Cancelled => Self::TimeLimitExceeded,
            TestErrorKind::MemoryLimitExceeded => Self::MemoryLimitExceeded,
            TestErrorKind::RuntimeError => Self::RuntimeError,
            TestErrorKind::InternalError => Self::InternalError,
        }
    }
}

/// Outcome of one test case within a submission
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestResult {
    pub submission_id: Uuid,
    pub test_case_id: Uuid,
    pub name: String,
    pub order: i32,
    pub is_hidden: bool,
    pub input: Value,
    pub expected: Value,
    pub actual: Option<Value>,
    pub passed: bool,
    pub execution_time_ms: u64,
    pub points_earned: u32,
    pub error_kind: Option<TestErrorKind>,
    pub error: Option<String>,
}

impl TestResult {
    /// Copy with input, expected and actual removed for hidden test cases
    pub fn redacted(&self) -> Self {
        if !self.is_hidden {
            return self.clone();
        }
        Self {
            input: Value::Null,
            expected: Value::Null,
            actual: None,
            ..self.clone()
        }
    }
}

/// Submission together with its per-test results
#[derive(Debug, Clone, Serialize)]
pub struct SubmissionRecord {
    pub id: Uuid,
    pub status: SubmissionStatus,
    pub score: u32,
    pub error_message: Option<String>,
    pub results: Vec<TestResult>,
}

impl SubmissionRecord {
    pub fn new(submission: &Submission, results: Vec<TestResult>) -> Self {
        Self {
            id: submission.id,
            status: submission.status,
            score: submission.score,
            error_message: submission.error_message.clone(),
            results,
        }
    }
}
