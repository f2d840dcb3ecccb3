//! Submission response DTOs

use serde::Serialize;
use uuid::Uuid;

use crate::models::{SubmissionRecord, SubmissionStatus, TestResult};

/// Judged submission as returned over HTTP
#[derive(Debug, Serialize)]
pub struct SubmissionResponse {
    pub id: Uuid,
    pub status: SubmissionStatus,
    pub score: u32,
    pub error_message: Option<String>,
    /// Hidden tests carry no input, expected or actual value
    pub results: Vec<TestResult>,
}

impl From<SubmissionRecord> for SubmissionResponse {
    fn from(record: SubmissionRecord) -> Self {
        Self {
            id: record.id,
            status: record.status,
            score: record.score,
            error_message: record.error_message,
            results: record.results.iter().map(TestResult::redacted).collect(),
        }
    }
}
