//! Problem response DTOs

use std::collections::HashMap;

use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::models::{Problem, ProblemStatistics, SubmissionStatus, TestCase, TestResult};

/// Public problem view; hidden test cases are left out
#[derive(Debug, Serialize)]
pub struct ProblemResponse {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub entry_point: String,
    pub params: Vec<String>,
    pub time_limit_ms: u64,
    pub memory_limit_mb: u64,
    pub exam_duration_secs: u64,
    pub initial_code: HashMap<String, String>,
    pub max_score: u32,
    pub test_cases: Vec<TestCaseResponse>,
    pub hidden_test_count: usize,
    pub statistics: ProblemStatistics,
}

impl ProblemResponse {
    pub fn new(problem: &Problem, statistics: ProblemStatistics) -> Self {
        let test_cases: Vec<TestCaseResponse> = problem
            .visible_test_cases()
            .iter()
            .map(TestCaseResponse::from)
            .collect();

        Self {
            id: problem.id,
            title: problem.title.clone(),
            description: problem.description.clone(),
            entry_point: problem.entry_point.name.clone(),
            params: problem.entry_point.params.clone(),
            time_limit_ms: problem.time_limit_ms,
            memory_limit_mb: problem.memory_limit_mb,
            exam_duration_secs: problem.exam_duration_secs,
            initial_code: problem.initial_code.clone(),
            max_score: problem.max_score(),
            hidden_test_count: problem.test_cases.len() - test_cases.len(),
            test_cases,
            statistics,
        }
    }
}

/// Problem summary for list views
#[derive(Debug, Serialize)]
pub struct ProblemSummary {
    pub id: Uuid,
    pub title: String,
    pub exam_duration_secs: u64,
    pub max_score: u32,
}

impl From<&Problem> for ProblemSummary {
    fn from(problem: &Problem) -> Self {
        Self {
            id: problem.id,
            title: problem.title.clone(),
            exam_duration_secs: problem.exam_duration_secs,
            max_score: problem.max_score(),
        }
    }
}

/// Problem list response
#[derive(Debug, Serialize)]
pub struct ProblemsListResponse {
    pub problems: Vec<ProblemSummary>,
    pub total: usize,
}

/// Visible test case
#[derive(Debug, Serialize)]
pub struct TestCaseResponse {
    pub id: Uuid,
    pub name: String,
    pub order: i32,
    pub points: u32,
    pub input: Value,
    pub expected_output: Value,
}

impl From<&TestCase> for TestCaseResponse {
    fn from(test_case: &TestCase) -> Self {
        Self {
            id: test_case.id,
            name: test_case.display_name(),
            order: test_case.order,
            points: test_case.points,
            input: test_case.input.clone(),
            expected_output: test_case.expected_output.clone(),
        }
    }
}

/// Feedback from a pre-submit run against the visible test cases
#[derive(Debug, Serialize)]
pub struct RunResponse {
    pub status: SubmissionStatus,
    pub score: u32,
    pub max_score: u32,
    pub error_message: Option<String>,
    pub results: Vec<TestResult>,
}
