//! Problem model

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::{
    DEFAULT_EXAM_DURATION_SECS, DEFAULT_MEMORY_LIMIT_MB, DEFAULT_TIME_LIMIT_MS,
};
use crate::judge::ExecutionLimits;
use crate::models::TestCase;

/// Function a submission must define
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryPoint {
    pub name: String,
    #[serde(default)]
    pub params: Vec<String>,
}

impl EntryPoint {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
        }
    }

    /// Entry names are embedded in generated harness code, so they must be
    /// plain identifiers in every supported language.
    pub fn is_valid(&self) -> bool {
        let mut chars = self.name.chars();
        match chars.next() {
            Some(c) if c.is_ascii_alphabetic() || c == '_' => {
                chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
            }
            _ => false,
        }
    }
}

/// Problem definition; immutable once loaded
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Problem {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub entry_point: EntryPoint,
    #[serde(default = "default_time_limit_ms")]
    pub time_limit_ms: u64,
    #[serde(default = "default_memory_limit_mb")]
    pub memory_limit_mb: u64,
    #[serde(default = "default_exam_duration_secs")]
    pub exam_duration_secs: u64,
    /// Absolute tolerance for numeric comparison; exact when absent
    #[serde(default)]
    pub float_tolerance: Option<f64>,
    /// Starter code per language
    #[serde(default)]
    pub initial_code: HashMap<String, String>,
    #[serde(default)]
    pub test_cases: Vec<TestCase>,
}

fn default_time_limit_ms() -> u64 {
    DEFAULT_TIME_LIMIT_MS
}

fn default_memory_limit_mb() -> u64 {
    DEFAULT_MEMORY_LIMIT_MB
}

fn default_exam_duration_secs() -> u64 {
    DEFAULT_EXAM_DURATION_SECS
}

/// Reasons a problem definition is rejected at load time
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ProblemError {
    #[error("entry point `{0}` is not a valid identifier")]
    InvalidEntryPoint(String),

    #[error("duplicate test case order {0}")]
    DuplicateOrder(i32),

    #[error("duplicate test case id {0}")]
    DuplicateTestCaseId(Uuid),

    #[error("test case points exceed the maximum score")]
    PointsOverflow,

    #[error("time limit must be positive")]
    ZeroTimeLimit,
}

impl Problem {
    /// Check structural invariants and attach test cases to this problem
    pub fn normalize(&mut self) -> Result<(), ProblemError> {
        if !self.entry_point.is_valid() {
            return Err(ProblemError::InvalidEntryPoint(self.entry_point.name.clone()));
        }
        if self.time_limit_ms == 0 {
            return Err(ProblemError::ZeroTimeLimit);
        }

        let mut orders = HashSet::new();
        let mut ids = HashSet::new();
        let mut max_score: u32 = 0;
        for tc in &self.test_cases {
            if !orders.insert(tc.order) {
                return Err(ProblemError::DuplicateOrder(tc.order));
            }
            if !ids.insert(tc.id) {
                return Err(ProblemError::DuplicateTestCaseId(tc.id));
            }
            max_score = max_score
                .checked_add(tc.points)
                .ok_or(ProblemError::PointsOverflow)?;
        }

        for tc in &mut self.test_cases {
            tc.problem_id = self.id;
        }
        self.test_cases.sort_by_key(|tc| tc.order);
        Ok(())
    }

    /// Execution limits for one run of this problem
    pub fn limits(&self) -> ExecutionLimits {
        ExecutionLimits {
            time_limit: Duration::from_millis(self.time_limit_ms),
            memory_limit_mb: self.memory_limit_mb,
            float_tolerance: self.float_tolerance,
            ..ExecutionLimits::default()
        }
    }

    /// Time budget of an exam session on this problem
    pub fn exam_duration(&self) -> Duration {
        Duration::from_secs(self.exam_duration_secs)
    }

    /// Test cases shown to the candidate
    pub fn visible_test_cases(&self) -> Vec<TestCase> {
        self.test_cases
            .iter()
            .filter(|tc| !tc.is_hidden)
            .cloned()
            .collect()
    }

    pub fn max_score(&self) -> u32 {
        self.test_cases
            .iter()
            .fold(0u32, |total, tc| total.saturating_add(tc.points))
    }
}

/// Submission counters of a problem
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ProblemStatistics {
    pub total_submissions: u64,
    pub successful_submissions: u64,
    /// Percentage of accepted submissions
    pub acceptance_rate: f64,
}

impl ProblemStatistics {
    pub fn new(total_submissions: u64, successful_submissions: u64) -> Self {
        let acceptance_rate = if total_submissions == 0 {
            0.0
        } else {
            successful_submissions as f64 / total_submissions as f64 * 100.0
        };
        Self {
            total_submissions,
            successful_submissions,
            acceptance_rate,
        }
    }
}
