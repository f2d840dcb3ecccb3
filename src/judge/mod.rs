//! Judging engine
//!
//! Turns a submission into per-test outcomes:
//!
//! - [`languages`]: runner registry, one runner per supported language
//! - [`harness`]: result-line protocol shared by the generated harnesses
//! - [`sandbox`]: isolated process execution with deadlines and limits
//! - `isolation`: the namespace setup a sandboxed run enters before exec
//! - [`scheduler`]: bounded worker pool with per-test failure isolation
//! - [`verdict`]: comparison, scoring and aggregate status

pub mod cancel;
pub mod harness;
mod isolation;
pub mod languages;
pub mod metrics;
pub mod sandbox;
pub mod scheduler;
pub mod verdict;

#[cfg(test)]
pub(crate) mod testing;

use std::time::Duration;

use crate::constants::{
    DEFAULT_MEMORY_LIMIT_MB, DEFAULT_PREPARE_TIME_LIMIT_MS, DEFAULT_TIME_LIMIT_MS,
};

pub use cancel::{CancelHandle, CancelSignal, cancellation};
pub use languages::{Runner, RunnerRegistry};
pub use sandbox::Sandbox;
pub use scheduler::{Evaluation, EvaluationRequest, Scheduler, TestOutcome};
pub use verdict::{Judgement, TestErrorKind, aggregate, values_equal};

/// Submission-level errors; per-test failures are outcomes, not errors
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum JudgeError {
    #[error("Unsupported language: {0}")]
    UnsupportedLanguage(String),

    #[error("Problem has no test cases")]
    NoTestCases,
}

/// Limits applied to the runs of one evaluation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExecutionLimits {
    /// Wall-clock deadline of one test run
    pub time_limit: Duration,
    pub memory_limit_mb: u64,
    pub float_tolerance: Option<f64>,
    /// Deadline of the syntax check
    pub check_time_limit: Duration,
}

impl ExecutionLimits {
    pub fn memory_limit_bytes(&self) -> u64 {
        self.memory_limit_mb.saturating_mul(1024 * 1024)
    }
}

impl Default for ExecutionLimits {
    fn default() -> Self {
        Self {
            time_limit: Duration::from_millis(DEFAULT_TIME_LIMIT_MS),
            memory_limit_mb: DEFAULT_MEMORY_LIMIT_MB,
            float_tolerance: None,
            check_time_limit: Duration::from_millis(DEFAULT_PREPARE_TIME_LIMIT_MS),
        }
    }
}
