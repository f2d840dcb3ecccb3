//! Test comparison, scoring and aggregate status

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use uuid::Uuid;

use crate::judge::scheduler::{Evaluation, TestOutcome};
use crate::models::{SubmissionStatus, TestCase, TestResult};

/// Why a single test case failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestErrorKind {
    WrongAnswer,
    TimedOut,
    MemoryLimitExceeded,
    RuntimeError,
    InternalError,
    Cancelled,
}

impl TestErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WrongAnswer => "wrong_answer",
            Self::TimedOut => "timed_out",
            Self::MemoryLimitExceeded => "memory_limit_exceeded",
            Self::RuntimeError => "runtime_error",
            Self::InternalError => "internal_error",
            Self::Cancelled => "cancelled",
        }
    }

    /// Higher wins when several kinds occur in one submission
    pub fn priority(&self) -> u8 {
        match self {
            Self::InternalError => 4,
            Self::TimedOut | Self::Cancelled => 3,
            Self::MemoryLimitExceeded => 2,
            Self::RuntimeError => 1,
            Self::WrongAnswer => 0,
        }
    }
}

impl std::fmt::Display for TestErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Deep structural equality with numeric normalization.
///
/// `5` equals `5.0`, booleans never equal numbers, object key order is
/// irrelevant. With a tolerance, numbers within `tolerance` of each other match.
pub fn values_equal(actual: &Value, expected: &Value, tolerance: Option<f64>) -> bool {
    match (actual, expected) {
        (Value::Number(a), Value::Number(b)) => numbers_equal(a, b, tolerance),
        (Value::Array(a), Value::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| values_equal(x, y, tolerance))
        }
        (Value::Object(a), Value::Object(b)) => {
            a.len() == b.len()
                && a.iter()
                    .all(|(key, x)| b.get(key).is_some_and(|y| values_equal(x, y, tolerance)))
        }
        _ => actual == expected,
    }
}

fn numbers_equal(a: &Number, b: &Number, tolerance: Option<f64>) -> bool {
    if tolerance.is_none() && !a.is_f64() && !b.is_f64() {
        return a.as_i64() == b.as_i64() && a.as_u64() == b.as_u64();
    }
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => match tolerance {
            Some(tolerance) => (x - y).abs() <= tolerance,
            None => x == y,
        },
        _ => false,
    }
}

/// Final verdict of one submission
#[derive(Debug, Clone)]
pub struct Judgement {
    pub status: SubmissionStatus,
    pub score: u32,
    pub error_message: Option<String>,
    pub results: Vec<TestResult>,
    pub max_time_ms: u64,
}

impl Judgement {
    /// Judgement for a submission the engine could not finish
    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::without_results(SubmissionStatus::InternalError, message.into())
    }

    fn without_results(status: SubmissionStatus, message: String) -> Self {
        Self {
            status,
            score: 0,
            error_message: Some(message),
            results: Vec::new(),
            max_time_ms: 0,
        }
    }
}

/// Score an evaluation against the problem's test cases
pub fn aggregate(
    submission_id: Uuid,
    test_cases: &[TestCase],
    evaluation: Evaluation,
) -> Judgement {
    match evaluation {
        Evaluation::CompilationError(message) => {
            Judgement::without_results(SubmissionStatus::CompilationError, message)
        }
        Evaluation::InternalError(message) => {
            Judgement::without_results(SubmissionStatus::InternalError, message)
        }
        Evaluation::Executed(outcomes) => score_outcomes(submission_id, test_cases, outcomes),
    }
}

fn score_outcomes(
    submission_id: Uuid,
    test_cases: &[TestCase],
    mut outcomes: Vec<TestOutcome>,
) -> Judgement {
    let by_id: HashMap<Uuid, &TestCase> = test_cases.iter().map(|tc| (tc.id, tc)).collect();
    outcomes.sort_by_key(|outcome| outcome.order);

    let mut results = Vec::with_capacity(outcomes.len());
    let mut score: u32 = 0;
    let mut max_time_ms = 0;
    let mut worst: Option<(TestErrorKind, String)> = None;

    for outcome in outcomes {
        let Some(test_case) = by_id.get(&outcome.test_case_id) else {
            tracing::warn!(test_case = %outcome.test_case_id, "Outcome for unknown test case");
            continue;
        };

        let passed = outcome.passed();
        let points_earned = if passed { test_case.points } else { 0 };
        let execution_time_ms = u64::try_from(outcome.duration.as_millis()).unwrap_or(u64::MAX);
        score = score.saturating_add(points_earned);
        max_time_ms = max_time_ms.max(execution_time_ms);

        if let Some(error) = &outcome.error {
            // First test by order keeps the message among equal kinds
            let replaces = worst
                .as_ref()
                .is_none_or(|(kind, _)| error.kind.priority() > kind.priority());
            if replaces {
                let message = match error.kind {
                    TestErrorKind::WrongAnswer => {
                        format!("Wrong answer on {}", test_case.display_name())
                    }
                    _ => format!("{}: {}", test_case.display_name(), error.message),
                };
                worst = Some((error.kind, message));
            }
        }

        results.push(TestResult {
            submission_id,
            test_case_id: test_case.id,
            name: test_case.display_name(),
            order: test_case.order,
            is_hidden: test_case.is_hidden,
            input: test_case.input.clone(),
            expected: test_case.expected_output.clone(),
            actual: outcome.actual,
            passed,
            execution_time_ms,
            points_earned,
            error_kind: outcome.error.as_ref().map(|e| e.kind),
            error: outcome
                .error
                .filter(|e| e.kind != TestErrorKind::WrongAnswer)
                .map(|e| e.message),
        });
    }

    if results.is_empty() {
        return Judgement::without_results(
            SubmissionStatus::InternalError,
            "no test results were produced".to_string(),
        );
    }

    let (status, error_message) = match worst {
        None => (SubmissionStatus::Accepted, None),
        Some((kind, message)) => (SubmissionStatus::from(kind), Some(message)),
    };

    Judgement {
        status,
        score,
        error_message,
        results,
        max_time_ms,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::judge::scheduler::TestError;
    use serde_json::json;
    use std::time::Duration;

    fn test_case(order: i32, points: u32) -> TestCase {
        TestCase {
            id: Uuid::new_v4(),
            problem_id: Uuid::nil(),
            name: format!("case {}", order),
            input: json!([order]),
            expected_output: json!(order),
            is_hidden: false,
            points,
            order,
        }
    }

    fn outcome(tc: &TestCase, failure: Option<(TestErrorKind, &str)>) -> TestOutcome {
        TestOutcome {
            test_case_id: tc.id,
            order: tc.order,
            actual: failure.is_none().then(|| tc.expected_output.clone()),
            duration: Duration::from_millis(10 * tc.order as u64),
            error: failure.map(|(kind, message)| TestError {
                kind,
                message: message.to_string(),
            }),
        }
    }

    #[test]
    fn test_numeric_equality() {
        assert!(values_equal(&json!(5), &json!(5.0), None));
        assert!(values_equal(&json!(-3), &json!(-3), None));
        assert!(!values_equal(&json!(u64::MAX), &json!(u64::MAX - 1), None));
        assert!(!values_equal(&json!(0.1 + 0.2), &json!(0.3), None));
        assert!(values_equal(&json!(0.1 + 0.2), &json!(0.3), Some(1e-9)));
        assert!(!values_equal(&json!(1.0), &json!(1.1), Some(1e-9)));
    }

    #[test]
    fn test_booleans_never_equal_numbers() {
        assert!(!values_equal(&json!(true), &json!(1), None));
        assert!(!values_equal(&json!(false), &json!(0), Some(1.0)));
    }

    #[test]
    fn test_structural_equality() {
        assert!(values_equal(
            &json!({"a": [1, 2.0], "b": null}),
            &json!({"b": null, "a": [1.0, 2]}),
            None
        ));
        assert!(!values_equal(&json!([1, 2]), &json!([2, 1]), None));
        assert!(!values_equal(&json!({"a": 1}), &json!({"a": 1, "b": 2}), None));
        assert!(!values_equal(&json!("5"), &json!(5), None));
    }

    #[test]
    fn test_all_passed_is_accepted() {
        let cases = vec![test_case(1, 10), test_case(2, 5)];
        let outcomes = cases.iter().map(|tc| outcome(tc, None)).collect();
        let judgement = aggregate(Uuid::new_v4(), &cases, Evaluation::Executed(outcomes));

        assert_eq!(judgement.status, SubmissionStatus::Accepted);
        assert_eq!(judgement.score, 15);
        assert_eq!(judgement.max_time_ms, 20);
        assert!(judgement.error_message.is_none());
        assert!(judgement.results.iter().all(|r| r.passed));
    }

    #[test]
    fn test_partial_score_and_wrong_answer() {
        let cases = vec![test_case(1, 10), test_case(2, 5)];
        let outcomes = vec![
            outcome(&cases[0], None),
            outcome(&cases[1], Some((TestErrorKind::WrongAnswer, "mismatch"))),
        ];
        let judgement = aggregate(Uuid::new_v4(), &cases, Evaluation::Executed(outcomes));

        assert_eq!(judgement.status, SubmissionStatus::WrongAnswer);
        assert_eq!(judgement.score, 10);
        assert_eq!(judgement.results[1].points_earned, 0);
        assert_eq!(judgement.error_message.as_deref(), Some("Wrong answer on case 2"));
    }

    #[test]
    fn test_highest_priority_failure_wins() {
        let cases: Vec<_> = (1..=4).map(|order| test_case(order, 1)).collect();
        let outcomes = vec![
            outcome(&cases[0], Some((TestErrorKind::WrongAnswer, "mismatch"))),
            outcome(&cases[1], Some((TestErrorKind::RuntimeError, "boom"))),
            outcome(&cases[2], Some((TestErrorKind::TimedOut, "slow"))),
            outcome(&cases[3], Some((TestErrorKind::MemoryLimitExceeded, "big"))),
        ];
        let judgement = aggregate(Uuid::new_v4(), &cases, Evaluation::Executed(outcomes));

        assert_eq!(judgement.status, SubmissionStatus::TimeLimitExceeded);
        assert_eq!(judgement.error_message.as_deref(), Some("case 3: slow"));
    }

    #[test]
    fn test_first_failure_by_order_keeps_message() {
        let cases: Vec<_> = (1..=3).map(|order| test_case(order, 1)).collect();
        // Delivered out of order on purpose
        let outcomes = vec![
            outcome(&cases[2], Some((TestErrorKind::RuntimeError, "third"))),
            outcome(&cases[0], None),
            outcome(&cases[1], Some((TestErrorKind::RuntimeError, "second"))),
        ];
        let judgement = aggregate(Uuid::new_v4(), &cases, Evaluation::Executed(outcomes));

        assert_eq!(judgement.status, SubmissionStatus::RuntimeError);
        assert_eq!(judgement.error_message.as_deref(), Some("case 2: second"));
        let orders: Vec<_> = judgement.results.iter().map(|r| r.order).collect();
        assert_eq!(orders, vec![1, 2, 3]);
    }

    #[test]
    fn test_internal_error_outranks_time_limit() {
        let cases = vec![test_case(1, 1), test_case(2, 1)];
        let outcomes = vec![
            outcome(&cases[0], Some((TestErrorKind::Cancelled, "cancelled"))),
            outcome(&cases[1], Some((TestErrorKind::InternalError, "no result"))),
        ];
        let judgement = aggregate(Uuid::new_v4(), &cases, Evaluation::Executed(outcomes));
        assert_eq!(judgement.status, SubmissionStatus::InternalError);
    }

    #[test]
    fn test_compilation_error_has_no_results() {
        let cases = vec![test_case(1, 10)];
        let judgement = aggregate(
            Uuid::new_v4(),
            &cases,
            Evaluation::CompilationError("SyntaxError: invalid syntax".into()),
        );
        assert_eq!(judgement.status, SubmissionStatus::CompilationError);
        assert_eq!(judgement.score, 0);
        assert!(judgement.results.is_empty());
    }

    #[test]
    fn test_no_outcomes_is_internal_error() {
        let judgement = aggregate(Uuid::new_v4(), &[], Evaluation::Executed(Vec::new()));
        assert_eq!(judgement.status, SubmissionStatus::InternalError);
    }
}
