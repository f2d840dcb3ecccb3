//! Execution scheduler
//!
//! Runs one submission against all of its test cases with a fixed pool of
//! workers. Workers pull slot indexes from a shared cursor and write each
//! outcome back into its slot, so results come out in test-case order no
//! matter which run finishes first. Every slot gets an outcome: a crash, a
//! timeout or a panicking run only fails its own slot.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use uuid::Uuid;

use crate::judge::cancel::CancelSignal;
use crate::judge::harness::{Harness, RunReport};
use crate::judge::languages::{PrepareError, Runner, RunnerRegistry};
use crate::judge::metrics;
use crate::judge::sandbox::{LaunchSpec, Sandbox};
use crate::judge::verdict::{TestErrorKind, values_equal};
use crate::judge::{ExecutionLimits, JudgeError};
use crate::models::{EntryPoint, TestCase};

/// One submission to evaluate
#[derive(Debug, Clone)]
pub struct EvaluationRequest {
    pub code: String,
    pub language: String,
    pub entry_point: EntryPoint,
    pub test_cases: Vec<TestCase>,
    pub limits: ExecutionLimits,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TestError {
    pub kind: TestErrorKind,
    pub message: String,
}

/// Result of running one test case
#[derive(Debug, Clone, PartialEq)]
pub struct TestOutcome {
    pub test_case_id: Uuid,
    pub order: i32,
    pub actual: Option<Value>,
    pub duration: Duration,
    pub error: Option<TestError>,
}

impl TestOutcome {
    pub fn passed(&self) -> bool {
        self.error.is_none()
    }

    fn failed(job: &Job, kind: TestErrorKind, message: impl Into<String>) -> Self {
        Self {
            test_case_id: job.test_case_id,
            order: job.order,
            actual: None,
            duration: Duration::ZERO,
            error: Some(TestError {
                kind,
                message: message.into(),
            }),
        }
    }

    fn label(&self) -> &'static str {
        self.error.as_ref().map_or("passed", |e| e.kind.as_str())
    }
}

/// Evaluation result before scoring
#[derive(Debug, Clone, PartialEq)]
pub enum Evaluation {
    CompilationError(String),
    InternalError(String),
    Executed(Vec<TestOutcome>),
}

#[derive(Debug, Clone)]
struct Job {
    test_case_id: Uuid,
    order: i32,
    expected: Value,
    harness: Harness,
    launch: LaunchSpec,
}

/// Bounded worker pool over the sandbox
#[derive(Clone)]
pub struct Scheduler {
    registry: Arc<RunnerRegistry>,
    sandbox: Arc<Sandbox>,
    workers: usize,
    check_time_limit: Duration,
}

impl Scheduler {
    pub fn new(
        registry: Arc<RunnerRegistry>,
        sandbox: Arc<Sandbox>,
        workers: usize,
        check_time_limit: Duration,
    ) -> Self {
        Self {
            registry,
            sandbox,
            workers: workers.max(1),
            check_time_limit,
        }
    }

    pub fn registry(&self) -> &RunnerRegistry {
        &self.registry
    }

    /// Evaluate a submission against every test case of the request
    pub async fn evaluate(
        &self,
        request: EvaluationRequest,
        cancel: CancelSignal,
    ) -> Result<Evaluation, JudgeError> {
        let runner = self.registry.resolve(&request.language)?;
        if request.test_cases.is_empty() {
            return Err(JudgeError::NoTestCases);
        }

        let _active = metrics::ActiveEvaluation::start();
        let limits = ExecutionLimits {
            check_time_limit: self.check_time_limit,
            ..request.limits
        };
        let mut test_cases = request.test_cases;
        test_cases.sort_by_key(|tc| tc.order);

        let artifact = match runner
            .prepare(&request.code, &self.sandbox, &limits, cancel.clone())
            .await
        {
            Ok(artifact) => artifact,
            Err(PrepareError::Compilation(message)) => {
                tracing::debug!(language = runner.language(), "Submission failed syntax check");
                return Ok(Evaluation::CompilationError(message));
            }
            Err(PrepareError::Cancelled) => {
                let outcomes = test_cases
                    .iter()
                    .map(|tc| TestOutcome {
                        test_case_id: tc.id,
                        order: tc.order,
                        actual: None,
                        duration: Duration::ZERO,
                        error: Some(TestError {
                            kind: TestErrorKind::Cancelled,
                            message: "cancelled: exam time expired".to_string(),
                        }),
                    })
                    .collect();
                return Ok(Evaluation::Executed(outcomes));
            }
            Err(PrepareError::Internal(message)) => {
                tracing::error!(
                    language = runner.language(),
                    error = %message,
                    "Failed to prepare submission"
                );
                return Ok(Evaluation::InternalError(message));
            }
        };

        let jobs: Arc<[Job]> = test_cases
            .iter()
            .map(|tc| {
                let harness = runner.harness(&artifact, &request.entry_point, &tc.input);
                let launch = runner.invocation_command(&artifact, &harness, &limits);
                Job {
                    test_case_id: tc.id,
                    order: tc.order,
                    expected: tc.expected_output.clone(),
                    harness,
                    launch,
                }
            })
            .collect();

        Ok(Evaluation::Executed(self.run_pool(runner, jobs, limits, cancel).await))
    }

    async fn run_pool(
        &self,
        runner: Arc<dyn Runner>,
        jobs: Arc<[Job]>,
        limits: ExecutionLimits,
        cancel: CancelSignal,
    ) -> Vec<TestOutcome> {
        let cursor = Arc::new(AtomicUsize::new(0));
        let (tx, mut rx) = mpsc::unbounded_channel::<(usize, TestOutcome)>();
        let mut workers = JoinSet::new();

        for _ in 0..self.workers.min(jobs.len()) {
            let runner = runner.clone();
            let sandbox = self.sandbox.clone();
            let jobs = jobs.clone();
            let cursor = cursor.clone();
            let cancel = cancel.clone();
            let tx = tx.clone();

            workers.spawn(async move {
                loop {
                    let slot = cursor.fetch_add(1, Ordering::Relaxed);
                    let Some(job) = jobs.get(slot) else {
                        break;
                    };

                    // A panic inside one run stays inside its own task
                    let run = tokio::spawn(run_job(
                        runner.clone(),
                        sandbox.clone(),
                        jobs.clone(),
                        slot,
                        limits,
                        cancel.clone(),
                    ));
                    let outcome = match run.await {
                        Ok(outcome) => outcome,
                        Err(e) => {
                            tracing::error!(test_case = job.order, error = %e, "Test run panicked");
                            TestOutcome::failed(
                                job,
                                TestErrorKind::InternalError,
                                "judge failure while running test",
                            )
                        }
                    };

                    if tx.send((slot, outcome)).is_err() {
                        break;
                    }
                }
            });
        }
        drop(tx);

        let mut slots: Vec<Option<TestOutcome>> = vec![None; jobs.len()];
        while let Some((slot, outcome)) = rx.recv().await {
            slots[slot] = Some(outcome);
        }
        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "Judge worker failed");
            }
        }

        slots
            .into_iter()
            .zip(jobs.iter())
            .map(|(slot, job)| {
                slot.unwrap_or_else(|| {
                    TestOutcome::failed(job, TestErrorKind::InternalError, "no result was recorded")
                })
            })
            .collect()
    }
}

async fn run_job(
    runner: Arc<dyn Runner>,
    sandbox: Arc<Sandbox>,
    jobs: Arc<[Job]>,
    slot: usize,
    limits: ExecutionLimits,
    cancel: CancelSignal,
) -> TestOutcome {
    let job = &jobs[slot];
    let raw = sandbox.run(&job.launch, limits.time_limit, cancel).await;
    let report = runner.parse_output(&job.harness, raw);

    let outcome = match report {
        RunReport::Returned { value, elapsed } => {
            let equal = values_equal(&value, &job.expected, limits.float_tolerance);
            let error = (!equal).then(|| TestError {
                kind: TestErrorKind::WrongAnswer,
                message: "returned value does not match the expected output".to_string(),
            });
            TestOutcome {
                test_case_id: job.test_case_id,
                order: job.order,
                actual: Some(value),
                duration: elapsed,
                error,
            }
        }
        RunReport::Failed {
            kind,
            message,
            elapsed,
        } => TestOutcome {
            test_case_id: job.test_case_id,
            order: job.order,
            actual: None,
            duration: elapsed,
            error: Some(TestError { kind, message }),
        },
    };

    tracing::debug!(
        test_case = job.order,
        language = runner.language(),
        outcome = outcome.label(),
        elapsed_ms = outcome.duration.as_millis() as u64,
        "Test case finished"
    );
    metrics::record_test_run(runner.language(), outcome.label(), outcome.duration.as_secs_f64());
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::judge::cancel::cancellation;
    use crate::judge::testing::{ScriptRunner, sandbox_config, script_case};
    use std::time::Instant;

    fn scheduler(root: &std::path::Path, workers: usize) -> Scheduler {
        let mut registry = RunnerRegistry::new();
        registry.register(Arc::new(ScriptRunner));
        let sandbox = Sandbox::new(sandbox_config(root));
        Scheduler::new(Arc::new(registry), Arc::new(sandbox), workers, Duration::from_secs(5))
    }

    fn request(code: &str, test_cases: Vec<TestCase>, time_limit: Duration) -> EvaluationRequest {
        EvaluationRequest {
            code: code.to_string(),
            language: "script".to_string(),
            entry_point: EntryPoint::new("solve"),
            test_cases,
            limits: ExecutionLimits {
                time_limit,
                ..ExecutionLimits::default()
            },
        }
    }

    fn executed(evaluation: Evaluation) -> Vec<TestOutcome> {
        match evaluation {
            Evaluation::Executed(outcomes) => outcomes,
            other => panic!("expected executed evaluation, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_results_are_in_test_case_order() {
        let root = tempfile::tempdir().unwrap();
        // Later orders finish first
        let cases = vec![
            script_case(3, "sleep 0.1; echo 3", 3),
            script_case(1, "sleep 0.5; echo 1", 1),
            script_case(2, "sleep 0.3; echo 2", 2),
        ];
        let outcomes = executed(
            scheduler(root.path(), 3)
                .evaluate(request("", cases, Duration::from_secs(5)), CancelSignal::never())
                .await
                .unwrap(),
        );

        let orders: Vec<_> = outcomes.iter().map(|o| o.order).collect();
        assert_eq!(orders, vec![1, 2, 3]);
        assert!(outcomes.iter().all(TestOutcome::passed));
    }

    #[tokio::test]
    async fn test_failures_stay_in_their_slot() {
        let root = tempfile::tempdir().unwrap();
        let cases = vec![
            script_case(1, "echo 1", 1),
            script_case(2, "echo nope >&2; exit 1", 2),
            script_case(3, "sleep 30", 3),
            script_case(4, "echo 5", 4),
            script_case(5, "echo 5", 5),
        ];
        let started = Instant::now();
        let outcomes = executed(
            scheduler(root.path(), 2)
                .evaluate(request("", cases, Duration::from_millis(300)), CancelSignal::never())
                .await
                .unwrap(),
        );
        assert!(started.elapsed() < Duration::from_secs(10));

        let kinds: Vec<_> = outcomes
            .iter()
            .map(|o| o.error.as_ref().map(|e| e.kind))
            .collect();
        assert_eq!(
            kinds,
            vec![
                None,
                Some(TestErrorKind::RuntimeError),
                Some(TestErrorKind::TimedOut),
                Some(TestErrorKind::WrongAnswer),
                None,
            ]
        );
        assert_eq!(outcomes[3].actual, Some(serde_json::json!(5)));
    }

    #[tokio::test]
    async fn test_single_worker_runs_everything() {
        let root = tempfile::tempdir().unwrap();
        let cases = (1..=4)
            .map(|i| script_case(i, &format!("echo {}", i), i as i64))
            .collect();
        let outcomes = executed(
            scheduler(root.path(), 1)
                .evaluate(request("", cases, Duration::from_secs(5)), CancelSignal::never())
                .await
                .unwrap(),
        );
        assert_eq!(outcomes.len(), 4);
        assert!(outcomes.iter().all(TestOutcome::passed));
    }

    #[tokio::test]
    async fn test_repeated_evaluation_is_deterministic() {
        let root = tempfile::tempdir().unwrap();
        let cases = vec![
            script_case(1, "sleep 0.2; echo 1", 1),
            script_case(2, "echo 3", 2),
            script_case(3, "echo oops >&2; exit 2", 3),
            script_case(4, "echo 4", 4),
        ];
        let request = request("", cases, Duration::from_secs(5));
        let scheduler = scheduler(root.path(), 3);

        let mut runs = Vec::new();
        for _ in 0..2 {
            let outcomes = executed(
                scheduler
                    .evaluate(request.clone(), CancelSignal::never())
                    .await
                    .unwrap(),
            );
            // Durations vary between runs
            let stable: Vec<_> = outcomes
                .into_iter()
                .map(|o| (o.test_case_id, o.order, o.actual, o.error))
                .collect();
            runs.push(stable);
        }

        assert_eq!(runs[0], runs[1]);
        assert_eq!(runs[0].len(), 4);
    }

    #[tokio::test]
    async fn test_compilation_error_short_circuits() {
        let root = tempfile::tempdir().unwrap();
        let cases = vec![script_case(1, "echo 1", 1)];
        let evaluation = scheduler(root.path(), 2)
            .evaluate(
                request("syntax error", cases, Duration::from_secs(5)),
                CancelSignal::never(),
            )
            .await
            .unwrap();
        assert!(matches!(evaluation, Evaluation::CompilationError(_)));
    }

    #[tokio::test]
    async fn test_cancellation_marks_in_flight_runs() {
        let root = tempfile::tempdir().unwrap();
        let cases = vec![script_case(1, "sleep 30", 1), script_case(2, "sleep 30", 2)];
        let (handle, signal) = cancellation();
        let scheduler = scheduler(root.path(), 2);

        let run = tokio::spawn(async move {
            scheduler
                .evaluate(request("", cases, Duration::from_secs(30)), signal)
                .await
        });
        tokio::time::sleep(Duration::from_millis(200)).await;
        handle.cancel();

        let outcomes = executed(
            tokio::time::timeout(Duration::from_secs(10), run)
                .await
                .unwrap()
                .unwrap()
                .unwrap(),
        );
        assert!(outcomes
            .iter()
            .all(|o| o.error.as_ref().map(|e| e.kind) == Some(TestErrorKind::Cancelled)));
    }

    #[tokio::test]
    async fn test_unknown_language_and_empty_cases() {
        let root = tempfile::tempdir().unwrap();
        let scheduler = scheduler(root.path(), 2);

        let mut unknown = request("", vec![script_case(1, "echo 1", 1)], Duration::from_secs(1));
        unknown.language = "cobol".to_string();
        assert!(matches!(
            scheduler.evaluate(unknown, CancelSignal::never()).await,
            Err(JudgeError::UnsupportedLanguage(_))
        ));

        assert!(matches!(
            scheduler
                .evaluate(request("", Vec::new(), Duration::from_secs(1)), CancelSignal::never())
                .await,
            Err(JudgeError::NoTestCases)
        ));
    }
}
