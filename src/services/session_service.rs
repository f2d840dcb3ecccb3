//! Exam session service
//!
//! Starting an exam and the submit pipeline: validate, claim the session,
//! evaluate, score, then publish the result, the counters and the session
//! transition in that order.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use uuid::Uuid;

use crate::{
    config::JudgeConfig,
    db::Stores,
    error::{AppError, AppResult},
    judge::{self, EvaluationRequest, Judgement, Scheduler, cancellation, metrics},
    models::{ExamSession, Problem, Submission, SubmissionRecord},
};

/// Session service for business logic
pub struct SessionService;

impl SessionService {
    /// Start a timed exam on a problem
    pub async fn start_exam(
        stores: &Stores,
        problem_id: Uuid,
        user_id: Option<String>,
        contest_id: Option<String>,
    ) -> AppResult<ExamSession> {
        let problem = stores
            .problems
            .get(problem_id)
            .await?
            .ok_or(AppError::ProblemNotFound)?;

        let session = ExamSession::start(
            problem.id,
            problem.exam_duration(),
            user_id,
            contest_id,
            Utc::now(),
        );
        let session = stores.sessions.create(session).await?;

        tracing::info!(
            session_id = %session.id,
            problem_id = %problem.id,
            duration_secs = session.duration_secs,
            "Exam session started"
        );
        Ok(session)
    }

    /// Get session by ID
    pub async fn get_session(stores: &Stores, id: Uuid) -> AppResult<ExamSession> {
        stores
            .sessions
            .get(id)
            .await?
            .ok_or(AppError::SessionNotFound)
    }

    /// Judge the session's submission
    pub async fn submit(
        stores: &Stores,
        scheduler: &Scheduler,
        config: &JudgeConfig,
        session_id: Uuid,
        code: &str,
        language: &str,
    ) -> AppResult<SubmissionRecord> {
        if code.trim().is_empty() {
            return Err(AppError::CodeRequired);
        }
        if code.len() > config.max_source_bytes {
            return Err(AppError::Validation(format!(
                "code exceeds {} bytes",
                config.max_source_bytes
            )));
        }

        let session = Self::get_session(stores, session_id).await?;
        let problem = stores
            .problems
            .get(session.problem_id)
            .await?
            .ok_or(AppError::ProblemNotFound)?;
        if problem.test_cases.is_empty() {
            return Err(AppError::NoTestCases);
        }
        let runner = scheduler.registry().resolve(language)?;

        let remaining = stores
            .sessions
            .begin_submit(session.id, Utc::now(), config.resubmission)
            .await?;

        let pending = Submission::pending(
            session.id,
            problem.id,
            session.user_id.clone(),
            session.contest_id.clone(),
            runner.language(),
            code,
        );

        // Owned task: a dropped request does not abandon the claimed session
        let task = tokio::spawn(Self::judge_claimed(
            stores.clone(),
            scheduler.clone(),
            config.clone(),
            problem,
            pending,
            remaining,
        ));
        match task.await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(session_id = %session.id, error = %e, "Judging task failed");
                Self::release(stores, session.id, None).await;
                Err(AppError::Internal(anyhow::anyhow!("judging task failed: {}", e)))
            }
        }
    }

    /// Everything after the claim: record, judge, publish or roll back
    async fn judge_claimed(
        stores: Stores,
        scheduler: Scheduler,
        config: JudgeConfig,
        problem: Arc<Problem>,
        pending: Submission,
        remaining: Duration,
    ) -> AppResult<SubmissionRecord> {
        let session_id = pending.session_id;
        let submission = match stores.submissions.create(pending).await {
            Ok(submission) => submission,
            Err(e) => {
                Self::release(&stores, session_id, None).await;
                return Err(e);
            }
        };

        tracing::info!(
            submission_id = %submission.id,
            session_id = %session_id,
            language = %submission.language,
            "Judging submission"
        );

        match Self::judge(&stores, &scheduler, &config, &problem, &submission, remaining).await {
            Ok(record) => Ok(record),
            Err(e) => {
                tracing::error!(submission_id = %submission.id, error = %e, "Judging failed");
                let judgement = Judgement::internal_error("the submission could not be judged");
                if let Err(err) = stores.submissions.finalize(submission.id, judgement).await {
                    tracing::warn!(
                        submission_id = %submission.id,
                        error = %err,
                        "Failed to finalize submission"
                    );
                }
                Self::release(&stores, session_id, Some(submission.id)).await;
                metrics::record_submission("internal_error");
                Err(e)
            }
        }
    }

    async fn judge(
        stores: &Stores,
        scheduler: &Scheduler,
        config: &JudgeConfig,
        problem: &Arc<Problem>,
        submission: &Submission,
        remaining: Duration,
    ) -> AppResult<SubmissionRecord> {
        stores.submissions.mark_running(submission.id).await?;

        let (handle, signal) = cancellation();
        let expiry = config.cancel_on_expiry.then(|| {
            let handle = handle.clone();
            tokio::spawn(async move {
                tokio::time::sleep(remaining).await;
                tracing::info!("Exam time expired, cancelling evaluation");
                handle.cancel();
            })
        });

        let request = EvaluationRequest {
            code: submission.source_code.clone(),
            language: submission.language.clone(),
            entry_point: problem.entry_point.clone(),
            test_cases: problem.test_cases.clone(),
            limits: problem.limits(),
        };
        let evaluation = scheduler.evaluate(request, signal).await;
        if let Some(expiry) = expiry {
            expiry.abort();
        }
        drop(handle);

        let judgement = judge::aggregate(submission.id, &problem.test_cases, evaluation?);
        let status = judgement.status;
        let score = judgement.score;
        let max_time_ms = judgement.max_time_ms;

        let record = stores.submissions.finalize(submission.id, judgement).await?;
        stores.problems.record_outcome(problem.id, status.is_accepted()).await?;
        stores
            .sessions
            .finish_submit(submission.session_id, submission.id, score, Utc::now())
            .await?;

        metrics::record_submission(status.as_str());
        tracing::info!(
            submission_id = %submission.id,
            status = %status,
            score,
            max_time_ms,
            "Submission judged"
        );
        Ok(record)
    }

    async fn release(stores: &Stores, session_id: Uuid, submission_id: Option<Uuid>) {
        if let Err(e) = stores.sessions.abort_submit(session_id, submission_id).await {
            tracing::warn!(
                session_id = %session_id,
                error = %e,
                "Failed to release session claim"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ResubmissionPolicy;
    use crate::db::repositories::{ProblemRepository, SessionRepository, SubmissionRepository};
    use crate::db::MockProblemStore;
    use crate::judge::testing::{ScriptRunner, sandbox_config, script_case};
    use crate::judge::{RunnerRegistry, Sandbox};
    use crate::models::{EntryPoint, SessionState, SubmissionStatus, TestCase};

    struct Fixture {
        stores: Stores,
        scheduler: Scheduler,
        problem_id: Uuid,
        _root: tempfile::TempDir,
    }

    impl Fixture {
        async fn start(&self) -> ExamSession {
            SessionService::start_exam(&self.stores, self.problem_id, None, None)
                .await
                .unwrap()
        }

        async fn submit(
            &self,
            config: &JudgeConfig,
            session_id: Uuid,
            code: &str,
            language: &str,
        ) -> AppResult<SubmissionRecord> {
            let (stores, scheduler) = (&self.stores, &self.scheduler);
            SessionService::submit(stores, scheduler, config, session_id, code, language).await
        }
    }

    fn problem(test_cases: Vec<TestCase>, exam_duration_secs: u64) -> Problem {
        let mut problem = Problem {
            id: Uuid::new_v4(),
            title: "Script".to_string(),
            description: String::new(),
            entry_point: EntryPoint::new("solve"),
            time_limit_ms: 2000,
            memory_limit_mb: 256,
            exam_duration_secs,
            float_tolerance: None,
            initial_code: Default::default(),
            test_cases,
        };
        problem.normalize().unwrap();
        problem
    }

    fn fixture(problem: Problem) -> Fixture {
        let root = tempfile::tempdir().unwrap();
        let mut registry = RunnerRegistry::new();
        registry.register(Arc::new(ScriptRunner));
        let sandbox = Sandbox::new(sandbox_config(root.path()));
        let problem_id = problem.id;
        Fixture {
            stores: Stores::in_memory(ProblemRepository::from_problems(vec![problem]).unwrap()),
            scheduler: Scheduler::new(
                Arc::new(registry),
                Arc::new(sandbox),
                2,
                Duration::from_secs(5),
            ),
            problem_id,
            _root: root,
        }
    }

    fn scored_cases() -> Vec<TestCase> {
        let mut first = script_case(1, "echo 5", 5);
        first.points = 10;
        let mut second = script_case(2, "echo 7", 8);
        second.points = 3;
        vec![first, second]
    }

    #[tokio::test]
    async fn test_submit_scores_and_closes_session() {
        let f = fixture(problem(scored_cases(), 300));
        let session = SessionService::start_exam(&f.stores, f.problem_id, Some("u1".into()), None)
            .await
            .unwrap();

        let config = JudgeConfig::default();
        let record = f.submit(&config, session.id, "code", "sh").await.unwrap();

        assert_eq!(record.status, SubmissionStatus::WrongAnswer);
        assert_eq!(record.score, 10);
        assert_eq!(record.results.len(), 2);
        assert!(record.results[0].passed);

        let session = SessionService::get_session(&f.stores, session.id).await.unwrap();
        assert_eq!(session.state, SessionState::Submitted);
        assert_eq!(session.score, Some(10));

        let stats = f.stores.problems.statistics(f.problem_id).await.unwrap();
        assert_eq!(stats.total_submissions, 1);
        assert_eq!(stats.successful_submissions, 0);

        let stored = f.stores.submissions.get(record.id).await.unwrap().unwrap();
        assert_eq!(stored.status, SubmissionStatus::WrongAnswer);
    }

    #[tokio::test]
    async fn test_second_submit_is_rejected() {
        let f = fixture(problem(scored_cases(), 300));
        let session = f.start().await;
        let config = JudgeConfig::default();

        f.submit(&config, session.id, "code", "script").await.unwrap();
        let err = f.submit(&config, session.id, "code", "script").await.unwrap_err();
        assert!(matches!(err, AppError::SessionAlreadyTerminal(_)));

        let stats = f.stores.problems.statistics(f.problem_id).await.unwrap();
        assert_eq!(stats.total_submissions, 1);
    }

    #[tokio::test]
    async fn test_overwrite_policy_keeps_latest_score() {
        let f = fixture(problem(scored_cases(), 300));
        let session = f.start().await;
        let config = JudgeConfig {
            resubmission: ResubmissionPolicy::Overwrite,
            ..JudgeConfig::default()
        };

        f.submit(&config, session.id, "code", "script").await.unwrap();
        f.submit(&config, session.id, "code", "script").await.unwrap();

        let session = SessionService::get_session(&f.stores, session.id).await.unwrap();
        assert_eq!(session.submission_ids.len(), 2);
    }

    #[tokio::test]
    async fn test_client_errors_create_no_submission() {
        let f = fixture(problem(scored_cases(), 300));
        let session = f.start().await;
        let config = JudgeConfig::default();

        let blank = f.submit(&config, session.id, "  \n", "script").await;
        assert!(matches!(blank, Err(AppError::CodeRequired)));

        let unknown = f.submit(&config, session.id, "code", "cobol").await;
        assert!(matches!(unknown, Err(AppError::UnsupportedLanguage(_))));

        let missing = f.submit(&config, Uuid::new_v4(), "code", "script").await;
        assert!(matches!(missing, Err(AppError::SessionNotFound)));

        let session = SessionService::get_session(&f.stores, session.id).await.unwrap();
        assert_eq!(session.state, SessionState::Created);
        assert!(session.submission_ids.is_empty());
    }

    #[tokio::test]
    async fn test_compilation_error_finishes_session_with_zero() {
        let f = fixture(problem(scored_cases(), 300));
        let session = f.start().await;

        let record = SessionService::submit(
            &f.stores,
            &f.scheduler,
            &JudgeConfig::default(),
            session.id,
            "syntax error",
            "script",
        )
        .await
        .unwrap();

        assert_eq!(record.status, SubmissionStatus::CompilationError);
        assert_eq!(record.score, 0);
        assert!(record.results.is_empty());
    }

    #[tokio::test]
    async fn test_expiry_cancels_running_evaluation() {
        let f = fixture(problem(vec![script_case(1, "sleep 30", 1)], 1));
        let session = f.start().await;
        let config = JudgeConfig::default();

        // Problem time limit is 2s, exam budget 1s: expiry wins
        let record = f.submit(&config, session.id, "code", "script").await.unwrap();
        assert_eq!(record.status, SubmissionStatus::TimeLimitExceeded);
        assert_eq!(
            record.results[0].error_kind,
            Some(crate::judge::TestErrorKind::Cancelled)
        );
    }

    #[tokio::test]
    async fn test_dropped_request_still_finishes_judging() {
        let f = fixture(problem(vec![script_case(1, "sleep 1; echo 1", 1)], 300));
        let session = f.start().await;
        let config = JudgeConfig::default();

        let submit = f.submit(&config, session.id, "code", "script");
        assert!(tokio::time::timeout(Duration::from_millis(300), submit).await.is_err());

        let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
        let session = loop {
            let current = SessionService::get_session(&f.stores, session.id).await.unwrap();
            if !current.judging || tokio::time::Instant::now() > deadline {
                break current;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        };
        assert!(!session.judging);
        assert_eq!(session.state, SessionState::Submitted);
        assert_eq!(session.score, Some(1));

        let record = f.stores.submissions.get(session.submission_ids[0]).await.unwrap().unwrap();
        assert_eq!(record.status, SubmissionStatus::Accepted);

        let retry = f.submit(&config, session.id, "code", "script").await;
        assert!(matches!(retry, Err(AppError::SessionAlreadyTerminal(_))));
    }

    #[tokio::test]
    async fn test_store_failure_finalizes_as_internal_error() {
        let problem = Arc::new(problem(scored_cases(), 300));
        let problem_id = problem.id;
        let mut problems = MockProblemStore::new();
        let returned = problem.clone();
        problems
            .expect_get()
            .returning(move |_| Ok(Some(returned.clone())));
        problems
            .expect_record_outcome()
            .returning(|_, _| {
                Err(AppError::Internal(anyhow::anyhow!("counter store unavailable")))
            });

        let stores = Stores {
            problems: Arc::new(problems),
            sessions: Arc::new(SessionRepository::new()),
            submissions: Arc::new(SubmissionRepository::new()),
        };
        let f = fixture(problem.as_ref().clone());
        let session = SessionService::start_exam(&stores, problem_id, None, None).await.unwrap();

        let config = JudgeConfig::default();
        let err = SessionService::submit(&stores, &f.scheduler, &config, session.id, "code", "sh")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Internal(_)));

        let session = SessionService::get_session(&stores, session.id).await.unwrap();
        assert!(!session.judging);
        assert_eq!(session.submission_ids.len(), 1);

        let record = stores.submissions.get(session.submission_ids[0]).await.unwrap().unwrap();
        assert!(record.status.is_final());
    }

    fn python_available() -> bool {
        std::process::Command::new("python3")
            .arg("--version")
            .output()
            .is_ok_and(|o| o.status.success())
    }

    fn python_scheduler(root: &std::path::Path) -> Scheduler {
        let registry = RunnerRegistry::with_defaults(&crate::config::RuntimeConfig::default());
        let sandbox = Sandbox::new(sandbox_config(root));
        Scheduler::new(Arc::new(registry), Arc::new(sandbox), 2, Duration::from_secs(10))
    }

    fn python_fixture(problem: Problem) -> Fixture {
        let root = tempfile::tempdir().unwrap();
        let problem_id = problem.id;
        Fixture {
            stores: Stores::in_memory(ProblemRepository::from_problems(vec![problem]).unwrap()),
            scheduler: python_scheduler(root.path()),
            problem_id,
            _root: root,
        }
    }

    fn sum_case() -> TestCase {
        TestCase {
            input: serde_json::json!([1000000, 2345678]),
            expected_output: serde_json::json!(3345678),
            points: 5,
            ..script_case(1, "", 0)
        }
    }

    #[tokio::test]
    async fn test_python_submission_against_bundled_catalogue() {
        if !python_available() {
            return;
        }

        let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("data/problems.json");
        let root = tempfile::tempdir().unwrap();
        let stores = Stores::in_memory(ProblemRepository::load_from_file(&path).unwrap());
        let scheduler = python_scheduler(root.path());

        let problem_id = Uuid::parse_str("6f1c2a9e-3b7d-4c51-9a0e-2d4f8b6c1a01").unwrap();
        let session = SessionService::start_exam(&stores, problem_id, None, None).await.unwrap();
        let record = SessionService::submit(
            &stores,
            &scheduler,
            &JudgeConfig::default(),
            session.id,
            "def solve(a, b):\n    return a + b\n",
            "py",
        )
        .await
        .unwrap();

        assert_eq!(record.status, SubmissionStatus::Accepted);
        assert_eq!(record.score, 20);
        assert_eq!(record.results.len(), 3);
    }

    #[tokio::test]
    async fn test_python_wrong_answer_earns_nothing() {
        if !python_available() {
            return;
        }
        let f = python_fixture(problem(vec![sum_case()], 300));
        let session = f.start().await;

        let record = SessionService::submit(
            &f.stores,
            &f.scheduler,
            &JudgeConfig::default(),
            session.id,
            "def solve(a, b):\n    return a - b\n",
            "python",
        )
        .await
        .unwrap();

        assert_eq!(record.status, SubmissionStatus::WrongAnswer);
        assert_eq!(record.score, 0);
        assert_eq!(record.results.len(), 1);
        assert!(!record.results[0].passed);
        assert_eq!(record.results[0].points_earned, 0);
        assert_eq!(record.results[0].actual, Some(serde_json::json!(-1345678)));

        let session = SessionService::get_session(&f.stores, session.id).await.unwrap();
        assert_eq!(session.score, Some(0));
    }

    #[tokio::test]
    async fn test_python_syntax_error_stores_no_results() {
        if !python_available() {
            return;
        }
        let f = python_fixture(problem(vec![sum_case()], 300));
        let session = f.start().await;

        let record = SessionService::submit(
            &f.stores,
            &f.scheduler,
            &JudgeConfig::default(),
            session.id,
            "def solve(a, b)\n    return a + b\n",
            "python",
        )
        .await
        .unwrap();

        assert_eq!(record.status, SubmissionStatus::CompilationError);
        assert_eq!(record.score, 0);
        assert!(record.error_message.as_deref().is_some_and(|m| m.contains("SyntaxError")));

        let stored = f.stores.submissions.get(record.id).await.unwrap().unwrap();
        assert!(stored.results.is_empty());
        let session = SessionService::get_session(&f.stores, session.id).await.unwrap();
        assert_eq!(session.state, SessionState::Submitted);
        assert_eq!(session.score, Some(0));
    }
}
