//! Pre-submit runs
//!
//! Evaluates code against a problem's visible test cases and returns the
//! feedback without recording anything.

use uuid::Uuid;

use crate::{
    db::Stores,
    error::{AppError, AppResult},
    handlers::problems::response::RunResponse,
    judge::{self, CancelSignal, EvaluationRequest, Scheduler},
};

/// Run service for business logic
pub struct RunService;

impl RunService {
    /// Evaluate code against the non-hidden test cases of a problem
    pub async fn run(
        stores: &Stores,
        scheduler: &Scheduler,
        max_source_bytes: usize,
        problem_id: Uuid,
        code: &str,
        language: &str,
    ) -> AppResult<RunResponse> {
        if code.trim().is_empty() {
            return Err(AppError::CodeRequired);
        }
        if code.len() > max_source_bytes {
            return Err(AppError::Validation(format!(
                "code exceeds {} bytes",
                max_source_bytes
            )));
        }

        let problem = stores
            .problems
            .get(problem_id)
            .await?
            .ok_or(AppError::ProblemNotFound)?;
        let test_cases = problem.visible_test_cases();

        let request = EvaluationRequest {
            code: code.to_string(),
            language: language.to_string(),
            entry_point: problem.entry_point.clone(),
            test_cases: test_cases.clone(),
            limits: problem.limits(),
        };
        let evaluation = scheduler.evaluate(request, CancelSignal::never()).await?;
        let judgement = judge::aggregate(Uuid::nil(), &test_cases, evaluation);

        tracing::debug!(
            problem_id = %problem.id,
            language,
            status = %judgement.status,
            "Pre-submit run finished"
        );

        Ok(RunResponse {
            status: judgement.status,
            score: judgement.score,
            max_score: test_cases.iter().map(|tc| tc.points).sum(),
            error_message: judgement.error_message,
            results: judgement.results,
        })
    }
}
