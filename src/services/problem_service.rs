//! Problem service

use uuid::Uuid;

use crate::{
    db::Stores,
    error::{AppError, AppResult},
    handlers::problems::response::{ProblemResponse, ProblemSummary},
};

/// Problem service for business logic
pub struct ProblemService;

impl ProblemService {
    /// Get the public view of a problem
    pub async fn get_problem(stores: &Stores, id: Uuid) -> AppResult<ProblemResponse> {
        let problem = stores
            .problems
            .get(id)
            .await?
            .ok_or(AppError::ProblemNotFound)?;
        let statistics = stores.problems.statistics(id).await?;

        Ok(ProblemResponse::new(&problem, statistics))
    }

    /// List all problems in the catalogue
    pub async fn list_problems(stores: &Stores) -> AppResult<Vec<ProblemSummary>> {
        let problems = stores.problems.list().await?;
        Ok(problems.iter().map(|p| ProblemSummary::from(p.as_ref())).collect())
    }
}
