//! Problem repository
//!
//! The catalogue is loaded once at startup and never changes; only the
//! per-problem submission counters move, and those are atomics.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde::Deserialize;
use uuid::Uuid;

use crate::db::ProblemStore;
use crate::error::{AppError, AppResult};
use crate::models::{Problem, ProblemError, ProblemStatistics};

/// Problem catalogue file layout
#[derive(Debug, Deserialize)]
struct Catalogue {
    problems: Vec<Problem>,
}

/// Catalogue loading errors
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse problem catalogue: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid problem '{title}': {source}")]
    Invalid { title: String, source: ProblemError },

    #[error("duplicate problem id {0}")]
    DuplicateId(Uuid),
}

#[derive(Debug, Default)]
struct Counters {
    total: AtomicU64,
    successful: AtomicU64,
}

/// In-memory problem store
#[derive(Debug, Default)]
pub struct ProblemRepository {
    problems: HashMap<Uuid, Arc<Problem>>,
    counters: HashMap<Uuid, Counters>,
}

impl ProblemRepository {
    /// Build the repository, validating every problem
    pub fn from_problems(problems: Vec<Problem>) -> Result<Self, CatalogError> {
        let mut repo = Self::default();
        for mut problem in problems {
            problem.normalize().map_err(|source| CatalogError::Invalid {
                title: problem.title.clone(),
                source,
            })?;
            if repo.problems.contains_key(&problem.id) {
                return Err(CatalogError::DuplicateId(problem.id));
            }
            repo.counters.insert(problem.id, Counters::default());
            repo.problems.insert(problem.id, Arc::new(problem));
        }
        Ok(repo)
    }

    /// Load a JSON catalogue of the form `{"problems": [...]}`
    pub fn load_from_file(path: &Path) -> Result<Self, CatalogError> {
        let text = std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let catalogue: Catalogue = serde_json::from_str(&text)?;
        let repo = Self::from_problems(catalogue.problems)?;
        tracing::info!("Loaded {} problems from {:?}", repo.problems.len(), path);
        Ok(repo)
    }

    pub fn len(&self) -> usize {
        self.problems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.problems.is_empty()
    }
}

#[async_trait]
impl ProblemStore for ProblemRepository {
    async fn get(&self, id: Uuid) -> AppResult<Option<Arc<Problem>>> {
        Ok(self.problems.get(&id).cloned())
    }

    async fn list(&self) -> AppResult<Vec<Arc<Problem>>> {
        let mut problems: Vec<_> = self.problems.values().cloned().collect();
        problems.sort_by(|a, b| a.title.cmp(&b.title));
        Ok(problems)
    }

    async fn statistics(&self, id: Uuid) -> AppResult<ProblemStatistics> {
        let counters = self.counters.get(&id).ok_or(AppError::ProblemNotFound)?;
        Ok(ProblemStatistics::new(
            counters.total.load(Ordering::Relaxed),
            counters.successful.load(Ordering::Relaxed),
        ))
    }

    async fn record_outcome(&self, id: Uuid, accepted: bool) -> AppResult<()> {
        let counters = self.counters.get(&id).ok_or(AppError::ProblemNotFound)?;
        counters.total.fetch_add(1, Ordering::Relaxed);
        if accepted {
            counters.successful.fetch_add(1, Ordering::Relaxed);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn problem(title: &str) -> Problem {
        serde_json::from_value(json!({
            "title": title,
            "entry_point": {"name": "solve"},
            "test_cases": [{"input": [1], "expected_output": 1, "order": 1}]
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_concurrent_outcomes_are_counted() {
        let p = problem("Echo");
        let id = p.id;
        let repo = Arc::new(ProblemRepository::from_problems(vec![p]).unwrap());

        let mut tasks = Vec::new();
        for i in 0..50 {
            let repo = repo.clone();
            tasks.push(tokio::spawn(async move { repo.record_outcome(id, i % 5 == 0).await }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let stats = repo.statistics(id).await.unwrap();
        assert_eq!(stats.total_submissions, 50);
        assert_eq!(stats.successful_submissions, 10);
        assert_eq!(stats.acceptance_rate, 20.0);
    }

    #[test]
    fn test_invalid_problem_is_rejected() {
        let mut p = problem("Bad");
        p.entry_point.name = "not valid".to_string();
        assert!(matches!(
            ProblemRepository::from_problems(vec![p]),
            Err(CatalogError::Invalid { .. })
        ));
    }

    #[test]
    fn test_duplicate_ids_are_rejected() {
        let a = problem("A");
        let mut b = problem("B");
        b.id = a.id;
        assert!(matches!(
            ProblemRepository::from_problems(vec![a, b]),
            Err(CatalogError::DuplicateId(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("problems.json");
        std::fs::write(
            &path,
            json!({"problems": [problem("One"), problem("Two")]}).to_string(),
        )
        .unwrap();

        let repo = ProblemRepository::load_from_file(&path).unwrap();
        assert_eq!(repo.len(), 2);

        let missing = ProblemRepository::load_from_file(&dir.path().join("absent.json"));
        assert!(matches!(missing, Err(CatalogError::Io { .. })));
    }

    #[test]
    fn test_bundled_catalogue_is_valid() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("data/problems.json");
        let repo = ProblemRepository::load_from_file(&path).unwrap();
        assert!(!repo.is_empty());
    }
}
