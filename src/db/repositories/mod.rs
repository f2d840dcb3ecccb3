//! In-memory repositories
//!
//! Repositories implement the store traits used by the services.

pub mod problem_repo;
pub mod session_repo;
pub mod submission_repo;

pub use problem_repo::{CatalogError, ProblemRepository};
pub use session_repo::SessionRepository;
pub use submission_repo::SubmissionRepository;
