//! Business logic services

pub mod problem_service;
pub mod run_service;
pub mod session_service;

pub use problem_service::ProblemService;
pub use run_service::RunService;
pub use session_service::SessionService;
