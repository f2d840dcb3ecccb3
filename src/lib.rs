//! ExamJudge - Coding Exam Judging Engine
//!
//! This library judges timed coding-exam submissions: the code is run
//! against a problem's test cases in a sandboxed child process, the results
//! are scored, and the exam session is closed with that score.
//!
//! # Features
//!
//! - Python and JavaScript runners behind one `Runner` trait
//! - Per-test harness generation with a tagged result line
//! - Process sandbox with deadlines, resource limits and cancellation
//! - Bounded worker pool with results in test-case order
//! - Timed exam sessions with a guarded submit transition
//!
//! # Architecture
//!
//! - **Handlers**: HTTP request handlers (thin layer)
//! - **Services**: Business logic
//! - **Judge**: Runners, sandbox, scheduler and scoring
//! - **Repositories**: In-memory stores behind async traits
//! - **Models**: Domain models

pub mod config;
pub mod constants;
pub mod db;
pub mod error;
pub mod handlers;
pub mod judge;
pub mod models;
pub mod services;
pub mod state;

// Re-export commonly used types
pub use config::Config;
pub use error::{AppError, AppResult};
pub use state::AppState;
