//! Custom error types and handling
//!
//! This module defines the application's error types and implements
//! conversion to HTTP responses for the Axum framework.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::judge::JudgeError;
use crate::models::session::SessionError;

/// Application-wide error type
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    // Resource errors
    #[error("Session not found")]
    SessionNotFound,

    #[error("Problem not found")]
    ProblemNotFound,

    #[error("Submission not found")]
    SubmissionNotFound,

    // Session lifecycle errors
    #[error("Session is already {0}")]
    SessionAlreadyTerminal(String),

    #[error("A submission for this session is already being judged")]
    SubmissionInProgress,

    // Submission errors
    #[error("Code is required")]
    CodeRequired,

    #[error("Unsupported language: {0}")]
    UnsupportedLanguage(String),

    #[error("Problem has no test cases")]
    NoTestCases,

    // Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    // Internal errors
    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetails,
}

/// Error details in response
#[derive(Debug, Serialize)]
pub struct ErrorDetails {
    pub code: String,
    pub message: String,
}

impl AppError {
    /// Get the error code for this error type
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::SessionNotFound => "SESSION_NOT_FOUND",
            Self::ProblemNotFound => "PROBLEM_NOT_FOUND",
            Self::SubmissionNotFound => "SUBMISSION_NOT_FOUND",
            Self::SessionAlreadyTerminal(_) => "SESSION_ALREADY_TERMINAL",
            Self::SubmissionInProgress => "SUBMISSION_IN_PROGRESS",
            Self::CodeRequired => "CODE_REQUIRED",
            Self::UnsupportedLanguage(_) => "UNSUPPORTED_LANGUAGE",
            Self::NoTestCases => "NO_TEST_CASES",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::SessionNotFound | Self::ProblemNotFound | Self::SubmissionNotFound => {
                StatusCode::NOT_FOUND
            }
            Self::SessionAlreadyTerminal(_) | Self::SubmissionInProgress => StatusCode::CONFLICT,
            Self::CodeRequired | Self::UnsupportedLanguage(_) | Self::Validation(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::NoTestCases => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Log internal errors but don't expose details to clients
        let message = match &self {
            AppError::Internal(e) => {
                tracing::error!("Internal error: {:?}", e);
                "An internal error occurred".to_string()
            }
            _ => self.to_string(),
        };

        let body = ErrorResponse {
            error: ErrorDetails {
                code: self.error_code().to_string(),
                message,
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<JudgeError> for AppError {
    fn from(err: JudgeError) -> Self {
        match err {
            JudgeError::UnsupportedLanguage(language) => AppError::UnsupportedLanguage(language),
            JudgeError::NoTestCases => AppError::NoTestCases,
        }
    }
}

impl From<SessionError> for AppError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::AlreadyTerminal(state) => {
                AppError::SessionAlreadyTerminal(state.to_string())
            }
            SessionError::Expired => AppError::SessionAlreadyTerminal("expired".to_string()),
            SessionError::SubmissionInProgress => AppError::SubmissionInProgress,
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::Validation(err.to_string())
    }
}

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::session::SessionState;

    #[test]
    fn test_error_codes_and_statuses() {
        assert_eq!(AppError::SessionNotFound.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(AppError::CodeRequired.error_code(), "CODE_REQUIRED");
        assert_eq!(AppError::NoTestCases.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(
            AppError::UnsupportedLanguage("cobol".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_session_errors_map_to_terminal() {
        let err: AppError = SessionError::Expired.into();
        assert_eq!(err.error_code(), "SESSION_ALREADY_TERMINAL");

        let err: AppError = SessionError::AlreadyTerminal(SessionState::Submitted).into();
        assert_eq!(err.to_string(), "Session is already submitted");

        let err: AppError = SessionError::SubmissionInProgress.into();
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
    }
}
