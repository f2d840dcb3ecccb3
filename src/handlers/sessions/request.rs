//! Session request DTOs

use serde::Deserialize;
use validator::Validate;

use crate::constants::{MAX_CODE_LENGTH, MAX_LANGUAGE_LENGTH};

/// Submit a solution for the session's problem
#[derive(Debug, Deserialize, Validate)]
pub struct SubmitRequest {
    /// Blank code is rejected by the service as `CODE_REQUIRED`
    #[validate(length(max = MAX_CODE_LENGTH))]
    pub code: String,

    #[validate(length(min = 1, max = MAX_LANGUAGE_LENGTH))]
    pub language: String,
}
