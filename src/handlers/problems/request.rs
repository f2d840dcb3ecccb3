//! Problem request DTOs

use serde::Deserialize;
use validator::Validate;

use crate::constants::{MAX_CODE_LENGTH, MAX_LANGUAGE_LENGTH, MAX_REFERENCE_LENGTH};

/// Start an exam session request
#[derive(Debug, Default, Deserialize, Validate)]
pub struct StartSessionRequest {
    #[validate(length(min = 1, max = MAX_REFERENCE_LENGTH))]
    pub user_id: Option<String>,

    #[validate(length(min = 1, max = MAX_REFERENCE_LENGTH))]
    pub contest_id: Option<String>,
}

/// Pre-submit run request
#[derive(Debug, Deserialize, Validate)]
pub struct RunCodeRequest {
    #[validate(length(max = MAX_CODE_LENGTH))]
    pub code: String,

    #[validate(length(min = 1, max = MAX_LANGUAGE_LENGTH))]
    pub language: String,
}
