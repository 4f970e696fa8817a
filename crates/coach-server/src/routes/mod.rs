pub mod challenges;
pub mod chat;
pub mod conversations;
pub mod memory;
pub mod projects;
pub mod prompts;
pub mod topics;

use crate::error::AppError;

/// A trimmed, non-empty string field, or a 400 with `message`.
pub(crate) fn required(value: Option<String>, message: &str) -> Result<String, AppError> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::bad_request(message))
}
