use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use coach_core::CoachError;

use crate::store::StoreError;

// ---------------------------------------------------------------------------
// Sentinels for explicit statuses
// ---------------------------------------------------------------------------

/// Carries an explicit HTTP 400 through the `anyhow::Error` chain.
#[derive(Debug)]
struct BadRequestError(String);

impl std::fmt::Display for BadRequestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for BadRequestError {}

/// Carries an explicit HTTP 404 through the `anyhow::Error` chain.
#[derive(Debug)]
struct NotFoundError(String);

impl std::fmt::Display for NotFoundError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for NotFoundError {}

// ---------------------------------------------------------------------------
// AppError
// ---------------------------------------------------------------------------

/// Unified error type for HTTP responses. The body is always
/// `{"error": "<message>"}`.
#[derive(Debug)]
pub struct AppError(pub anyhow::Error);

impl AppError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self(BadRequestError(msg.into()).into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self(NotFoundError(msg.into()).into())
    }

    fn status(&self) -> StatusCode {
        if self.0.downcast_ref::<BadRequestError>().is_some() {
            return StatusCode::BAD_REQUEST;
        }
        if self.0.downcast_ref::<NotFoundError>().is_some() {
            return StatusCode::NOT_FOUND;
        }
        if let Some(e) = self.0.downcast_ref::<StoreError>() {
            return match e {
                StoreError::NotFound { .. } => StatusCode::NOT_FOUND,
                StoreError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            };
        }
        if let Some(e) = self.0.downcast_ref::<CoachError>() {
            return match e {
                CoachError::QuestionNotFound(_) => StatusCode::NOT_FOUND,
                CoachError::MalformedTag { .. }
                | CoachError::UnknownMemoryPath(_)
                | CoachError::InvalidStage(_)
                | CoachError::InvalidPhase(_)
                | CoachError::InvalidCapability(_)
                | CoachError::InvalidDocumentType(_) => StatusCode::BAD_REQUEST,
                CoachError::Io(_) | CoachError::Yaml(_) | CoachError::Json(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            };
        }
        StatusCode::INTERNAL_SERVER_ERROR
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %format!("{:#}", self.0), "request failed");
        }
        let body = serde_json::json!({ "error": self.0.to_string() });
        (status, axum::Json(body)).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

/// Parse a path or body id, answering 400 when it is not a UUID.
pub fn parse_uuid(field: &str, raw: &str) -> Result<uuid::Uuid, AppError> {
    uuid::Uuid::parse_str(raw.trim())
        .map_err(|_| AppError::bad_request(format!("invalid {field}: '{raw}'")))
}
