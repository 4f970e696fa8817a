use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoachError {
    #[error("malformed <{tag}> tag: {reason}")]
    MalformedTag { tag: &'static str, reason: String },

    #[error("unknown memory path: {0}")]
    UnknownMemoryPath(String),

    #[error("invalid stage: {0}")]
    InvalidStage(String),

    #[error("invalid project phase: {0}")]
    InvalidPhase(String),

    #[error("invalid capability: {0}")]
    InvalidCapability(String),

    #[error("invalid documentType '{0}': must be one of action_plan, flash_diagnostic, other")]
    InvalidDocumentType(String),

    #[error("question not found: {0}")]
    QuestionNotFound(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl CoachError {
    pub(crate) fn malformed(tag: &'static str, reason: impl Into<String>) -> Self {
        CoachError::MalformedTag {
            tag,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CoachError>;
