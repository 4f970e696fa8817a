use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Deserialize, Default)]
pub struct CompleteQuestionBody {
    #[serde(default)]
    pub answer: Option<String>,
}

/// GET /api/memory/{project_id} — memory and backlog, shared by every
/// conversation of the project.
pub async fn get_memory(
    State(app): State<AppState>,
    Path(project_id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let session = app.sessions.load_or_create(&project_id).await?;
    tracing::debug!(
        %project_id,
        gaps = session.memory.gaps().len(),
        "memory retrieved"
    );
    Ok(Json(serde_json::json!({
        "memory": session.memory,
        "questions": session.questions,
    })))
}

/// POST /api/memory/{project_id}/questions/{question_id}/complete
pub async fn complete_question(
    State(app): State<AppState>,
    Path((project_id, question_id)): Path<(String, String)>,
    body: Option<Json<CompleteQuestionBody>>,
) -> Result<Json<serde_json::Value>, AppError> {
    let answer = body
        .and_then(|Json(b)| b.answer)
        .filter(|a| !a.trim().is_empty());
    let session = app
        .sessions
        .complete_question(&project_id, &question_id, answer)
        .await?;
    Ok(Json(serde_json::json!({
        "success": true,
        "questions": session.questions,
    })))
}
