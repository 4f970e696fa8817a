use axum::extract::{Path, Query, State};
use axum::Json;
use coach_core::types::DocumentType;
use serde::Deserialize;

use crate::error::{parse_uuid, AppError};
use crate::state::AppState;
use crate::store::NewChallenge;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeQuery {
    #[serde(default)]
    pub project_id: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct CreateChallengeBody {
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub document_type: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
}

/// GET /api/challenges?projectId= — a project's documents, newest first.
pub async fn list_challenges(
    State(app): State<AppState>,
    Query(q): Query<ChallengeQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let project_id = q
        .project_id
        .filter(|p| !p.trim().is_empty())
        .ok_or_else(|| AppError::bad_request("projectId is required"))?;
    let project_id = parse_uuid("projectId", &project_id)?;
    let challenges = app.store.list_challenges(project_id).await?;
    Ok(Json(serde_json::json!({ "challenges": challenges })))
}

/// POST /api/challenges — store a generated document for seven days.
pub async fn create_challenge(
    State(app): State<AppState>,
    Json(body): Json<CreateChallengeBody>,
) -> Result<Json<serde_json::Value>, AppError> {
    let present = |v: Option<String>| v.filter(|s| !s.trim().is_empty());
    let (Some(project_id), Some(document_type), Some(title), Some(content)) = (
        present(body.project_id),
        present(body.document_type),
        present(body.title),
        present(body.content),
    ) else {
        return Err(AppError::bad_request(
            "Missing required fields: projectId, documentType, title, content",
        ));
    };
    let document_type: DocumentType = document_type.parse()?;
    let project_id = parse_uuid("projectId", &project_id)?;

    let challenge = app
        .store
        .create_challenge(NewChallenge {
            project_id,
            document_type,
            title,
            content,
        })
        .await?;
    tracing::info!(id = %challenge.id, document_type = %challenge.document_type, "challenge created");
    Ok(Json(serde_json::json!({ "success": true, "challenge": challenge })))
}

/// POST /api/challenges/{id}/validate
pub async fn validate_challenge(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let id = parse_uuid("challenge id", &id)?;
    let challenge = app.store.validate_challenge(id).await?;
    Ok(Json(serde_json::json!({ "success": true, "challenge": challenge })))
}
