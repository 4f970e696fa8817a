use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;

use crate::error::{parse_uuid, AppError};
use crate::routes::required;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct ProjectBody {
    #[serde(default)]
    pub name: Option<String>,
}

/// GET /api/projects — every project, newest first.
pub async fn list_projects(
    State(app): State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    let projects = app.store.list_projects().await?;
    Ok(Json(serde_json::json!(projects)))
}

/// POST /api/projects — create a project.
pub async fn create_project(
    State(app): State<AppState>,
    Json(body): Json<ProjectBody>,
) -> Result<Json<serde_json::Value>, AppError> {
    let name = required(body.name, "Project name is required")?;
    let project = app.store.create_project(&name).await?;
    tracing::info!(id = %project.id, name = %project.name, "project created");
    Ok(Json(serde_json::json!(project)))
}

/// PATCH /api/projects/{id} — rename.
pub async fn rename_project(
    State(app): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<ProjectBody>,
) -> Result<Json<serde_json::Value>, AppError> {
    let id = parse_uuid("project id", &id)?;
    let name = required(body.name, "Project name is required")?;
    let project = app.store.rename_project(id, &name).await?;
    Ok(Json(serde_json::json!(project)))
}

/// DELETE /api/projects/{id} — delete with its conversations, topics and challenges.
pub async fn delete_project(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let id = parse_uuid("project id", &id)?;
    app.store.delete_project(id).await?;
    tracing::info!(%id, "project deleted");
    Ok(Json(serde_json::json!({ "success": true })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::test_support;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;

    #[tokio::test]
    async fn create_requires_name() {
        let app = test_support::app();
        let err = create_project(State(app), Json(ProjectBody { name: Some("  ".into()) }))
            .await
            .unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn create_rename_delete() {
        let app = test_support::app();
        let created = create_project(
            State(app.clone()),
            Json(ProjectBody {
                name: Some("Bakery".into()),
            }),
        )
        .await
        .unwrap();
        let id = created.0["id"].as_str().unwrap().to_string();

        let renamed = rename_project(
            State(app.clone()),
            Path(id.clone()),
            Json(ProjectBody {
                name: Some("Boulangerie".into()),
            }),
        )
        .await
        .unwrap();
        assert_eq!(renamed.0["name"], "Boulangerie");

        let deleted = delete_project(State(app.clone()), Path(id.clone()))
            .await
            .unwrap();
        assert_eq!(deleted.0["success"], true);

        let err = delete_project(State(app), Path(id)).await.unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn malformed_id_is_bad_request() {
        let app = test_support::app();
        let err = delete_project(State(app), Path("abc".into()))
            .await
            .unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }
}
