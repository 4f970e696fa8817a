use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;

use crate::error::{parse_uuid, AppError};
use crate::routes::required;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct TopicQuery {
    #[serde(default)]
    pub project_id: Option<String>,
}

#[derive(Deserialize)]
pub struct CreateTopicBody {
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Deserialize)]
pub struct RenameTopicBody {
    #[serde(default)]
    pub name: Option<String>,
}

/// GET /api/topics — optionally filtered by `?project_id=`.
pub async fn list_topics(
    State(app): State<AppState>,
    Query(q): Query<TopicQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let project_id = match q.project_id.as_deref().filter(|p| !p.is_empty()) {
        Some(raw) => Some(parse_uuid("project_id", raw)?),
        None => None,
    };
    let topics = app.store.list_topics(project_id).await?;
    Ok(Json(serde_json::json!(topics)))
}

/// POST /api/topics
pub async fn create_topic(
    State(app): State<AppState>,
    Json(body): Json<CreateTopicBody>,
) -> Result<Json<serde_json::Value>, AppError> {
    let project_id = required(body.project_id, "Project ID is required")?;
    let name = required(body.name, "Topic name is required")?;
    let project_id = parse_uuid("project_id", &project_id)?;
    let topic = app.store.create_topic(project_id, &name).await?;
    Ok(Json(serde_json::json!(topic)))
}

/// PATCH /api/topics/{id}
pub async fn rename_topic(
    State(app): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<RenameTopicBody>,
) -> Result<Json<serde_json::Value>, AppError> {
    let id = parse_uuid("topic id", &id)?;
    let name = required(body.name, "Topic name is required")?;
    let topic = app.store.rename_topic(id, &name).await?;
    Ok(Json(serde_json::json!(topic)))
}

/// DELETE /api/topics/{id} — conversations under the topic are kept, unassigned.
pub async fn delete_topic(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let id = parse_uuid("topic id", &id)?;
    app.store.delete_topic(id).await?;
    Ok(Json(serde_json::json!({ "success": true })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::test_support;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;

    #[tokio::test]
    async fn create_validates_fields() {
        let app = test_support::app();
        let err = create_topic(
            State(app.clone()),
            Json(CreateTopicBody {
                project_id: None,
                name: Some("Pricing".into()),
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);

        let err = create_topic(
            State(app),
            Json(CreateTopicBody {
                project_id: Some(uuid::Uuid::new_v4().to_string()),
                name: None,
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn list_filters_by_project() {
        let app = test_support::app();
        let a = app.store.create_project("a").await.unwrap();
        let b = app.store.create_project("b").await.unwrap();
        app.store.create_topic(a.id, "Pricing").await.unwrap();
        app.store.create_topic(b.id, "Hiring").await.unwrap();

        let all = list_topics(State(app.clone()), Query(TopicQuery { project_id: None }))
            .await
            .unwrap();
        assert_eq!(all.0.as_array().unwrap().len(), 2);

        let only_a = list_topics(
            State(app),
            Query(TopicQuery {
                project_id: Some(a.id.to_string()),
            }),
        )
        .await
        .unwrap();
        let arr = only_a.0.as_array().unwrap();
        assert_eq!(arr.len(), 1);
        assert_eq!(arr[0]["name"], "Pricing");
    }

    #[tokio::test]
    async fn topic_for_unknown_project_is_404() {
        let app = test_support::app();
        let err = create_topic(
            State(app),
            Json(CreateTopicBody {
                project_id: Some(uuid::Uuid::new_v4().to_string()),
                name: Some("Pricing".into()),
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
    }
}
