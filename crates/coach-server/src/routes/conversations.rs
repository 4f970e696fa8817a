use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::{parse_uuid, AppError};
use crate::routes::required;
use crate::state::AppState;
use crate::store::{ConversationLookup, Message, NewConversation};

const DEFAULT_NAME: &str = "New Conversation";

#[derive(Deserialize, Default)]
pub struct ConversationQuery {
    #[serde(default)]
    pub list: Option<String>,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Deserialize)]
pub struct CreateConversationBody {
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub topic_id: Option<String>,
}

#[derive(Deserialize)]
pub struct RenameConversationBody {
    #[serde(default)]
    pub name: Option<String>,
}

fn optional_uuid(field: &str, raw: Option<&str>) -> Result<Option<Uuid>, AppError> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        Some(raw) => parse_uuid(field, raw).map(Some),
        None => Ok(None),
    }
}

fn message_json(m: &Message) -> serde_json::Value {
    serde_json::json!({
        "id": m.id,
        "content": m.content,
        "text": m.content,
        "role": m.role,
        "created_at": m.created_at,
    })
}

/// GET /api/conversations
///
/// `?list=true&project_id=` lists a project's conversations for the sidebar.
/// Otherwise the query names one conversation (by id, latest of a project,
/// or session id) and its messages are returned in order.
pub async fn get_conversations(
    State(app): State<AppState>,
    Query(q): Query<ConversationQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let project_id = optional_uuid("project_id", q.project_id.as_deref())?;

    if q.list.as_deref() == Some("true") {
        if let Some(project_id) = project_id {
            let conversations = app.store.list_conversations(project_id).await?;
            return Ok(Json(serde_json::json!({ "conversations": conversations })));
        }
    }

    let lookup = ConversationLookup {
        id: optional_uuid("conversation_id", q.conversation_id.as_deref())?,
        project_id,
        session_id: q.session_id.filter(|s| !s.trim().is_empty()),
    };
    if lookup.is_empty() {
        return Err(AppError::bad_request(
            "conversation_id, project_id, or session_id is required",
        ));
    }

    let Some(conversation) = app.store.find_conversation(&lookup).await? else {
        return Ok(Json(serde_json::json!({ "messages": [] })));
    };
    let messages = app.store.list_messages(conversation.id).await?;
    Ok(Json(serde_json::json!({
        "conversation_id": conversation.id,
        "messages": messages.iter().map(message_json).collect::<Vec<_>>(),
    })))
}

/// POST /api/conversations
pub async fn create_conversation(
    State(app): State<AppState>,
    Json(body): Json<CreateConversationBody>,
) -> Result<Json<serde_json::Value>, AppError> {
    let project_id = required(body.project_id, "project_id is required")?;
    let project_id = parse_uuid("project_id", &project_id)?;
    let topic_id = optional_uuid("topic_id", body.topic_id.as_deref())?;
    let name = body
        .name
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| DEFAULT_NAME.to_string());

    let conversation = app
        .store
        .create_conversation(NewConversation {
            project_id,
            topic_id,
            name,
        })
        .await?;
    tracing::info!(
        id = %conversation.id,
        session_id = %conversation.session_id,
        "conversation created"
    );
    Ok(Json(serde_json::json!(conversation)))
}

/// PATCH /api/conversations/{id}
pub async fn rename_conversation(
    State(app): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<RenameConversationBody>,
) -> Result<Json<serde_json::Value>, AppError> {
    let id = parse_uuid("conversation id", &id)?;
    let name = required(body.name, "Conversation name is required")?;
    let conversation = app.store.rename_conversation(id, &name).await?;
    Ok(Json(serde_json::json!(conversation)))
}

/// DELETE /api/conversations/{id} — messages and workflow state go with it.
pub async fn delete_conversation(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let id = parse_uuid("conversation id", &id)?;
    app.store.delete_conversation(id).await?;
    Ok(Json(serde_json::json!({ "success": true })))
}

/// GET /api/conversations/{id}/state — where the conversation stands in the workflow.
pub async fn get_state(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let id = parse_uuid("conversation id", &id)?;
    if app.store.get_conversation(id).await?.is_none() {
        return Err(AppError::not_found(format!("conversation not found: {id}")));
    }
    let state = app.store.load_state(id).await?.unwrap_or_default();
    Ok(Json(serde_json::json!(state)))
}
