use std::convert::Infallible;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use claude_client::{ChatMessage, TextStream};
use coach_core::capability::{capability_prompt, should_trigger};
use coach_core::prompt::{render_stage_prompt, Directive, SystemPrompt};
use coach_core::tags::process_response;
use coach_core::types::CapabilityKind;
use coach_core::workflow::{parse_assistant_response, ConversationState};
use futures::StreamExt;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::{parse_uuid, AppError};
use crate::routes::required;
use crate::state::AppState;
use crate::store::{Conversation, MessageRole, NewChallenge};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryItem {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub is_user: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatBody {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub conversation_history: Vec<HistoryItem>,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub locale: Option<String>,
}

/// Everything the post-stream step needs once the reply is complete.
struct Turn {
    project_id: String,
    conversation: Option<Conversation>,
    state: ConversationState,
    capability: Option<CapabilityKind>,
}

/// POST /api/chat — one coaching turn, streamed as server-sent events.
///
/// Each chunk is `data: {"text": ...}`, the stream ends with `data: [DONE]`.
/// An upstream failure before the first chunk is an HTTP 500; a failure
/// after it is reported in-band as `data: {"error": ...}`.
pub async fn chat(
    State(app): State<AppState>,
    Json(body): Json<ChatBody>,
) -> Result<Response, AppError> {
    let message = required(body.message, "Message is required")?;
    let project_id = required(body.project_id, "projectId is required")?;
    info!(
        %project_id,
        conversation_id = body.conversation_id.as_deref().unwrap_or("-"),
        history = body.conversation_history.len(),
        "chat turn"
    );

    let conversation = match body.conversation_id.as_deref().filter(|c| !c.is_empty()) {
        Some(raw) => {
            let id = parse_uuid("conversationId", raw)?;
            let conversation = app
                .store
                .get_conversation(id)
                .await?
                .ok_or_else(|| AppError::not_found(format!("conversation not found: {id}")))?;
            Some(conversation)
        }
        None => None,
    };

    let session = app.sessions.load_or_create(&project_id).await?;
    let mut state = match &conversation {
        Some(c) => app.store.load_state(c.id).await?.unwrap_or_default(),
        None => ConversationState::default(),
    };
    state.sync_with_memory(&session.memory);

    let mut messages: Vec<ChatMessage> = if !body.conversation_history.is_empty() {
        body.conversation_history
            .iter()
            .filter(|m| !m.text.trim().is_empty())
            .map(|m| {
                if m.is_user {
                    ChatMessage::user(&m.text)
                } else {
                    ChatMessage::assistant(&m.text)
                }
            })
            .collect()
    } else if let Some(c) = &conversation {
        app.store
            .list_messages(c.id)
            .await?
            .into_iter()
            .map(|m| {
                if m.is_user() {
                    ChatMessage::user(m.content)
                } else {
                    ChatMessage::assistant(m.content)
                }
            })
            .collect()
    } else {
        Vec::new()
    };
    messages.push(ChatMessage::user(&message));

    if let Some(c) = &conversation {
        app.store.add_message(c.id, MessageRole::User, &message).await?;
    }

    let decision = should_trigger(&session.memory, &message);
    info!(capability = ?decision.capability, reason = %decision.reason, "capability decision");

    let directive = match decision.capability {
        Some(kind) => Directive::Capability {
            kind,
            prompt: capability_prompt(kind, &session.memory),
        },
        None => {
            let external = app.prompts.stage_prompt(state.current_stage).await;
            let stage_prompt = render_stage_prompt(&state, external.as_deref());
            if stage_prompt.used_fallback {
                warn!(stage = %state.current_stage, "using built-in stage prompt");
            }
            Directive::Stage {
                stage: state.current_stage,
                prompt: stage_prompt.prompt,
            }
        }
    };

    let base = app.prompts.base_prompt().await;
    let system = SystemPrompt::new(&session.memory, &session.questions)
        .base(base.as_deref())
        .knowledge(&app.knowledge)
        .directive(directive)
        .locale(body.locale.as_deref())
        .render();
    debug!(chars = system.len(), messages = messages.len(), "system prompt assembled");

    let mut stream = app.llm.stream(&system, messages);
    let first = match stream.next().await {
        Some(Err(e)) => {
            error!(error = %e, "LLM request failed");
            return Err(AppError(anyhow::anyhow!(
                "Error communicating with Claude: {e}"
            )));
        }
        other => other,
    };

    let turn = Turn {
        project_id,
        conversation,
        state,
        capability: decision.capability,
    };

    let (tx, rx) = mpsc::channel::<Result<Event, Infallible>>(32);
    tokio::spawn(forward(app, stream, first, tx, turn));

    Ok(Sse::new(ReceiverStream::new(rx))
        .keep_alive(KeepAlive::default())
        .into_response())
}

fn data_event(value: serde_json::Value) -> Result<Event, Infallible> {
    Ok(Event::default().data(value.to_string()))
}

/// Relay chunks to the client, then apply the reply to memory and state.
/// The sender is dropped only after processing, which closes the response.
async fn forward(
    app: AppState,
    mut stream: TextStream,
    first: Option<claude_client::Result<String>>,
    tx: mpsc::Sender<Result<Event, Infallible>>,
    turn: Turn,
) {
    let mut full = String::new();
    let mut next = first;
    loop {
        match next {
            Some(Ok(text)) => {
                full.push_str(&text);
                // A closed client does not stop the turn from being recorded.
                let _ = tx.send(data_event(serde_json::json!({ "text": text }))).await;
            }
            Some(Err(e)) => {
                error!(error = %e, "LLM stream failed mid-response");
                let _ = tx
                    .send(data_event(serde_json::json!({ "error": e.to_string() })))
                    .await;
                return;
            }
            None => break,
        }
        next = stream.next().await;
    }
    let _ = tx.send(Ok(Event::default().data("[DONE]"))).await;
    info!(chars = full.len(), "reply streamed");

    finish_turn(&app, turn, &full).await;
}

async fn finish_turn(app: &AppState, turn: Turn, full: &str) {
    let Turn {
        project_id,
        conversation,
        mut state,
        capability,
    } = turn;

    let clean = {
        let guard = app.sessions.lock(&project_id).await;
        let mut session = match app.sessions.load_or_create_locked(&guard, &project_id).await {
            Ok(session) => session,
            Err(e) => {
                error!(%project_id, error = %e, "failed to reload session");
                return;
            }
        };
        let outcome = process_response(&mut session, full, Utc::now().timestamp_millis());
        for e in &outcome.errors {
            warn!(%project_id, error = %e, "ignoring malformed tag");
        }
        if outcome.memory_updated || outcome.backlog_updated {
            match app.sessions.save(&session).await {
                Ok(()) => info!(
                    %project_id,
                    memory = outcome.memory_updated,
                    backlog = outcome.backlog_updated,
                    "session updated"
                ),
                Err(e) => error!(%project_id, error = %e, "failed to save session"),
            }
        }
        state.sync_with_memory(&session.memory);
        outcome.clean_response
    };

    if let Some(conversation) = &conversation {
        if capability.is_none() {
            let from = state.current_stage;
            state.advance(parse_assistant_response(full, from));
            if state.current_stage != from {
                info!(conversation_id = %conversation.id, %from, to = %state.current_stage, "stage advanced");
            }
            if let Err(e) = app.store.save_state(conversation.id, &state).await {
                error!(conversation_id = %conversation.id, error = %e, "failed to save state");
            }
        }
        if let Err(e) = app
            .store
            .add_message(conversation.id, MessageRole::Assistant, &clean)
            .await
        {
            error!(conversation_id = %conversation.id, error = %e, "failed to save reply");
        }
    }

    if let Some(kind) = capability {
        let Ok(project_uuid) = Uuid::parse_str(&project_id) else {
            warn!(%project_id, "project id is not a UUID, challenge not stored");
            return;
        };
        let challenge = NewChallenge {
            project_id: project_uuid,
            document_type: kind.document_type(),
            title: kind.title().to_string(),
            content: clean,
        };
        match app.store.create_challenge(challenge).await {
            Ok(c) => info!(id = %c.id, kind = %kind, "challenge stored"),
            Err(e) => error!(error = %e, "failed to store challenge"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::test_support;
    use axum::http::StatusCode;

    #[tokio::test]
    async fn message_is_required() {
        let app = test_support::app();
        let err = chat(
            State(app),
            Json(ChatBody {
                message: Some("   ".into()),
                project_id: Some("p1".into()),
                ..ChatBody::default()
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn project_id_is_required() {
        let app = test_support::app();
        let err = chat(
            State(app),
            Json(ChatBody {
                message: Some("hello".into()),
                ..ChatBody::default()
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unknown_conversation_is_404() {
        let app = test_support::app();
        let err = chat(
            State(app),
            Json(ChatBody {
                message: Some("hello".into()),
                project_id: Some("p1".into()),
                conversation_id: Some(Uuid::new_v4().to_string()),
                ..ChatBody::default()
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn finish_turn_applies_memory_and_strips_tags() {
        let app = test_support::app();
        let project = app.store.create_project("p").await.unwrap();
        let conv = app
            .store
            .create_conversation(crate::store::NewConversation {
                project_id: project.id,
                topic_id: None,
                name: "c".into(),
            })
            .await
            .unwrap();
        let project_id = project.id.to_string();
        let reply = "Noted.\n<memory_update>{\"user.skills\": [\"baking\"]}</memory_update>";

        finish_turn(
            &app,
            Turn {
                project_id: project_id.clone(),
                conversation: Some(conv.clone()),
                state: ConversationState::default(),
                capability: None,
            },
            reply,
        )
        .await;

        let session = app.store.load_session(&project_id).await.unwrap().unwrap();
        assert_eq!(session.memory.user.skills, vec!["baking"]);

        let messages = app.store.list_messages(conv.id).await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].content, "Noted.");

        let state = app.store.load_state(conv.id).await.unwrap().unwrap();
        assert!(state
            .completed_stages
            .contains(&coach_core::types::Stage::IntentUnderstanding));
    }
}
