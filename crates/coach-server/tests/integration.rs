use std::sync::{Arc, Mutex};

use axum::http::StatusCode;
use claude_client::{ChatMessage, ClaudeError, Completion, TextStream};
use coach_core::config::Config;
use coach_core::session::Session;
use coach_server::prompts::PromptLibrary;
use coach_server::state::AppState;
use coach_server::store::Store;
use http_body_util::BodyExt;
use tower::ServiceExt;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Replays one scripted reply per turn and records the system prompts it saw.
#[derive(Clone, Default)]
struct Scripted {
    replies: Arc<Mutex<Vec<Vec<Result<String, String>>>>>,
    systems: Arc<Mutex<Vec<String>>>,
}

impl Scripted {
    fn reply(self, chunks: &[&str]) -> Self {
        self.replies
            .lock()
            .unwrap()
            .push(chunks.iter().map(|c| Ok(c.to_string())).collect());
        self
    }

    fn reply_with(self, items: Vec<Result<String, String>>) -> Self {
        self.replies.lock().unwrap().push(items);
        self
    }

    fn systems(&self) -> Vec<String> {
        self.systems.lock().unwrap().clone()
    }
}

impl Completion for Scripted {
    fn stream(&self, system: &str, _messages: Vec<ChatMessage>) -> TextStream {
        self.systems.lock().unwrap().push(system.to_string());
        let mut replies = self.replies.lock().unwrap();
        let items = if replies.is_empty() {
            vec![Ok("ok".to_string())]
        } else {
            replies.remove(0)
        };
        TextStream::from_items(
            items
                .into_iter()
                .map(|r| {
                    r.map_err(|message| ClaudeError::Api {
                        status: 529,
                        message,
                    })
                })
                .collect(),
        )
    }
}

fn app_state(llm: Scripted) -> AppState {
    AppState::with_parts(
        Store::in_memory(),
        Arc::new(llm),
        PromptLibrary::disabled(),
        Vec::new(),
        Config::default(),
    )
}

async fn send(
    app: axum::Router,
    method: &str,
    uri: &str,
    body: Option<serde_json::Value>,
) -> (StatusCode, String) {
    let builder = axum::http::Request::builder().method(method).uri(uri);
    let req = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(axum::body::Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap(),
        None => builder.body(axum::body::Body::empty()).unwrap(),
    };
    let response = app.oneshot(req).await.unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, String::from_utf8(body.to_vec()).unwrap())
}

/// Send a GET request via `oneshot` and return (status, parsed JSON body).
async fn get(app: axum::Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let (status, body) = send(app, "GET", uri, None).await;
    (status, serde_json::from_str(&body).unwrap_or(serde_json::Value::Null))
}

/// Send a POST request with a JSON body via `oneshot` and return (status, parsed JSON body).
async fn post_json(
    app: axum::Router,
    uri: &str,
    body: serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    let (status, body) = send(app, "POST", uri, Some(body)).await;
    (status, serde_json::from_str(&body).unwrap_or(serde_json::Value::Null))
}

/// The `data:` payloads of an SSE body, in order.
fn sse_data(body: &str) -> Vec<String> {
    body.lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|d| d.trim_start().to_string())
        .collect()
}

async fn create_project_and_conversation(app: &axum::Router) -> (String, String) {
    let (status, project) =
        post_json(app.clone(), "/api/projects", serde_json::json!({ "name": "Bakery" })).await;
    assert_eq!(status, StatusCode::OK);
    let project_id = project["id"].as_str().unwrap().to_string();

    let (status, conv) = post_json(
        app.clone(),
        "/api/conversations",
        serde_json::json!({ "project_id": project_id }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    (project_id, conv["id"].as_str().unwrap().to_string())
}

// ---------------------------------------------------------------------------
// CRUD
// ---------------------------------------------------------------------------

#[tokio::test]
async fn projects_crud() {
    let app = coach_server::build_router(app_state(Scripted::default()));

    let (status, body) = post_json(app.clone(), "/api/projects", serde_json::json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Project name is required");

    let (status, created) =
        post_json(app.clone(), "/api/projects", serde_json::json!({ "name": "Bakery" })).await;
    assert_eq!(status, StatusCode::OK);
    let id = created["id"].as_str().unwrap().to_string();

    let (status, renamed) = send(
        app.clone(),
        "PATCH",
        &format!("/api/projects/{id}"),
        Some(serde_json::json!({ "name": "Boulangerie" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(renamed.contains("Boulangerie"));

    let (status, list) = get(app.clone(), "/api/projects").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list.as_array().unwrap().len(), 1);

    let (status, body) = send(app.clone(), "DELETE", &format!("/api/projects/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("\"success\":true"));

    let (status, _) = send(app, "DELETE", &format!("/api/projects/{id}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn conversations_require_an_identifier() {
    let app = coach_server::build_router(app_state(Scripted::default()));
    let (status, body) = get(app.clone(), "/api/conversations").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body["error"],
        "conversation_id, project_id, or session_id is required"
    );

    let (status, body) = post_json(app, "/api/conversations", serde_json::json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "project_id is required");
}

#[tokio::test]
async fn conversation_list_and_delete() {
    let app = coach_server::build_router(app_state(Scripted::default()));
    let (project_id, conv_id) = create_project_and_conversation(&app).await;

    let (status, body) = get(
        app.clone(),
        &format!("/api/conversations?list=true&project_id={project_id}"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let conversations = body["conversations"].as_array().unwrap();
    assert_eq!(conversations.len(), 1);
    assert_eq!(conversations[0]["name"], "New Conversation");

    let (status, _) = send(app.clone(), "DELETE", &format!("/api/conversations/{conv_id}"), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = get(app, &format!("/api/conversations?conversation_id={conv_id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, serde_json::json!({ "messages": [] }));
}

#[tokio::test]
async fn challenges_validate_input() {
    let app = coach_server::build_router(app_state(Scripted::default()));

    let (status, _) = get(app.clone(), "/api/challenges").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = post_json(
        app.clone(),
        "/api/challenges",
        serde_json::json!({ "projectId": uuid::Uuid::new_v4(), "title": "t" }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body["error"],
        "Missing required fields: projectId, documentType, title, content"
    );

    let (status, body) = post_json(
        app,
        "/api/challenges",
        serde_json::json!({
            "projectId": uuid::Uuid::new_v4(),
            "documentType": "memo",
            "title": "t",
            "content": "c"
        }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("documentType"));
}

// ---------------------------------------------------------------------------
// Chat
// ---------------------------------------------------------------------------

#[tokio::test]
async fn chat_validates_body() {
    let app = coach_server::build_router(app_state(Scripted::default()));
    let (status, body) = post_json(
        app.clone(),
        "/api/chat",
        serde_json::json!({ "projectId": "p1" }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Message is required");

    let (status, body) = post_json(app, "/api/chat", serde_json::json!({ "message": "hi" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "projectId is required");
}

#[tokio::test]
async fn chat_streams_chunks_then_done() {
    let llm = Scripted::default().reply(&["Hello", " there"]);
    let app = coach_server::build_router(app_state(llm));

    let (status, body) = send(
        app,
        "POST",
        "/api/chat",
        Some(serde_json::json!({ "message": "hi", "projectId": "p1" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let data = sse_data(&body);
    assert_eq!(
        data,
        vec![
            r#"{"text":"Hello"}"#.to_string(),
            r#"{"text":" there"}"#.to_string(),
            "[DONE]".to_string(),
        ]
    );
}

#[tokio::test]
async fn chat_applies_memory_update_and_stores_clean_reply() {
    let llm = Scripted::default().reply(&[
        "Great, a bakery tool.",
        "\n<memory_update>{\"project\": {\"description\": \"Scheduling for bakeries\"}, ",
        "\"user.skills\": [\"baking\"]}</memory_update>",
    ]);
    let app = coach_server::build_router(app_state(llm));
    let (project_id, conv_id) = create_project_and_conversation(&app).await;

    let (status, _) = send(
        app.clone(),
        "POST",
        "/api/chat",
        Some(serde_json::json!({
            "message": "I build a scheduling tool for bakeries",
            "projectId": project_id,
            "conversationId": conv_id,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, memory) = get(app.clone(), &format!("/api/memory/{project_id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(memory["memory"]["project"]["description"], "Scheduling for bakeries");
    assert_eq!(memory["memory"]["user"]["skills"], serde_json::json!(["baking"]));

    let (_, history) = get(app, &format!("/api/conversations?conversation_id={conv_id}")).await;
    let messages = history["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0]["role"], "user");
    assert_eq!(messages[1]["role"], "assistant");
    assert_eq!(messages[1]["content"], "Great, a bakery tool.");
}

#[tokio::test]
async fn malformed_memory_update_leaves_memory_unchanged() {
    let llm = Scripted::default().reply(&["Sure.<memory_update>{not json</memory_update>"]);
    let app = coach_server::build_router(app_state(llm));

    let (status, _) = send(
        app.clone(),
        "POST",
        "/api/chat",
        Some(serde_json::json!({ "message": "hi", "projectId": "p1" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, memory) = get(app, "/api/memory/p1").await;
    assert_eq!(memory["memory"]["user"]["skills"], serde_json::json!([]));
    assert!(memory["memory"]["project"].get("description").is_none());
}

#[tokio::test]
async fn chat_advances_workflow_stage() {
    let reply = "Thanks!\n\nintention_categorisation[1]{intention_category,confidence_level,generic}\nFunding,80,no\n\nTell me about the project.";
    let llm = Scripted::default().reply(&[reply]);
    let app = coach_server::build_router(app_state(llm.clone()));
    let (project_id, conv_id) = create_project_and_conversation(&app).await;

    let (_, state) = get(app.clone(), &format!("/api/conversations/{conv_id}/state")).await;
    assert_eq!(state["currentStage"], "intent_understanding");

    let (status, _) = send(
        app.clone(),
        "POST",
        "/api/chat",
        Some(serde_json::json!({
            "message": "I need money",
            "projectId": project_id,
            "conversationId": conv_id,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(llm.systems()[0].contains("CURRENT WORKFLOW STAGE: intent_understanding (1/7)"));

    let (_, state) = get(app, &format!("/api/conversations/{conv_id}/state")).await;
    assert_eq!(state["currentStage"], "project_understanding");
    assert_eq!(state["intents"].as_array().unwrap().len(), 1);
    assert_eq!(state["completedStages"], serde_json::json!(["intent_understanding"]));
}

#[tokio::test]
async fn capability_turn_creates_challenge() {
    let llm = Scripted::default().reply(&["## Flash Diagnostic\n- Strong baking skills"]);
    let state = app_state(llm.clone());

    let (status, project) = post_json(
        coach_server::build_router(state.clone()),
        "/api/projects",
        serde_json::json!({ "name": "Bakery" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let project_id = project["id"].as_str().unwrap().to_string();

    let mut session = Session::new(&project_id);
    session.memory.project.description = Some("Scheduling for bakeries".into());
    session.memory.progress.activities = vec!["interviews".into(), "prototype".into()];
    state.store.save_session(&session).await.unwrap();

    let app = coach_server::build_router(state);
    let (status, _) = send(
        app.clone(),
        "POST",
        "/api/chat",
        Some(serde_json::json!({
            "message": "Can I get a diagnostic of my project?",
            "projectId": project_id,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(llm.systems()[0].contains("CAPABILITY TRIGGERED: Flash Diagnostic"));

    let (status, body) = get(app, &format!("/api/challenges?projectId={project_id}")).await;
    assert_eq!(status, StatusCode::OK);
    let challenges = body["challenges"].as_array().unwrap();
    assert_eq!(challenges.len(), 1);
    assert_eq!(challenges[0]["document_type"], "flash_diagnostic");
    assert_eq!(challenges[0]["title"], "Flash Diagnostic");
}

#[tokio::test]
async fn upstream_failure_before_first_chunk_is_500() {
    let llm = Scripted::default().reply_with(vec![Err("Overloaded".into())]);
    let app = coach_server::build_router(app_state(llm));

    let (status, body) = post_json(
        app,
        "/api/chat",
        serde_json::json!({ "message": "hi", "projectId": "p1" }),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"]
        .as_str()
        .unwrap()
        .starts_with("Error communicating with Claude"));
}

#[tokio::test]
async fn mid_stream_failure_is_reported_in_band() {
    let llm = Scripted::default().reply_with(vec![
        Ok("Partial <memory_update>{\"user.skills\": [\"x\"]}</memory_update>".into()),
        Err("Overloaded".into()),
    ]);
    let app = coach_server::build_router(app_state(llm));

    let (status, body) = send(
        app.clone(),
        "POST",
        "/api/chat",
        Some(serde_json::json!({ "message": "hi", "projectId": "p1" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let data = sse_data(&body);
    assert_eq!(data.len(), 2);
    assert!(data[1].contains("\"error\""));
    assert!(!data.contains(&"[DONE]".to_string()));

    // No processing after a failed stream.
    let (_, memory) = get(app, "/api/memory/p1").await;
    assert_eq!(memory["memory"]["user"]["skills"], serde_json::json!([]));
}

#[tokio::test]
async fn completing_a_question_over_http() {
    let app = coach_server::build_router(app_state(Scripted::default()));
    let (_, memory) = get(app.clone(), "/api/memory/p1").await;
    let id = memory["questions"][0]["id"].as_str().unwrap().to_string();

    let (status, body) = post_json(
        app.clone(),
        &format!("/api/memory/p1/questions/{id}/complete"),
        serde_json::json!({ "answer": "A bakery tool" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["questions"][0]["status"], "completed");

    let (status, _) = post_json(
        app,
        "/api/memory/p1/questions/q-nope/complete",
        serde_json::json!({}),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
