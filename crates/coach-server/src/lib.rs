pub mod error;
pub mod prompts;
pub mod routes;
pub mod sessions;
pub mod state;
pub mod store;

use axum::routing::{get, patch, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub fn build_router(app_state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/chat", post(routes::chat::chat))
        .route(
            "/api/projects",
            get(routes::projects::list_projects).post(routes::projects::create_project),
        )
        .route(
            "/api/projects/{id}",
            patch(routes::projects::rename_project).delete(routes::projects::delete_project),
        )
        .route(
            "/api/topics",
            get(routes::topics::list_topics).post(routes::topics::create_topic),
        )
        .route(
            "/api/topics/{id}",
            patch(routes::topics::rename_topic).delete(routes::topics::delete_topic),
        )
        .route(
            "/api/conversations",
            get(routes::conversations::get_conversations)
                .post(routes::conversations::create_conversation),
        )
        .route(
            "/api/conversations/{id}",
            patch(routes::conversations::rename_conversation)
                .delete(routes::conversations::delete_conversation),
        )
        .route(
            "/api/conversations/{id}/state",
            get(routes::conversations::get_state),
        )
        .route(
            "/api/challenges",
            get(routes::challenges::list_challenges).post(routes::challenges::create_challenge),
        )
        .route(
            "/api/challenges/{id}/validate",
            post(routes::challenges::validate_challenge),
        )
        .route("/api/memory/{project_id}", get(routes::memory::get_memory))
        .route(
            "/api/memory/{project_id}/questions/{question_id}/complete",
            post(routes::memory::complete_question),
        )
        .route(
            "/api/prompts/cache/clear",
            post(routes::prompts::clear_cache),
        )
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(app_state)
}

pub async fn serve(app_state: AppState, port: u16) -> anyhow::Result<()> {
    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    serve_on(app_state, listener).await
}

pub async fn serve_on(
    app_state: AppState,
    listener: tokio::net::TcpListener,
) -> anyhow::Result<()> {
    let actual_port = listener.local_addr()?.port();
    tracing::info!(
        store = app_state.store.backend(),
        notion = app_state.prompts.is_enabled(),
        knowledge = app_state.knowledge.len(),
        "coach server listening on http://localhost:{actual_port}"
    );

    let app = build_router(app_state);
    axum::serve(listener, app).await?;
    Ok(())
}
