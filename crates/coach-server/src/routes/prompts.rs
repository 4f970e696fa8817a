use axum::extract::State;
use axum::Json;

use crate::state::AppState;

/// POST /api/prompts/cache/clear — forget cached Notion pages so edits show up
/// on the next turn.
pub async fn clear_cache(State(app): State<AppState>) -> Json<serde_json::Value> {
    let cleared = app.prompts.clear().await;
    Json(serde_json::json!({ "success": true, "cleared": cleared }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::test_support;

    #[tokio::test]
    async fn clearing_an_empty_cache() {
        let result = clear_cache(State(test_support::app())).await;
        assert_eq!(result.0, serde_json::json!({ "success": true, "cleared": 0 }));
    }
}
