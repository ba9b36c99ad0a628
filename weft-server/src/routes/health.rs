use crate::state::AppState;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use chrono::Utc;

pub async fn health(State(state): State<AppState>, headers: HeaderMap) -> Json<serde_json::Value> {
    let websocket = match headers.get("x-project-id").and_then(|v| v.to_str().ok()) {
        Some(project_id) => state.projects.get(project_id).map(|ctx| {
            serde_json::json!({
                "connections": ctx.hub.connection_count(),
                "subscriptions": ctx.subscriptions.subscription_count(),
            })
        }),
        None => None,
    };
    Json(serde_json::json!({
        "status": "ok",
        "timestamp": Utc::now(),
        "documentation": "/api/docs",
        "websocket": websocket,
    }))
}
