use crate::error::ApiError;
use crate::state::AppState;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use weft_core::etag::{compute_etag, matches, CACHE_CONTROL};
use weft_core::WeftError;

fn conditional_json(headers: &HeaderMap, body: serde_json::Value) -> Response {
    let etag = compute_etag(&body);
    let if_none_match = headers.get("if-none-match").and_then(|v| v.to_str().ok());
    if matches(if_none_match, &etag) {
        return (
            StatusCode::NOT_MODIFIED,
            [("etag", etag.as_str()), ("cache-control", CACHE_CONTROL)],
        )
            .into_response();
    }
    let mut response = (StatusCode::OK, Json(body)).into_response();
    response.headers_mut().insert("etag", etag.parse().expect("etag is valid header value"));
    response
        .headers_mut()
        .insert("cache-control", CACHE_CONTROL.parse().expect("cache-control is valid header value"));
    response
}

pub async fn project_stats(State(state): State<AppState>, headers: HeaderMap) -> Result<Response, ApiError> {
    if !state.authorize(&headers) {
        return Err(WeftError::Unauthorized.into());
    }
    let ctx = state.project_for(&headers).await;
    Ok(conditional_json(&headers, ctx.stats_snapshot()))
}

pub async fn all_projects_stats(State(state): State<AppState>, headers: HeaderMap) -> Result<Response, ApiError> {
    if !state.authorize(&headers) {
        return Err(WeftError::Unauthorized.into());
    }
    let mut by_project = serde_json::Map::new();
    for id in state.projects.list_ids() {
        if let Some(ctx) = state.projects.get(&id) {
            by_project.insert(id, ctx.stats_snapshot());
        }
    }
    Ok(conditional_json(&headers, serde_json::Value::Object(by_project)))
}
