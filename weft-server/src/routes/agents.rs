use crate::error::ApiError;
use crate::pagination::paginate;
use crate::state::AppState;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use weft_core::agent::AgentFilter;
use weft_core::batch::{require_selection, run_batch};
use weft_core::model::{AgentStatus, AgentType};
use weft_core::WeftError;

/// Grace period is honored but bounded — an unbounded client-supplied
/// delay would hold the request handler open indefinitely.
const MAX_GRACE_PERIOD_MS: u64 = 30_000;

#[derive(Deserialize, Default)]
pub struct ListQuery {
    #[serde(rename = "type")]
    pub agent_type: Option<String>,
    pub status: Option<String>,
    pub capability: Option<String>,
    pub cursor: Option<String>,
    pub limit: Option<usize>,
}

fn parse_agent_type(raw: &str) -> Result<AgentType, ApiError> {
    serde_json::from_value(serde_json::Value::String(raw.to_string()))
        .map_err(|_| ApiError::from(WeftError::BadRequest(format!("invalid agent type: {raw}"))))
}

fn parse_agent_status(raw: &str) -> Result<AgentStatus, ApiError> {
    serde_json::from_value(serde_json::Value::String(raw.to_string()))
        .map_err(|_| ApiError::from(WeftError::BadRequest(format!("invalid agent status: {raw}"))))
}

pub async fn list(State(state): State<AppState>, headers: HeaderMap, Query(q): Query<ListQuery>) -> Result<Response, ApiError> {
    if !state.authorize(&headers) {
        return Err(WeftError::Unauthorized.into());
    }
    let ctx = state.project_for(&headers).await;

    let mut filter = AgentFilter::default();
    if let Some(t) = &q.agent_type {
        filter.agent_type = Some(parse_agent_type(t)?);
    }
    if let Some(s) = &q.status {
        filter.status = Some(parse_agent_status(s)?);
    }
    filter.capability = q.capability.clone();

    let matched = ctx.agents.list(&filter);
    let fingerprint = serde_json::json!({
        "type": q.agent_type,
        "status": q.status,
        "capability": q.capability,
    });
    let page = paginate(matched, &fingerprint, q.cursor.as_deref(), q.limit, state.config.list_limit_max)?;
    Ok(Json(serde_json::json!({
        "agents": page.items,
        "count": page.count,
        "total": page.total,
        "hasMore": page.has_more,
        "nextCursor": page.next_cursor,
        "prevCursor": page.prev_cursor,
    }))
    .into_response())
}

pub async fn get(State(state): State<AppState>, headers: HeaderMap, Path(guid): Path<String>) -> Result<Response, ApiError> {
    if !state.authorize(&headers) {
        return Err(WeftError::Unauthorized.into());
    }
    let ctx = state.project_for(&headers).await;
    match ctx.agents.get_by_guid(&guid) {
        Some(agent) => Ok(Json(agent).into_response()),
        None => Err(WeftError::NotFound(format!("agent not found: {guid}")).into()),
    }
}

#[derive(Deserialize, Default)]
pub struct ShutdownBody {
    #[serde(default = "default_graceful")]
    pub graceful: bool,
}

fn default_graceful() -> bool {
    true
}

pub async fn shutdown(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(guid): Path<String>,
    body: Option<Json<ShutdownBody>>,
) -> Result<Response, ApiError> {
    if !state.authorize(&headers) {
        return Err(WeftError::Unauthorized.into());
    }
    let ctx = state.project_for(&headers).await;
    let graceful = body.map(|Json(b)| b.graceful).unwrap_or(true);
    if !ctx.agents.shutdown(&guid, graceful) {
        return Err(WeftError::NotFound(format!("agent not found: {guid}")).into());
    }
    Ok(Json(serde_json::json!({
        "success": true,
        "message": format!("agent {guid} shut down"),
        "graceful": graceful,
    }))
    .into_response())
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ShutdownBatchBody {
    #[serde(default)]
    pub filter: Option<serde_json::Value>,
    #[serde(default)]
    pub agent_guids: Option<Vec<String>>,
    #[serde(default = "default_graceful")]
    pub graceful: bool,
    #[serde(default)]
    pub grace_period_ms: Option<u64>,
    #[serde(default)]
    pub reason: Option<String>,
}

pub async fn shutdown_batch(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<ShutdownBatchBody>,
) -> Result<Response, ApiError> {
    if !state.authorize(&headers) {
        return Err(WeftError::Unauthorized.into());
    }
    require_selection(body.agent_guids.as_deref(), body.filter.as_ref())?;
    let ctx = state.project_for(&headers).await;

    let ids: Vec<String> = match &body.agent_guids {
        Some(ids) => ids.clone(),
        None => {
            let mut filter = AgentFilter::default();
            if let Some(t) = body.filter.as_ref().and_then(|f| f.get("agentType")).and_then(|v| v.as_str()) {
                filter.agent_type = Some(parse_agent_type(t)?);
            }
            if let Some(s) = body.filter.as_ref().and_then(|f| f.get("status")).and_then(|v| v.as_str()) {
                filter.status = Some(parse_agent_status(s)?);
            }
            ctx.agents.list(&filter).into_iter().map(|a| a.guid).collect()
        }
    };

    if body.graceful {
        if let Some(ms) = body.grace_period_ms {
            tokio::time::sleep(std::time::Duration::from_millis(ms.min(MAX_GRACE_PERIOD_MS))).await;
        }
    }

    let graceful = body.graceful;
    let result = run_batch(&ids, |guid| {
        if ctx.agents.shutdown(guid, graceful) {
            Ok(())
        } else {
            Err("agent not found".to_string())
        }
    });
    let shutdown_agents = result.success.clone();
    Ok((
        StatusCode::OK,
        Json(serde_json::json!({
            "success": result.success,
            "failed": result.failed,
            "shutdownAgents": shutdown_agents,
            "graceful": graceful,
            "count": result.count,
            "errors": result.errors,
            "totalProcessed": result.total_processed,
            "successRate": result.success_rate,
            "completedAt": result.completed_at,
        })),
    )
        .into_response())
}
