use crate::error::ApiError;
use crate::pagination::paginate;
use crate::state::AppState;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use std::collections::HashSet;
use weft_core::batch::{require_selection, run_batch};
use weft_core::model::{new_id, AgentType, TargetHealth, TargetStatus};
use weft_core::target::SpinUpMechanism;
use weft_core::{WeftError};

/// No external mechanism is wired in this deployment profile: triggering
/// records `spin-up:triggered`/`started` but the outcome stays unset until
/// a real mechanism calls back.
struct UnconfiguredMechanism;

impl SpinUpMechanism for UnconfiguredMechanism {
    fn trigger(&self, _target: &weft_core::model::Target, _work_item_id: Option<&str>) {}
}

#[derive(Deserialize, Default)]
pub struct ListQuery {
    pub status: Option<String>,
    pub cursor: Option<String>,
    pub limit: Option<usize>,
}

pub async fn list(State(state): State<AppState>, headers: HeaderMap, Query(q): Query<ListQuery>) -> Result<Response, ApiError> {
    if !state.authorize(&headers) {
        return Err(WeftError::Unauthorized.into());
    }
    let ctx = state.project_for(&headers).await;
    let mut items = ctx.targets.list();
    if let Some(status) = &q.status {
        let want: weft_core::model::TargetStatus = serde_json::from_value(serde_json::Value::String(status.clone()))
            .map_err(|_| ApiError::from(WeftError::BadRequest(format!("invalid target status: {status}"))))?;
        items.retain(|t| t.status == want);
    }
    let fingerprint = serde_json::json!({ "status": q.status });
    let page = paginate(items, &fingerprint, q.cursor.as_deref(), q.limit, state.config.list_limit_max)?;
    Ok(Json(serde_json::json!({
        "targets": page.items,
        "count": page.count,
        "total": page.total,
        "hasMore": page.has_more,
        "nextCursor": page.next_cursor,
        "prevCursor": page.prev_cursor,
    }))
    .into_response())
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBody {
    #[serde(default)]
    pub target_id: Option<String>,
    pub target_name: String,
    pub agent_type: AgentType,
    #[serde(default)]
    pub capabilities: HashSet<String>,
    #[serde(default)]
    pub boundaries: HashSet<String>,
    pub mechanism: String,
}

pub async fn create(State(state): State<AppState>, headers: HeaderMap, Json(body): Json<CreateBody>) -> Result<Response, ApiError> {
    if !state.authorize(&headers) {
        return Err(WeftError::Unauthorized.into());
    }
    let ctx = state.project_for(&headers).await;
    let target_id = body.target_id.unwrap_or_else(new_id);
    let target = ctx.targets.register(target_id, body.target_name, body.agent_type, body.capabilities, body.boundaries, body.mechanism);
    Ok((StatusCode::CREATED, Json(target)).into_response())
}

pub async fn get(State(state): State<AppState>, headers: HeaderMap, Path(id): Path<String>) -> Result<Response, ApiError> {
    if !state.authorize(&headers) {
        return Err(WeftError::Unauthorized.into());
    }
    let ctx = state.project_for(&headers).await;
    match ctx.targets.get(&id) {
        Some(target) => Ok(Json(target).into_response()),
        None => Err(WeftError::NotFound(format!("target not found: {id}")).into()),
    }
}

pub async fn update(State(state): State<AppState>, headers: HeaderMap, Path(id): Path<String>, Json(body): Json<serde_json::Value>) -> Result<Response, ApiError> {
    if !state.authorize(&headers) {
        return Err(WeftError::Unauthorized.into());
    }
    let ctx = state.project_for(&headers).await;
    if ctx.targets.get(&id).is_none() {
        return Err(WeftError::NotFound(format!("target not found: {id}")).into());
    }
    if let Some(health) = body.get("health").and_then(|v| v.as_str()) {
        let health: TargetHealth = serde_json::from_value(serde_json::Value::String(health.to_string()))
            .map_err(|_| ApiError::from(WeftError::BadRequest(format!("invalid target health: {health}"))))?;
        ctx.targets.set_health(&id, health);
    }
    Ok(Json(ctx.targets.get(&id).expect("target present after update")).into_response())
}

pub async fn delete(State(state): State<AppState>, headers: HeaderMap, Path(id): Path<String>) -> Result<Response, ApiError> {
    if !state.authorize(&headers) {
        return Err(WeftError::Unauthorized.into());
    }
    let ctx = state.project_for(&headers).await;
    if !ctx.targets.remove(&id) {
        return Err(WeftError::NotFound(format!("target not found: {id}")).into());
    }
    Ok(StatusCode::NO_CONTENT.into_response())
}

pub async fn enable(State(state): State<AppState>, headers: HeaderMap, Path(id): Path<String>) -> Result<Response, ApiError> {
    if !state.authorize(&headers) {
        return Err(WeftError::Unauthorized.into());
    }
    let ctx = state.project_for(&headers).await;
    if !ctx.targets.enable(&id) {
        return Err(WeftError::NotFound(format!("target not found: {id}")).into());
    }
    Ok(Json(ctx.targets.get(&id).expect("target present after enable")).into_response())
}

pub async fn disable(State(state): State<AppState>, headers: HeaderMap, Path(id): Path<String>) -> Result<Response, ApiError> {
    if !state.authorize(&headers) {
        return Err(WeftError::Unauthorized.into());
    }
    let ctx = state.project_for(&headers).await;
    if !ctx.targets.disable(&id) {
        return Err(WeftError::NotFound(format!("target not found: {id}")).into());
    }
    Ok(Json(ctx.targets.get(&id).expect("target present after disable")).into_response())
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SpinUpBody {
    #[serde(default)]
    pub work_item_id: Option<String>,
}

pub async fn spin_up(State(state): State<AppState>, headers: HeaderMap, Path(id): Path<String>, body: Option<Json<SpinUpBody>>) -> Result<Response, ApiError> {
    if !state.authorize(&headers) {
        return Err(WeftError::Unauthorized.into());
    }
    let ctx = state.project_for(&headers).await;
    if ctx.targets.get(&id).is_none() {
        return Err(WeftError::NotFound(format!("target not found: {id}")).into());
    }
    let work_item_id = body.and_then(|Json(b)| b.work_item_id);
    if !ctx.targets.trigger_spin_up(&id, work_item_id.as_deref(), &UnconfiguredMechanism) {
        return Err(WeftError::Conflict(format!("target disabled: {id}")).into());
    }
    Ok(Json(serde_json::json!({ "success": true, "targetId": id })).into_response())
}

/// Synchronous reachability probe (the target's registered mechanism is
/// external to the core; here we report the last known health, matching
/// `lastSpinUp`-style "external collaborator reports, core stores" shape).
pub async fn test(State(state): State<AppState>, headers: HeaderMap, Path(id): Path<String>) -> Result<Response, ApiError> {
    if !state.authorize(&headers) {
        return Err(WeftError::Unauthorized.into());
    }
    let ctx = state.project_for(&headers).await;
    match ctx.targets.get(&id) {
        Some(target) => Ok(Json(serde_json::json!({ "targetId": id, "health": target.health })).into_response()),
        None => Err(WeftError::NotFound(format!("target not found: {id}")).into()),
    }
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct DisableBatchBody {
    #[serde(default)]
    pub filter: Option<serde_json::Value>,
    #[serde(default)]
    pub target_ids: Option<Vec<String>>,
}

pub async fn disable_batch(State(state): State<AppState>, headers: HeaderMap, Json(body): Json<DisableBatchBody>) -> Result<Response, ApiError> {
    if !state.authorize(&headers) {
        return Err(WeftError::Unauthorized.into());
    }
    require_selection(body.target_ids.as_deref(), body.filter.as_ref())?;
    let ctx = state.project_for(&headers).await;
    let ids: Vec<String> = match &body.target_ids {
        Some(ids) => ids.clone(),
        None => {
            let mut items = ctx.targets.list();
            if let Some(status) = body.filter.as_ref().and_then(|f| f.get("status")).and_then(|v| v.as_str()) {
                let want: TargetStatus = serde_json::from_value(serde_json::Value::String(status.to_string()))
                    .map_err(|_| ApiError::from(WeftError::BadRequest(format!("invalid target status: {status}"))))?;
                items.retain(|t| t.status == want);
            }
            items.into_iter().map(|t| t.target_id).collect()
        }
    };
    let already_disabled: HashSet<String> = ids
        .iter()
        .filter(|id| ctx.targets.get(id).map(|t| t.status == TargetStatus::Disabled).unwrap_or(false))
        .cloned()
        .collect();
    // `disable` is idempotent: already-disabled targets still count as
    // success, so disable-batch over already-disabled targets yields
    // successRate = 100%.
    let result = run_batch(&ids, |id| if ctx.targets.disable(id) { Ok(()) } else { Err("target not found".to_string()) });
    let disabled_targets: Vec<String> = result.success.iter().filter(|id| !already_disabled.contains(*id)).cloned().collect();
    let already_disabled: Vec<String> = result.success.iter().filter(|id| already_disabled.contains(*id)).cloned().collect();
    Ok((
        StatusCode::OK,
        Json(serde_json::json!({
            "success": result.success,
            "failed": result.failed,
            "disabledTargets": disabled_targets,
            "alreadyDisabled": already_disabled,
            "count": result.count,
            "errors": result.errors,
            "totalProcessed": result.total_processed,
            "successRate": result.success_rate,
            "completedAt": result.completed_at,
        })),
    )
        .into_response())
}
