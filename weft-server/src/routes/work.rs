use crate::error::ApiError;
use crate::pagination::paginate;
use crate::state::AppState;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use weft_core::batch::{require_selection, run_batch};
use weft_core::model::{SubmitWorkRequest, WorkStatus};
use weft_core::WeftError;

#[derive(Deserialize, Default)]
pub struct ListQuery {
    pub status: Option<String>,
    pub boundary: Option<String>,
    pub classification: Option<String>,
    pub cursor: Option<String>,
    pub limit: Option<usize>,
}

fn parse_status(raw: &str) -> Result<WorkStatus, ApiError> {
    serde_json::from_value(serde_json::Value::String(raw.to_string()))
        .map_err(|_| ApiError::from(WeftError::BadRequest(format!("invalid work status: {raw}"))))
}

pub async fn list(State(state): State<AppState>, headers: HeaderMap, Query(q): Query<ListQuery>) -> Result<Response, ApiError> {
    if !state.authorize(&headers) {
        return Err(WeftError::Unauthorized.into());
    }
    let ctx = state.project_for(&headers).await;

    // `boundary` supersedes the deprecated `classification` alias.
    let boundary = q.boundary.clone().or_else(|| q.classification.clone());
    let deprecated_param_used = q.classification.is_some() && q.boundary.is_none();

    let status_filter = q.status.as_deref().map(parse_status).transpose()?;

    let mut items = ctx.work.list_all();
    if let Some(status) = status_filter {
        items.retain(|i| i.status == status);
    }
    if let Some(b) = &boundary {
        items.retain(|i| &i.boundary == b);
    }

    let fingerprint = serde_json::json!({ "status": q.status, "boundary": boundary });
    let page = paginate(items, &fingerprint, q.cursor.as_deref(), q.limit, state.config.list_limit_max)?;

    let mut response = Json(serde_json::json!({
        "workItems": page.items,
        "count": page.count,
        "total": page.total,
        "hasMore": page.has_more,
        "nextCursor": page.next_cursor,
        "prevCursor": page.prev_cursor,
    }))
    .into_response();

    if deprecated_param_used {
        response.headers_mut().insert(
            HeaderName::from_static("x-deprecated-param"),
            HeaderValue::from_static("classification (use boundary instead)"),
        );
    }
    Ok(response)
}

pub async fn create(State(state): State<AppState>, headers: HeaderMap, Json(req): Json<SubmitWorkRequest>) -> Result<Response, ApiError> {
    if !state.authorize(&headers) {
        return Err(WeftError::Unauthorized.into());
    }
    if let Some(p) = req.priority {
        if !(1..=10).contains(&p) {
            return Err(WeftError::BadRequest("priority must be in 1..=10".to_string()).into());
        }
    }
    if req.boundary.trim().is_empty() {
        return Err(WeftError::BadRequest("boundary must be non-empty".to_string()).into());
    }
    let ctx = state.project_for(&headers).await;
    let id = ctx.work.submit_work(req);
    let item = ctx.work.get(&id).expect("just-submitted work item is present");
    Ok((StatusCode::CREATED, Json(item)).into_response())
}

pub async fn get(State(state): State<AppState>, headers: HeaderMap, Path(id): Path<String>) -> Result<Response, ApiError> {
    if !state.authorize(&headers) {
        return Err(WeftError::Unauthorized.into());
    }
    let ctx = state.project_for(&headers).await;
    match ctx.work.get(&id) {
        Some(item) => Ok(Json(item).into_response()),
        None => Err(WeftError::NotFound(format!("work item not found: {id}")).into()),
    }
}

pub async fn cancel(State(state): State<AppState>, headers: HeaderMap, Path(id): Path<String>) -> Result<Response, ApiError> {
    if !state.authorize(&headers) {
        return Err(WeftError::Unauthorized.into());
    }
    let ctx = state.project_for(&headers).await;
    if ctx.work.get(&id).is_none() {
        return Err(WeftError::NotFound(format!("work item not found: {id}")).into());
    }
    if !ctx.work.cancel_work(&id) {
        return Err(WeftError::Conflict(format!("work item not cancellable: {id}")).into());
    }
    Ok(Json(ctx.work.get(&id).expect("work item present after cancel")).into_response())
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct CancelBatchBody {
    #[serde(default)]
    pub filter: Option<serde_json::Value>,
    #[serde(default)]
    pub work_item_ids: Option<Vec<String>>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub reassign: Option<bool>,
}

pub async fn cancel_batch(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<CancelBatchBody>,
) -> Result<Response, ApiError> {
    if !state.authorize(&headers) {
        return Err(WeftError::Unauthorized.into());
    }
    require_selection(body.work_item_ids.as_deref(), body.filter.as_ref())?;
    let ctx = state.project_for(&headers).await;

    let ids: Vec<String> = match &body.work_item_ids {
        Some(ids) => ids.clone(),
        None => {
            let mut items = ctx.work.list_all();
            if let Some(status) = body.filter.as_ref().and_then(|f| f.get("status")).and_then(|v| v.as_str()) {
                let want = parse_status(status)?;
                items.retain(|i| i.status == want);
            }
            items.into_iter().map(|i| i.id).collect()
        }
    };

    // Original items are captured before cancellation so a reassign can
    // resubmit the same capability/boundary/description as fresh pending
    // work once the cancel has landed.
    let originals: std::collections::HashMap<String, _> = ids.iter().filter_map(|id| ctx.work.get(id).map(|item| (id.clone(), item))).collect();

    let result = run_batch(&ids, |id| {
        if ctx.work.cancel_work(id) {
            Ok(())
        } else {
            Err("not cancellable".to_string())
        }
    });
    // Every failure on this endpoint is a non-cancellable item (terminal
    // state); surfaced under its own name alongside the generic `failed`
    // list.
    let not_cancellable = result.failed.clone();

    let reassign = body.reassign.unwrap_or(false);
    let mut reassigned_items = Vec::new();
    if reassign {
        for id in &result.success {
            let Some(original) = originals.get(id) else { continue };
            let new_id = ctx.work.submit_work(SubmitWorkRequest {
                task_id: Some(original.task_id.clone()),
                description: original.description.clone(),
                capability: original.capability.clone(),
                boundary: original.boundary.clone(),
                priority: Some(original.priority),
                deadline: original.deadline,
                context_data: original.context_data.clone(),
                preferred_agent_type: None,
                required_agent_type: None,
            });
            reassigned_items.push(new_id);
        }
    }
    let cancelled_items: Vec<String> = result.success.clone();

    Ok((
        StatusCode::OK,
        Json(serde_json::json!({
            "success": result.success,
            "failed": result.failed,
            "notCancellable": not_cancellable,
            "cancelledItems": cancelled_items,
            "reassignedItems": reassigned_items,
            "count": result.count,
            "errors": result.errors,
            "totalProcessed": result.total_processed,
            "successRate": result.success_rate,
            "completedAt": result.completed_at,
        })),
    )
        .into_response())
}
