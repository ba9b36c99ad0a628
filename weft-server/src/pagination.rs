//! Cursor-pagination adapter: binds the core's stateless
//! cursor codec to a concrete in-memory list, enforcing the public ≤100
//! cap distinct from the codec's wider internal cap.

use crate::error::ApiError;
use serde::Serialize;
use weft_core::cursor::{filter_hash, Cursor};

const DEFAULT_LIMIT: usize = 50;

#[derive(Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub count: usize,
    pub total: usize,
    #[serde(rename = "hasMore")]
    pub has_more: bool,
    #[serde(rename = "nextCursor")]
    pub next_cursor: Option<String>,
    #[serde(rename = "prevCursor")]
    pub prev_cursor: Option<String>,
}

/// `all` is the full, already-filtered collection for this request's query.
/// `filter` is the same query rendered as JSON, used to fingerprint the
/// cursor so a page reused under a different filter is rejected. `max` is
/// the deployment's configured public cap (`Config::list_limit_max`) —
/// both the no-cursor request limit and a replayed cursor's decoded limit
/// are clamped to it, so a minted cursor can't carry a wider window than
/// a fresh request could.
pub fn paginate<T: Clone>(
    all: Vec<T>,
    filter: &serde_json::Value,
    cursor: Option<&str>,
    limit: Option<usize>,
    max: usize,
) -> Result<Page<T>, ApiError> {
    let hash = filter_hash(filter);
    let (offset, limit) = match cursor {
        Some(raw) => {
            let c = Cursor::decode(raw).map_err(ApiError::from)?;
            c.validate_filter(&hash).map_err(ApiError::from)?;
            (c.offset, c.limit.min(max))
        }
        None => {
            let requested = limit.unwrap_or(DEFAULT_LIMIT);
            (0, requested.clamp(1, max))
        }
    };

    let total = all.len();
    let items: Vec<T> = all.into_iter().skip(offset).take(limit).collect();
    let has_more = offset + items.len() < total;
    let next_cursor = has_more.then(|| Cursor::new(offset + limit, limit, Some(hash.clone())).encode());
    let prev_cursor = (offset > 0).then(|| Cursor::new(offset.saturating_sub(limit), limit, Some(hash.clone())).encode());

    Ok(Page {
        count: items.len(),
        items,
        total,
        has_more,
        next_cursor,
        prev_cursor,
    })
}
