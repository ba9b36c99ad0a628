//! ETag middleware support.
//!
//! Pure functions: the core computes the tag and tells the HTTP adapter
//! whether to suppress the body; it does not itself know about headers.

use crate::cursor::canonicalize;
use serde::Serialize;

/// Cache-Control value every cached list/snapshot response carries.
pub const CACHE_CONTROL: &str = "max-age=30, must-revalidate";

/// Quoted lowercase 32-hex ETag of a response body's canonical JSON.
pub fn compute_etag<T: Serialize>(body: &T) -> String {
    let value = serde_json::to_value(body).expect("response body serializes infallibly");
    let canonical = canonicalize(&value);
    let digest = md5::compute(canonical.as_bytes());
    format!("\"{digest:x}\"")
}

/// Decides whether a conditional request should receive `304 Not Modified`.
pub fn matches(if_none_match: Option<&str>, etag: &str) -> bool {
    if_none_match.map(|v| v.trim() == etag).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn deterministic_for_equal_bodies() {
        let a = json!({"a": 1, "b": 2});
        let b = json!({"b": 2, "a": 1});
        assert_eq!(compute_etag(&a), compute_etag(&b));
    }

    #[test]
    fn differs_for_different_bodies() {
        assert_ne!(compute_etag(&json!({"a": 1})), compute_etag(&json!({"a": 2})));
    }

    #[test]
    fn matches_exact_value_only() {
        let tag = compute_etag(&json!({"x": 1}));
        assert!(matches(Some(&tag), &tag));
        assert!(!matches(Some("\"deadbeef\""), &tag));
        assert!(!matches(None, &tag));
    }
}
