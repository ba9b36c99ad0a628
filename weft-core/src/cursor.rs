//! Cursor codec & filter-hash.
//!
//! A cursor is a stateless page position: offset, limit, and an optional
//! fingerprint of the filter the listing was taken under. Encoding is pure;
//! no cursor ever touches a store.

use crate::error::{Result, WeftError};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Public limit cap enforced by HTTP list adapters; the codec itself
/// allows a wider window for internal callers.
pub const HTTP_LIST_LIMIT_MAX: usize = 100;

/// Widest limit the codec itself will accept.
pub const CODEC_LIMIT_MAX: usize = 1000;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Cursor {
    pub offset: usize,
    pub limit: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter_hash: Option<String>,
}

impl Cursor {
    pub fn new(offset: usize, limit: usize, filter_hash: Option<String>) -> Self {
        Self {
            offset,
            limit,
            filter_hash,
        }
    }

    /// base64url(canonical JSON).
    pub fn encode(&self) -> String {
        // serde_json on a struct with explicitly ordered fields already
        // produces stable output; no extra canonicalization pass needed.
        let json = serde_json::to_vec(self).expect("Cursor serializes infallibly");
        base64::Engine::encode(&base64::engine::general_purpose::URL_SAFE_NO_PAD, json)
    }

    pub fn decode(raw: &str) -> Result<Self> {
        let bytes = base64::Engine::decode(&base64::engine::general_purpose::URL_SAFE_NO_PAD, raw)
            .map_err(|e| WeftError::BadRequest(format!("malformed cursor: {e}")))?;
        let cursor: Cursor = serde_json::from_slice(&bytes)
            .map_err(|e| WeftError::BadRequest(format!("malformed cursor: {e}")))?;
        if cursor.limit == 0 || cursor.limit > CODEC_LIMIT_MAX {
            return Err(WeftError::BadRequest(format!(
                "cursor limit out of range: {}",
                cursor.limit
            )));
        }
        Ok(cursor)
    }

    /// Validates the cursor's filter fingerprint against the request's.
    /// Omitted fingerprint is always accepted.
    pub fn validate_filter(&self, request_hash: &str) -> Result<()> {
        match &self.filter_hash {
            None => Ok(()),
            Some(h) if h == request_hash => Ok(()),
            Some(_) => Err(WeftError::BadRequest(
                "filter mismatch — filters changed between requests".to_string(),
            )),
        }
    }
}

/// First 16 hex chars of SHA-256 over the canonical (sorted-key) JSON of a
/// filter map. Same filter in any key order yields the same hash.
pub fn filter_hash(filter: &serde_json::Value) -> String {
    let canonical = canonicalize(filter);
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    let digest = hasher.finalize();
    hex_prefix(&digest, 16)
}

fn hex_prefix(bytes: &[u8], n: usize) -> String {
    let mut s = String::with_capacity(n);
    for b in bytes {
        if s.len() >= n {
            break;
        }
        s.push_str(&format!("{b:02x}"));
    }
    s.truncate(n);
    s
}

/// Re-serializes a JSON value with object keys sorted lexicographically at
/// every level, so semantically equal filters hash identically regardless
/// of input key order.
pub fn canonicalize(value: &serde_json::Value) -> String {
    fn sort(v: &serde_json::Value) -> serde_json::Value {
        match v {
            serde_json::Value::Object(map) => {
                let mut entries: Vec<_> = map.iter().collect();
                entries.sort_by(|a, b| a.0.cmp(b.0));
                let mut out = serde_json::Map::new();
                for (k, v) in entries {
                    out.insert(k.clone(), sort(v));
                }
                serde_json::Value::Object(out)
            }
            serde_json::Value::Array(items) => {
                serde_json::Value::Array(items.iter().map(sort).collect())
            }
            other => other.clone(),
        }
    }
    serde_json::to_string(&sort(value)).expect("canonical JSON serializes infallibly")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let c = Cursor::new(10, 50, Some("abc123".to_string()));
        let encoded = c.encode();
        let decoded = Cursor::decode(&encoded).unwrap();
        assert_eq!(c, decoded);
    }

    #[test]
    fn decode_rejects_bad_limit() {
        let c = Cursor::new(0, 5000, None);
        let encoded = c.encode();
        assert!(Cursor::decode(&encoded).is_err());
    }

    #[test]
    fn decode_rejects_malformed_base64() {
        assert!(Cursor::decode("not valid base64!!").is_err());
    }

    #[test]
    fn filter_hash_is_order_independent() {
        let a = serde_json::json!({"status": "online", "type": "claude-code"});
        let b = serde_json::json!({"type": "claude-code", "status": "online"});
        assert_eq!(filter_hash(&a), filter_hash(&b));
    }

    #[test]
    fn validate_filter_accepts_absent_hash() {
        let c = Cursor::new(0, 10, None);
        assert!(c.validate_filter("anything").is_ok());
    }

    #[test]
    fn validate_filter_rejects_mismatch() {
        let c = Cursor::new(0, 10, Some("aaa".to_string()));
        assert!(c.validate_filter("bbb").is_err());
        assert!(c.validate_filter("aaa").is_ok());
    }
}
