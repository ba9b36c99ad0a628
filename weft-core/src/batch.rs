//! Batch operations: resolve a selection, apply a per-item
//! operation, and report a partial-failure result. Per-item failures never
//! abort the batch.

use crate::error::{Result, WeftError};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchResult {
    pub success: Vec<String>,
    pub failed: Vec<String>,
    pub count: usize,
    pub errors: BTreeMap<String, String>,
    pub total_processed: usize,
    pub success_rate: f64,
    pub completed_at: DateTime<Utc>,
}

/// Either `ids` or `filter` must be present, never both absent.
pub fn require_selection(ids: Option<&[String]>, filter: Option<&serde_json::Value>) -> Result<()> {
    if ids.is_none() && filter.is_none() {
        return Err(WeftError::BadRequest("Either filter or ids must be provided".to_string()));
    }
    Ok(())
}

/// Applies `op` to every resolved id, collecting successes/failures. Never
/// fails as a whole because of a per-item problem.
pub fn run_batch<F>(ids: &[String], mut op: F) -> BatchResult
where
    F: FnMut(&str) -> std::result::Result<(), String>,
{
    let mut success = Vec::new();
    let mut failed = Vec::new();
    let mut errors = BTreeMap::new();
    for id in ids {
        match op(id) {
            Ok(()) => success.push(id.clone()),
            Err(msg) => {
                failed.push(id.clone());
                errors.insert(id.clone(), msg);
            }
        }
    }
    let total_processed = ids.len();
    let success_rate = if total_processed == 0 {
        100.0
    } else {
        100.0 * success.len() as f64 / total_processed as f64
    };
    BatchResult {
        count: success.len(),
        success,
        failed,
        errors,
        total_processed,
        success_rate,
        completed_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requires_exactly_one_selection_source() {
        assert!(require_selection(None, None).is_err());
        assert!(require_selection(Some(&["a".to_string()]), None).is_ok());
        assert!(require_selection(None, Some(&serde_json::json!({}))).is_ok());
    }

    #[test]
    fn partial_failure_reports_success_rate() {
        let ids = vec!["w1".to_string(), "w2".to_string(), "w3".to_string()];
        let result = run_batch(&ids, |id| {
            if id == "w2" {
                Err("already completed".to_string())
            } else {
                Ok(())
            }
        });
        assert_eq!(result.success, vec!["w1", "w3"]);
        assert_eq!(result.failed, vec!["w2"]);
        assert!((result.success_rate - 66.666_666_666_666_66).abs() < 1e-6);
    }

    #[test]
    fn already_disabled_counts_as_success() {
        let ids = vec!["t1".to_string(), "t2".to_string()];
        let result = run_batch(&ids, |_| Ok(()));
        assert_eq!(result.success_rate, 100.0);
    }
}
