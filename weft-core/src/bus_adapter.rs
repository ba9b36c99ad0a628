//! Message-bus adapter seam: subject grammar and the publisher contract.
//!
//! The NATS bus itself is external; this trait is what a real client must
//! satisfy to receive work completion/error notifications on the
//! `<root>.<projectId>.<kind>...` subject namespace. Trait-plus-in-memory-impl
//! shape, applied to bus publication.

use crate::model::{WorkError, WorkItem};

/// `<root>.<projectId>.<kind>...` subject namespacing.
pub fn work_completed_subject(root: &str, project_id: &str) -> String {
    format!("{root}.{project_id}.work.completed")
}

pub fn work_errors_subject(root: &str, project_id: &str) -> String {
    format!("{root}.{project_id}.work.errors")
}

pub fn work_status_subject(root: &str, project_id: &str, work_item_id: &str) -> String {
    format!("{root}.{project_id}.work.status.{work_item_id}")
}

pub trait BusPublisher: Send + Sync {
    fn publish_work_completed(&self, project_id: &str, item: &WorkItem);
    fn publish_work_error(&self, project_id: &str, item: &WorkItem, error: &WorkError);
}

/// Discards every publication. The coordinator's own in-memory event bus
/// remains the consistency-bearing path regardless — this impl exists for
/// deployments that run without a message bus at all.
pub struct NoopBus;

impl BusPublisher for NoopBus {
    fn publish_work_completed(&self, _project_id: &str, _item: &WorkItem) {}
    fn publish_work_error(&self, _project_id: &str, _item: &WorkItem, _error: &WorkError) {}
}

/// Default publisher: logs the subject and work item id at the same
/// namespacing a real NATS client would publish under. Swap for a real
/// client by implementing `BusPublisher` against it; the subject grammar
/// is already exercised here so the wire contract doesn't silently drift.
pub struct TracingBus {
    root: String,
}

impl TracingBus {
    pub fn new(root: impl Into<String>) -> Self {
        Self { root: root.into() }
    }
}

impl BusPublisher for TracingBus {
    fn publish_work_completed(&self, project_id: &str, item: &WorkItem) {
        let subject = work_completed_subject(&self.root, project_id);
        tracing::info!(subject = %subject, work_item_id = %item.id, "publish work completion");
    }

    fn publish_work_error(&self, project_id: &str, item: &WorkItem, error: &WorkError) {
        let subject = work_errors_subject(&self.root, project_id);
        tracing::info!(subject = %subject, work_item_id = %item.id, recoverable = error.recoverable, "publish work error");
    }
}

/// Test double that records every publication it receives, in order.
#[derive(Default)]
pub struct RecordingBus {
    pub completed: std::sync::Mutex<Vec<String>>,
    pub errors: std::sync::Mutex<Vec<String>>,
}

impl BusPublisher for RecordingBus {
    fn publish_work_completed(&self, project_id: &str, item: &WorkItem) {
        self.completed.lock().expect("recording bus lock poisoned").push(format!("{project_id}:{}", item.id));
    }

    fn publish_work_error(&self, project_id: &str, item: &WorkItem, _error: &WorkError) {
        self.errors.lock().expect("recording bus lock poisoned").push(format!("{project_id}:{}", item.id));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subject_grammar_is_namespaced() {
        assert_eq!(work_completed_subject("weft", "proj1"), "weft.proj1.work.completed");
        assert_eq!(work_status_subject("weft", "proj1", "w1"), "weft.proj1.work.status.w1");
    }

    #[test]
    fn tracing_bus_does_not_panic() {
        let bus = TracingBus::new("weft");
        let item = WorkItem {
            id: "w1".to_string(),
            task_id: "t1".to_string(),
            description: "d".to_string(),
            capability: "c".to_string(),
            boundary: "b".to_string(),
            priority: 5,
            deadline: None,
            context_data: Default::default(),
            status: crate::model::WorkStatus::Completed,
            offered_at: chrono::Utc::now(),
            assigned_at: None,
            assigned_to: None,
            attempts: 0,
            progress: 100,
            result: None,
            error: None,
        };
        let error = WorkError { message: "boom".to_string(), recoverable: true, occurred_at: chrono::Utc::now() };
        bus.publish_work_completed("proj1", &item);
        bus.publish_work_error("proj1", &item, &error);
    }
}
