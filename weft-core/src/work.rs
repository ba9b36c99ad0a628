//! Work Coordinator: the work-item state machine, claim/
//! progress/complete/fail/cancel, and the stale-work reaper.

use crate::bus_adapter::BusPublisher;
use crate::event::{Event, EventBus, EventPayload};
use crate::model::{new_id, AgentSummary, SubmitWorkRequest, WorkError, WorkItem, WorkResult, WorkStats, WorkStatus};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::debug;

/// Looks up an agent's join-shape summary at event-emission time;
/// implementations must enrich via the Agent Registry before fan-out.
pub trait AgentLookup: Send + Sync {
    fn resolve_summary(&self, guid: &str) -> Option<AgentSummary>;
}

#[derive(Clone, Copy, Debug)]
pub struct WorkCoordinatorConfig {
    pub stale_threshold_ms: i64,
    pub cleanup_interval_ms: u64,
}

impl Default for WorkCoordinatorConfig {
    fn default() -> Self {
        Self {
            stale_threshold_ms: 300_000,
            cleanup_interval_ms: 60_000,
        }
    }
}

pub struct WorkCoordinator {
    project_id: String,
    config: WorkCoordinatorConfig,
    bus: Arc<EventBus>,
    bus_publisher: Arc<dyn BusPublisher>,
    items: RwLock<HashMap<String, WorkItem>>,
}

impl WorkCoordinator {
    pub fn new(
        project_id: impl Into<String>,
        bus: Arc<EventBus>,
        bus_publisher: Arc<dyn BusPublisher>,
        config: WorkCoordinatorConfig,
    ) -> Self {
        Self {
            project_id: project_id.into(),
            config,
            bus,
            bus_publisher,
            items: RwLock::new(HashMap::new()),
        }
    }

    fn emit(&self, payload: EventPayload) {
        self.bus.publish(Event::new(self.project_id.clone(), payload));
    }

    /// Generates a fresh id, creates the item pending, emits `work:submitted`.
    pub fn submit_work(&self, req: SubmitWorkRequest) -> String {
        let id = new_id();
        let task_id = req.task_id.unwrap_or_else(new_id);
        let priority = req.priority.unwrap_or(5).clamp(1, 10);
        let now = Utc::now();
        let item = WorkItem {
            id: id.clone(),
            task_id: task_id.clone(),
            description: req.description,
            capability: req.capability.clone(),
            boundary: req.boundary.clone(),
            priority,
            deadline: req.deadline,
            context_data: req.context_data,
            status: WorkStatus::Pending,
            offered_at: now,
            assigned_at: None,
            assigned_to: None,
            attempts: 0,
            progress: 0,
            result: None,
            error: None,
        };
        self.items.write().expect("work coordinator lock poisoned").insert(id.clone(), item);
        debug!(work_item_id = %id, "work submitted");
        self.emit(EventPayload::WorkSubmitted {
            work_item_id: id.clone(),
            capability: req.capability,
            boundary: req.boundary,
            task_id,
            priority,
        });
        id
    }

    pub fn get(&self, id: &str) -> Option<WorkItem> {
        self.items.read().expect("work coordinator lock poisoned").get(id).cloned()
    }

    /// Succeeds only if status is `pending`.
    pub fn record_claim(&self, id: &str, agent_guid: &str, agents: &dyn AgentLookup) -> bool {
        let (capability, boundary, task_id) = {
            let mut items = self.items.write().expect("work coordinator lock poisoned");
            let Some(item) = items.get_mut(id) else { return false };
            if item.status != WorkStatus::Pending {
                return false;
            }
            item.status = WorkStatus::Assigned;
            item.assigned_to = Some(agent_guid.to_string());
            item.assigned_at = Some(Utc::now());
            item.attempts += 1;
            (item.capability.clone(), item.boundary.clone(), item.task_id.clone())
        };
        self.emit(EventPayload::WorkAssigned {
            work_item_id: id.to_string(),
            assigned_to: agent_guid.to_string(),
            assigned_to_agent: agents.resolve_summary(agent_guid),
            capability,
            boundary,
            task_id,
        });
        true
    }

    /// Requires status = `assigned`.
    pub fn start_work(&self, id: &str) -> bool {
        let (capability, boundary, task_id) = {
            let mut items = self.items.write().expect("work coordinator lock poisoned");
            let Some(item) = items.get_mut(id) else { return false };
            if item.status != WorkStatus::Assigned {
                return false;
            }
            item.status = WorkStatus::InProgress;
            (item.capability.clone(), item.boundary.clone(), item.task_id.clone())
        };
        self.emit(EventPayload::WorkStarted { work_item_id: id.to_string(), capability, boundary, task_id });
        true
    }

    /// Requires status ∈ {assigned, in-progress}. Clamps progress to [0,100].
    pub fn update_progress(&self, id: &str, progress: i32) -> bool {
        let (capability, boundary, task_id, clamped) = {
            let mut items = self.items.write().expect("work coordinator lock poisoned");
            let Some(item) = items.get_mut(id) else { return false };
            if !matches!(item.status, WorkStatus::Assigned | WorkStatus::InProgress) {
                return false;
            }
            let clamped = progress.clamp(0, 100) as u8;
            item.progress = clamped;
            (item.capability.clone(), item.boundary.clone(), item.task_id.clone(), clamped)
        };
        self.emit(EventPayload::WorkProgress { work_item_id: id.to_string(), progress: clamped, capability, boundary, task_id });
        true
    }

    /// Permitted from any non-terminal state, including `pending` — the
    /// coordinator accepts out-of-order completion from a worker that
    /// skipped explicit `start`.
    pub fn record_completion(&self, id: &str, output: serde_json::Value, summary: Option<String>) -> bool {
        let item = {
            let mut items = self.items.write().expect("work coordinator lock poisoned");
            let Some(item) = items.get_mut(id) else { return false };
            if item.status.is_terminal() {
                return false;
            }
            item.status = WorkStatus::Completed;
            item.progress = 100;
            item.result = Some(WorkResult { summary: summary.clone(), output, completed_at: Utc::now() });
            item.clone()
        };
        self.emit(EventPayload::WorkCompleted {
            work_item_id: id.to_string(),
            summary,
            capability: item.capability.clone(),
            boundary: item.boundary.clone(),
            task_id: item.task_id.clone(),
        });
        self.bus_publisher.publish_work_completed(&self.project_id, &item);
        true
    }

    pub fn record_error(&self, id: &str, message: String, recoverable: bool) -> bool {
        let item = {
            let mut items = self.items.write().expect("work coordinator lock poisoned");
            let Some(item) = items.get_mut(id) else { return false };
            if item.status.is_terminal() {
                return false;
            }
            item.status = WorkStatus::Failed;
            item.error = Some(WorkError { message: message.clone(), recoverable, occurred_at: Utc::now() });
            item.clone()
        };
        self.emit(EventPayload::WorkFailed {
            work_item_id: id.to_string(),
            message,
            recoverable,
            capability: item.capability.clone(),
            boundary: item.boundary.clone(),
            task_id: item.task_id.clone(),
        });
        self.bus_publisher.publish_work_error(&self.project_id, &item, item.error.as_ref().expect("error just set"));
        true
    }

    /// Permitted from any non-terminal state; terminal states reject.
    pub fn cancel_work(&self, id: &str) -> bool {
        let (capability, boundary, task_id) = {
            let mut items = self.items.write().expect("work coordinator lock poisoned");
            let Some(item) = items.get_mut(id) else { return false };
            if item.status.is_terminal() {
                return false;
            }
            item.status = WorkStatus::Cancelled;
            (item.capability.clone(), item.boundary.clone(), item.task_id.clone())
        };
        self.emit(EventPayload::WorkCancelled { work_item_id: id.to_string(), capability, boundary, task_id });
        true
    }

    /// Pending items matching `capability`, ordered by (priority desc,
    /// offeredAt asc). No side effect — dispatch is pull-based.
    pub fn get_pending_work(&self, capability: &str) -> Vec<WorkItem> {
        let items = self.items.read().expect("work coordinator lock poisoned");
        let mut pending: Vec<WorkItem> = items
            .values()
            .filter(|i| i.status == WorkStatus::Pending && i.capability == capability)
            .cloned()
            .collect();
        pending.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.offered_at.cmp(&b.offered_at)));
        pending
    }

    /// All items, for listing adapters to filter/paginate over.
    pub fn list_all(&self) -> Vec<WorkItem> {
        let items = self.items.read().expect("work coordinator lock poisoned");
        let mut all: Vec<WorkItem> = items.values().cloned().collect();
        all.sort_by(|a, b| a.offered_at.cmp(&b.offered_at));
        all
    }

    pub fn stats(&self) -> WorkStats {
        let items = self.items.read().expect("work coordinator lock poisoned");
        let mut stats = WorkStats::default();
        stats.total = items.len();
        for item in items.values() {
            match item.status {
                WorkStatus::Pending => stats.pending += 1,
                WorkStatus::Assigned | WorkStatus::InProgress => stats.active += 1,
                WorkStatus::Completed => stats.completed += 1,
                WorkStatus::Failed | WorkStatus::Cancelled => stats.failed += 1,
            }
        }
        stats
    }

    /// Two passes: reset stale `assigned` items to `pending`
    /// silently (no event, attempts preserved); evict terminal items older
    /// than 2× the stale threshold.
    pub fn reap(&self, now: DateTime<Utc>) {
        let stale_after = Duration::milliseconds(self.config.stale_threshold_ms);
        let evict_after = Duration::milliseconds(self.config.stale_threshold_ms * 2);
        let mut items = self.items.write().expect("work coordinator lock poisoned");

        for item in items.values_mut() {
            if item.status == WorkStatus::Assigned {
                if let Some(assigned_at) = item.assigned_at {
                    if now - assigned_at > stale_after {
                        item.status = WorkStatus::Pending;
                        item.assigned_to = None;
                        item.assigned_at = None;
                        debug!(work_item_id = %item.id, "stale-reset to pending");
                    }
                }
            }
        }

        items.retain(|_, item| {
            if !item.status.is_terminal() {
                return true;
            }
            let reference = item.result.as_ref().map(|r| r.completed_at).or_else(|| item.error.as_ref().map(|e| e.occurred_at));
            match reference {
                Some(t) if now - t > evict_after => false,
                _ => true,
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus_adapter::NoopBus;
    use crate::model::SubmitWorkRequest;

    struct NoAgents;
    impl AgentLookup for NoAgents {
        fn resolve_summary(&self, _guid: &str) -> Option<AgentSummary> {
            None
        }
    }

    fn req() -> SubmitWorkRequest {
        SubmitWorkRequest {
            task_id: Some("T1".into()),
            description: "d".into(),
            capability: "typescript".into(),
            boundary: "personal".into(),
            priority: Some(5),
            deadline: None,
            context_data: Default::default(),
            preferred_agent_type: None,
            required_agent_type: None,
        }
    }

    #[test]
    fn happy_path_lifecycle() {
        let bus = Arc::new(EventBus::new());
        let wc = WorkCoordinator::new("p1", bus, Arc::new(NoopBus), WorkCoordinatorConfig::default());
        let id = wc.submit_work(req());
        assert!(wc.record_claim(&id, "A1", &NoAgents));
        assert!(wc.start_work(&id));
        assert!(wc.update_progress(&id, 50));
        assert!(wc.record_completion(&id, serde_json::json!({"ok": true}), Some("done".into())));
        let item = wc.get(&id).unwrap();
        assert_eq!(item.status, WorkStatus::Completed);
        assert_eq!(item.attempts, 1);
        assert_eq!(item.progress, 100);
    }

    #[test]
    fn double_claim_fails() {
        let bus = Arc::new(EventBus::new());
        let wc = WorkCoordinator::new("p1", bus, Arc::new(NoopBus), WorkCoordinatorConfig::default());
        let id = wc.submit_work(req());
        assert!(wc.record_claim(&id, "A1", &NoAgents));
        assert!(!wc.record_claim(&id, "A2", &NoAgents));
        assert_eq!(wc.get(&id).unwrap().assigned_to, Some("A1".to_string()));
    }

    #[test]
    fn stale_reset_then_reclaim() {
        let bus = Arc::new(EventBus::new());
        let wc = WorkCoordinator::new(
            "p1",
            bus,
            Arc::new(NoopBus),
            WorkCoordinatorConfig { stale_threshold_ms: 100, cleanup_interval_ms: 50 },
        );
        let id = wc.submit_work(req());
        assert!(wc.record_claim(&id, "A3", &NoAgents));
        let future = Utc::now() + Duration::milliseconds(250);
        wc.reap(future);
        let item = wc.get(&id).unwrap();
        assert_eq!(item.status, WorkStatus::Pending);
        assert!(item.assigned_to.is_none());
        assert_eq!(item.attempts, 1);

        assert!(wc.record_claim(&id, "A4", &NoAgents));
        assert_eq!(wc.get(&id).unwrap().attempts, 2);
    }

    #[test]
    fn cancel_from_non_terminal_succeeds_terminal_rejects() {
        let bus = Arc::new(EventBus::new());
        let wc = WorkCoordinator::new("p1", bus, Arc::new(NoopBus), WorkCoordinatorConfig::default());
        let id = wc.submit_work(req());
        assert!(wc.cancel_work(&id));
        assert!(!wc.cancel_work(&id));
    }

    #[test]
    fn completion_accepted_from_pending() {
        let bus = Arc::new(EventBus::new());
        let wc = WorkCoordinator::new("p1", bus, Arc::new(NoopBus), WorkCoordinatorConfig::default());
        let id = wc.submit_work(req());
        assert!(wc.record_completion(&id, serde_json::json!({}), None));
    }

    #[test]
    fn progress_is_clamped() {
        let bus = Arc::new(EventBus::new());
        let wc = WorkCoordinator::new("p1", bus, Arc::new(NoopBus), WorkCoordinatorConfig::default());
        let id = wc.submit_work(req());
        wc.record_claim(&id, "A1", &NoAgents);
        wc.update_progress(&id, 500);
        assert_eq!(wc.get(&id).unwrap().progress, 100);
        wc.update_progress(&id, -20);
        assert_eq!(wc.get(&id).unwrap().progress, 0);
    }
}
