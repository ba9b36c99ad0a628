//! Project Manager: lazy, single-flight creation of per-project
//! contexts, and multi-tenant isolation.

use crate::agent::AgentRegistry;
use crate::bus_adapter::BusPublisher;
use crate::event::{Event, EventBus, EventListener};
use crate::hub::Hub;
use crate::subscription::SubscriptionRegistry;
use crate::target::TargetRegistry;
use crate::work::{WorkCoordinator, WorkCoordinatorConfig};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tokio::sync::{Mutex, Notify};
use tracing::info;

struct HubListener(Arc<Hub>);

impl EventListener for HubListener {
    fn on_event(&self, event: &Event) {
        self.0.dispatch_event(event);
    }
}

/// The per-tenant bundle: one Work Coordinator, one Agent Registry, one
/// Target Registry, one WebSocket Hub, sharing an Event Bus.
pub struct ProjectContext {
    pub project_id: String,
    pub bus: Arc<EventBus>,
    pub work: WorkCoordinator,
    pub agents: AgentRegistry,
    pub targets: TargetRegistry,
    pub subscriptions: Arc<SubscriptionRegistry>,
    pub hub: Arc<Hub>,
    last_activity_at: RwLock<DateTime<Utc>>,
}

impl ProjectContext {
    fn new(project_id: String, bus_publisher: Arc<dyn BusPublisher>, config: WorkCoordinatorConfig) -> Self {
        let bus = Arc::new(EventBus::new());
        let subscriptions = Arc::new(SubscriptionRegistry::new());
        let hub = Arc::new(Hub::new(subscriptions.clone()));
        bus.subscribe(Arc::new(HubListener(hub.clone())));
        Self {
            work: WorkCoordinator::new(project_id.clone(), bus.clone(), bus_publisher, config),
            agents: AgentRegistry::new(project_id.clone(), bus.clone()),
            targets: TargetRegistry::new(project_id.clone(), bus.clone()),
            subscriptions,
            hub,
            bus,
            project_id,
            last_activity_at: RwLock::new(Utc::now()),
        }
    }

    pub fn touch(&self) {
        *self.last_activity_at.write().expect("project context lock poisoned") = Utc::now();
    }

    pub fn last_activity_at(&self) -> DateTime<Utc> {
        *self.last_activity_at.read().expect("project context lock poisoned")
    }

    /// The aggregate snapshot shape: `{agents, work, targets, websocket}`.
    pub fn stats_snapshot(&self) -> serde_json::Value {
        serde_json::json!({
            "agents": self.agents.stats(),
            "work": self.work.stats(),
            "targets": self.targets.stats(),
            "websocket": {
                "connections": self.hub.connection_count(),
                "subscriptions": self.subscriptions.subscription_count(),
            },
        })
    }
}

pub struct ProjectManager {
    projects: RwLock<HashMap<String, Arc<ProjectContext>>>,
    pending: Mutex<HashMap<String, Arc<Notify>>>,
    work_config: WorkCoordinatorConfig,
    bus_publisher: Arc<dyn BusPublisher>,
}

impl ProjectManager {
    pub fn new(work_config: WorkCoordinatorConfig, bus_publisher: Arc<dyn BusPublisher>) -> Self {
        Self {
            projects: RwLock::new(HashMap::new()),
            pending: Mutex::new(HashMap::new()),
            work_config,
            bus_publisher,
        }
    }

    /// Concurrent callers for the same new `project_id` observe exactly one
    /// context creation: a newcomer either sees a completed entry or awaits
    /// the in-flight one.
    pub async fn get_or_create(&self, project_id: &str) -> Arc<ProjectContext> {
        if let Some(ctx) = self.projects.read().expect("project manager lock poisoned").get(project_id) {
            ctx.touch();
            return ctx.clone();
        }

        loop {
            let maybe_notify = {
                let mut pending = self.pending.lock().await;
                if let Some(ctx) = self.projects.read().expect("project manager lock poisoned").get(project_id) {
                    ctx.touch();
                    return ctx.clone();
                }
                if let Some(existing) = pending.get(project_id) {
                    Some(existing.clone())
                } else {
                    pending.insert(project_id.to_string(), Arc::new(Notify::new()));
                    None
                }
            };

            match maybe_notify {
                Some(notify) => {
                    notify.notified().await;
                    // loop back around: the creator has published by now
                }
                None => {
                    info!(project_id, "creating project context");
                    let ctx = Arc::new(ProjectContext::new(project_id.to_string(), self.bus_publisher.clone(), self.work_config));
                    self.projects
                        .write()
                        .expect("project manager lock poisoned")
                        .insert(project_id.to_string(), ctx.clone());
                    let notify = {
                        let mut pending = self.pending.lock().await;
                        pending.remove(project_id)
                    };
                    if let Some(notify) = notify {
                        notify.notify_waiters();
                    }
                    return ctx;
                }
            }
        }
    }

    pub fn get(&self, project_id: &str) -> Option<Arc<ProjectContext>> {
        self.projects.read().expect("project manager lock poisoned").get(project_id).cloned()
    }

    pub fn list_ids(&self) -> Vec<String> {
        self.projects.read().expect("project manager lock poisoned").keys().cloned().collect()
    }

    pub async fn shutdown(&self) {
        self.projects.write().expect("project manager lock poisoned").clear();
        self.pending.lock().await.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lazy_creation_is_idempotent() {
        let pm = ProjectManager::new(WorkCoordinatorConfig::default(), Arc::new(crate::bus_adapter::NoopBus));
        let a = pm.get_or_create("proj1").await;
        let b = pm.get_or_create("proj1").await;
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_context() {
        let pm = Arc::new(ProjectManager::new(WorkCoordinatorConfig::default(), Arc::new(crate::bus_adapter::NoopBus)));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let pm = pm.clone();
            handles.push(tokio::spawn(async move { pm.get_or_create("shared").await }));
        }
        let mut ctxs = Vec::new();
        for h in handles {
            ctxs.push(h.await.unwrap());
        }
        for ctx in &ctxs[1..] {
            assert!(Arc::ptr_eq(&ctxs[0], ctx));
        }
    }

    #[tokio::test]
    async fn project_isolation() {
        let pm = ProjectManager::new(WorkCoordinatorConfig::default(), Arc::new(crate::bus_adapter::NoopBus));
        let a = pm.get_or_create("a").await;
        let b = pm.get_or_create("b").await;
        a.work.submit_work(crate::model::SubmitWorkRequest {
            task_id: None,
            description: "x".into(),
            capability: "c".into(),
            boundary: "b".into(),
            priority: None,
            deadline: None,
            context_data: Default::default(),
            preferred_agent_type: None,
            required_agent_type: None,
        });
        assert_eq!(a.work.list_all().len(), 1);
        assert_eq!(b.work.list_all().len(), 0);
    }
}
