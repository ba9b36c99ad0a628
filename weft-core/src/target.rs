//! Target Registry: declarative spin-up targets, CRUD, health
//! tracking, and the spin-up lifecycle.

use crate::event::{Event, EventBus, EventPayload};
use crate::model::{AgentSummary, AgentType, SpinUpOutcome, SpinUpRecord, Target, TargetHealth, TargetId, TargetStats, TargetStatus};
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

/// External spin-up mechanism (SSH/Kubernetes/local/webhook), kept external
/// by design. Implementations report completion by calling
/// `TargetRegistry::record_spin_up_outcome`; if they never do, `lastSpinUp`
/// stays in its previous state.
pub trait SpinUpMechanism: Send + Sync {
    fn trigger(&self, target: &Target, work_item_id: Option<&str>);
}

#[derive(Default)]
struct Inner {
    by_id: HashMap<TargetId, Target>,
    name_to_id: HashMap<String, TargetId>,
}

pub struct TargetRegistry {
    project_id: String,
    bus: Arc<EventBus>,
    inner: RwLock<Inner>,
}

impl TargetRegistry {
    pub fn new(project_id: impl Into<String>, bus: Arc<EventBus>) -> Self {
        Self {
            project_id: project_id.into(),
            bus,
            inner: RwLock::new(Inner::default()),
        }
    }

    fn emit(&self, payload: EventPayload) {
        self.bus.publish(Event::new(self.project_id.clone(), payload));
    }

    pub fn register(
        &self,
        target_id: TargetId,
        target_name: String,
        agent_type: AgentType,
        capabilities: HashSet<String>,
        boundaries: HashSet<String>,
        mechanism: String,
    ) -> Target {
        let target = Target {
            target_id: target_id.clone(),
            target_name: target_name.clone(),
            agent_type,
            capabilities: capabilities.clone(),
            boundaries: boundaries.clone(),
            mechanism: mechanism.clone(),
            status: TargetStatus::Available,
            health: TargetHealth::Unknown,
            last_spin_up: None,
        };
        {
            let mut inner = self.inner.write().expect("target registry lock poisoned");
            inner.name_to_id.insert(target_name, target_id.clone());
            inner.by_id.insert(target_id.clone(), target.clone());
        }
        self.emit(EventPayload::TargetRegistered {
            target_id,
            agent_type,
            mechanism,
            capabilities: capabilities.into_iter().collect(),
            boundaries: boundaries.into_iter().collect(),
        });
        target
    }

    pub fn get(&self, id_or_name: &str) -> Option<Target> {
        let inner = self.inner.read().expect("target registry lock poisoned");
        inner
            .by_id
            .get(id_or_name)
            .or_else(|| inner.name_to_id.get(id_or_name).and_then(|id| inner.by_id.get(id)))
            .cloned()
    }

    fn resolve_id(&self, id_or_name: &str) -> Option<TargetId> {
        let inner = self.inner.read().expect("target registry lock poisoned");
        if inner.by_id.contains_key(id_or_name) {
            Some(id_or_name.to_string())
        } else {
            inner.name_to_id.get(id_or_name).cloned()
        }
    }

    pub fn list(&self) -> Vec<Target> {
        let inner = self.inner.read().expect("target registry lock poisoned");
        let mut all: Vec<Target> = inner.by_id.values().cloned().collect();
        all.sort_by(|a, b| a.target_id.cmp(&b.target_id));
        all
    }

    fn update_status(&self, id: &str, status: TargetStatus) -> Option<Target> {
        let mut inner = self.inner.write().expect("target registry lock poisoned");
        let target = inner.by_id.get_mut(id)?;
        target.status = status;
        Some(target.clone())
    }

    pub fn enable(&self, id_or_name: &str) -> bool {
        let Some(id) = self.resolve_id(id_or_name) else { return false };
        let Some(target) = self.update_status(&id, TargetStatus::Available) else { return false };
        self.emit(EventPayload::TargetUpdated {
            target_id: target.target_id,
            new_status: TargetStatus::Available,
            agent_type: target.agent_type,
            mechanism: target.mechanism,
            capabilities: target.capabilities.into_iter().collect(),
            boundaries: target.boundaries.into_iter().collect(),
        });
        true
    }

    /// Disabled targets are never selected for spin-up.
    pub fn disable(&self, id_or_name: &str) -> bool {
        let Some(id) = self.resolve_id(id_or_name) else { return false };
        let Some(target) = self.update_status(&id, TargetStatus::Disabled) else { return false };
        self.emit(EventPayload::TargetDisabled {
            target_id: target.target_id,
            agent_type: target.agent_type,
            mechanism: target.mechanism,
        });
        true
    }

    pub fn remove(&self, id_or_name: &str) -> bool {
        let Some(id) = self.resolve_id(id_or_name) else { return false };
        let removed = {
            let mut inner = self.inner.write().expect("target registry lock poisoned");
            let removed = inner.by_id.remove(&id);
            if removed.is_some() {
                inner.name_to_id.retain(|_, v| v != &id);
            }
            removed
        };
        if removed.is_none() {
            return false;
        }
        self.emit(EventPayload::TargetRemoved { target_id: id });
        true
    }

    /// Health transitions emit only when the new value differs.
    pub fn set_health(&self, id_or_name: &str, health: TargetHealth) -> bool {
        let Some(id) = self.resolve_id(id_or_name) else { return false };
        let changed = {
            let mut inner = self.inner.write().expect("target registry lock poisoned");
            let Some(target) = inner.by_id.get_mut(&id) else { return false };
            if target.health == health {
                false
            } else {
                target.health = health;
                true
            }
        };
        if changed {
            let target = self.get(&id).expect("target present after health update");
            self.emit(EventPayload::TargetHealthChanged {
                target_id: id,
                health,
                agent_type: target.agent_type,
                mechanism: target.mechanism,
            });
        }
        true
    }

    /// Emits `spin-up:triggered` and invokes the mechanism; the mechanism
    /// reports completion asynchronously via `record_spin_up_outcome`.
    pub fn trigger_spin_up(&self, id_or_name: &str, work_item_id: Option<&str>, mechanism: &dyn SpinUpMechanism) -> bool {
        let Some(target) = self.get(id_or_name) else { return false };
        if target.status == TargetStatus::Disabled {
            return false;
        }
        self.emit(EventPayload::SpinUpTriggered {
            target_id: target.target_id.clone(),
            agent_type: target.agent_type,
            mechanism: target.mechanism.clone(),
        });
        self.emit(EventPayload::SpinUpStarted {
            target_id: target.target_id.clone(),
            agent_type: target.agent_type,
            mechanism: target.mechanism.clone(),
        });
        mechanism.trigger(&target, work_item_id);
        true
    }

    pub fn record_spin_up_outcome(
        &self,
        id_or_name: &str,
        outcome: SpinUpOutcome,
        agent: Option<AgentSummary>,
        work_item_id: Option<String>,
        error: Option<String>,
    ) -> bool {
        let Some(id) = self.resolve_id(id_or_name) else { return false };
        let target = {
            let mut inner = self.inner.write().expect("target registry lock poisoned");
            let Some(target) = inner.by_id.get_mut(&id) else { return false };
            target.last_spin_up = Some(SpinUpRecord {
                at: Utc::now(),
                outcome,
                agent: agent.clone(),
                work_item_id: work_item_id.clone(),
                error: error.clone(),
            });
            target.clone()
        };
        match outcome {
            SpinUpOutcome::Success => self.emit(EventPayload::SpinUpCompleted {
                target_id: id,
                agent,
                agent_type: target.agent_type,
                mechanism: target.mechanism,
            }),
            SpinUpOutcome::Failure => self.emit(EventPayload::SpinUpFailed {
                target_id: id,
                error: error.unwrap_or_default(),
                agent_type: target.agent_type,
                mechanism: target.mechanism,
                outcome,
            }),
        }
        true
    }

    pub fn stats(&self) -> TargetStats {
        let inner = self.inner.read().expect("target registry lock poisoned");
        let mut stats = TargetStats::default();
        stats.total = inner.by_id.len();
        for target in inner.by_id.values() {
            match target.status {
                TargetStatus::Available => stats.available += 1,
                TargetStatus::InUse => stats.in_use += 1,
                TargetStatus::Disabled => stats.disabled += 1,
            }
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoopMechanism;
    impl SpinUpMechanism for NoopMechanism {
        fn trigger(&self, _target: &Target, _work_item_id: Option<&str>) {}
    }

    #[test]
    fn disabled_target_rejects_spin_up() {
        let bus = Arc::new(EventBus::new());
        let reg = TargetRegistry::new("p1", bus);
        reg.register("t1".into(), "name".into(), AgentType::ClaudeCode, HashSet::new(), HashSet::new(), "ssh".into());
        reg.disable("t1");
        assert!(!reg.trigger_spin_up("t1", None, &NoopMechanism));
    }

    #[test]
    fn health_change_emits_once() {
        let bus = Arc::new(EventBus::new());
        let reg = TargetRegistry::new("p1", bus);
        reg.register("t1".into(), "name".into(), AgentType::ClaudeCode, HashSet::new(), HashSet::new(), "ssh".into());
        assert!(reg.set_health("t1", TargetHealth::Healthy));
        assert!(reg.set_health("t1", TargetHealth::Healthy));
        assert_eq!(reg.get("t1").unwrap().health, TargetHealth::Healthy);
    }

    #[test]
    fn lookup_by_name_and_id() {
        let bus = Arc::new(EventBus::new());
        let reg = TargetRegistry::new("p1", bus);
        reg.register("t1".into(), "nice-name".into(), AgentType::ClaudeCode, HashSet::new(), HashSet::new(), "ssh".into());
        assert!(reg.get("t1").is_some());
        assert!(reg.get("nice-name").is_some());
    }
}
