//! Subscription Registry: per-connection topic+filter records
//! and the matchers used to fan out coordinator events to WebSocket
//! subscribers.

use crate::error::{Result, WeftError};
use crate::event::Event;
use crate::model::{AgentType, TargetStatus};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::RwLock;

pub type ConnectionId = String;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Topic {
    Work,
    Agents,
    Targets,
    Stats,
}

impl Topic {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "work" => Some(Topic::Work),
            "agents" => Some(Topic::Agents),
            "targets" => Some(Topic::Targets),
            "stats" => Some(Topic::Stats),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Topic::Work => "work",
            Topic::Agents => "agents",
            Topic::Targets => "targets",
            Topic::Stats => "stats",
        }
    }
}

/// Conjunction of equality predicates over event fields. `None` filter ⇒
/// match everything on the topic. Missing keys default to "accept".
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Filter(pub BTreeMap<String, String>);

impl Filter {
    fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(|s| s.as_str())
    }

    /// Conjunction match against a work event. A predicate absent from the
    /// filter always accepts.
    fn matches_work(&self, event: &Event) -> bool {
        use crate::event::EventPayload::*;
        let (capability, boundary, task_id, assigned_to) = match &event.payload {
            WorkSubmitted { capability, boundary, task_id, .. } => (capability, boundary, task_id, None),
            WorkAssigned { capability, boundary, task_id, assigned_to, .. } => (capability, boundary, task_id, Some(assigned_to.as_str())),
            WorkStarted { capability, boundary, task_id, .. } => (capability, boundary, task_id, None),
            WorkProgress { capability, boundary, task_id, .. } => (capability, boundary, task_id, None),
            WorkCompleted { capability, boundary, task_id, .. } => (capability, boundary, task_id, None),
            WorkFailed { capability, boundary, task_id, .. } => (capability, boundary, task_id, None),
            WorkCancelled { capability, boundary, task_id, .. } => (capability, boundary, task_id, None),
            _ => return false,
        };
        if let Some(want) = self.get("status") {
            let bucket = event.payload.work_status_bucket();
            if bucket.map(|b| b.as_str()) != Some(want) {
                return false;
            }
        }
        if let Some(want) = self.get("capability") {
            if want != capability {
                return false;
            }
        }
        if let Some(want) = self.get("boundary") {
            if want != boundary {
                return false;
            }
        }
        if let Some(want) = self.get("taskId") {
            if want != task_id {
                return false;
            }
        }
        if let Some(want) = self.get("assignedTo") {
            if assigned_to != Some(want) {
                return false;
            }
        }
        true
    }

    fn matches_agents(&self, event: &Event) -> bool {
        use crate::event::EventPayload::*;
        let (summary, effective_status, capabilities, boundaries): (_, &str, &[String], &[String]) = match &event.payload {
            AgentRegistered { agent, status, capabilities, boundaries } => (agent, status_str(*status), capabilities, boundaries),
            AgentUpdated { agent, new_status, capabilities, boundaries } => (agent, status_str(*new_status), capabilities, boundaries),
            AgentShutdown { agent } => (agent, "offline", &[], &[]),
            _ => return false,
        };
        if let Some(want) = self.get("agentType") {
            if !agent_type_matches(want, summary.agent_type) {
                return false;
            }
        }
        if let Some(want) = self.get("status") {
            if want != effective_status {
                return false;
            }
        }
        if let Some(want) = self.get("capability") {
            if !capabilities.iter().any(|c| c == want) {
                return false;
            }
        }
        if let Some(want) = self.get("boundary") {
            if !boundaries.iter().any(|b| b == want) {
                return false;
            }
        }
        if let Some(want) = self.get("guid") {
            if want != summary.guid {
                return false;
            }
        }
        true
    }

    fn matches_targets(&self, event: &Event) -> bool {
        use crate::event::EventPayload::*;
        let (target_id, agent_type, mechanism, status, capabilities, boundaries): (
            &str,
            AgentType,
            &str,
            Option<&str>,
            &[String],
            &[String],
        ) = match &event.payload {
            TargetRegistered { target_id, agent_type, mechanism, capabilities, boundaries } => {
                (target_id, *agent_type, mechanism, Some("available"), capabilities, boundaries)
            }
            TargetUpdated { target_id, new_status, agent_type, mechanism, capabilities, boundaries } => {
                (target_id, *agent_type, mechanism, Some(target_status_str(*new_status)), capabilities, boundaries)
            }
            TargetDisabled { target_id, agent_type, mechanism } => (target_id, *agent_type, mechanism, Some("disabled"), &[], &[]),
            TargetRemoved { target_id } => (target_id, AgentType::ClaudeCode, "", None, &[], &[]),
            TargetHealthChanged { target_id, agent_type, mechanism, .. } => (target_id, *agent_type, mechanism, None, &[], &[]),
            SpinUpTriggered { target_id, agent_type, mechanism } => (target_id, *agent_type, mechanism, None, &[], &[]),
            SpinUpStarted { target_id, agent_type, mechanism } => (target_id, *agent_type, mechanism, None, &[], &[]),
            SpinUpCompleted { target_id, agent_type, mechanism, .. } => (target_id, *agent_type, mechanism, None, &[], &[]),
            SpinUpFailed { target_id, agent_type, mechanism, .. } => (target_id, *agent_type, mechanism, None, &[], &[]),
            _ => return false,
        };
        if let Some(want) = self.get("agentType") {
            if !agent_type_matches(want, agent_type) {
                return false;
            }
        }
        if let Some(want) = self.get("mechanism") {
            if want != mechanism {
                return false;
            }
        }
        if let Some(want) = self.get("targetId") {
            if want != target_id {
                return false;
            }
        }
        if let Some(want) = self.get("status") {
            match status {
                Some(s) if s == want => {}
                _ => return false,
            }
        }
        if let Some(want) = self.get("capability") {
            if !capabilities.iter().any(|c| c == want) {
                return false;
            }
        }
        if let Some(want) = self.get("boundary") {
            if !boundaries.iter().any(|b| b == want) {
                return false;
            }
        }
        true
    }

    pub fn matches(&self, topic: Topic, event: &Event) -> bool {
        match topic {
            Topic::Work => self.matches_work(event),
            Topic::Agents => self.matches_agents(event),
            Topic::Targets => self.matches_targets(event),
            Topic::Stats => true,
        }
    }
}

fn status_str(s: crate::model::AgentStatus) -> &'static str {
    match s {
        crate::model::AgentStatus::Online => "online",
        crate::model::AgentStatus::Busy => "busy",
        crate::model::AgentStatus::Offline => "offline",
    }
}

fn target_status_str(s: TargetStatus) -> &'static str {
    match s {
        TargetStatus::Available => "available",
        TargetStatus::InUse => "in-use",
        TargetStatus::Disabled => "disabled",
    }
}

fn agent_type_matches(want: &str, actual: AgentType) -> bool {
    let actual_str = match actual {
        AgentType::CopilotCli => "copilot-cli",
        AgentType::ClaudeCode => "claude-code",
    };
    want == actual_str
}

#[derive(Clone, Debug)]
pub struct Subscription {
    pub topic: Topic,
    pub filter: Option<Filter>,
    pub subscribed_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Default)]
struct Inner {
    by_connection: HashMap<ConnectionId, HashMap<Topic, Subscription>>,
    by_topic: HashMap<Topic, HashSet<ConnectionId>>,
}

/// At most one subscription per (connectionId, topic); re-subscribing
/// replaces the filter atomically.
#[derive(Default)]
pub struct SubscriptionRegistry {
    inner: RwLock<Inner>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, conn_id: &str, topic: Topic, filter: Option<Filter>) {
        let mut inner = self.inner.write().expect("subscription registry lock poisoned");
        inner
            .by_connection
            .entry(conn_id.to_string())
            .or_default()
            .insert(
                topic,
                Subscription {
                    topic,
                    filter,
                    subscribed_at: chrono::Utc::now(),
                },
            );
        inner.by_topic.entry(topic).or_default().insert(conn_id.to_string());
    }

    pub fn unsubscribe(&self, conn_id: &str, topic: Topic) -> Result<()> {
        let mut inner = self.inner.write().expect("subscription registry lock poisoned");
        let removed = inner
            .by_connection
            .get_mut(conn_id)
            .and_then(|m| m.remove(&topic))
            .is_some();
        if !removed {
            return Err(WeftError::NotFound(format!("not subscribed to topic: {}", topic.as_str())));
        }
        if let Some(set) = inner.by_topic.get_mut(&topic) {
            set.remove(conn_id);
        }
        Ok(())
    }

    pub fn unsubscribe_all(&self, conn_id: &str) {
        let mut inner = self.inner.write().expect("subscription registry lock poisoned");
        if let Some(topics) = inner.by_connection.remove(conn_id) {
            for topic in topics.keys() {
                if let Some(set) = inner.by_topic.get_mut(topic) {
                    set.remove(conn_id);
                }
            }
        }
    }

    /// Connection ids whose subscription for the event's topic matches,
    /// each returned exactly once.
    pub fn fanout(&self, event: &Event) -> Vec<ConnectionId> {
        let Some(topic) = Topic::parse(event.topic()) else {
            return Vec::new();
        };
        let inner = self.inner.read().expect("subscription registry lock poisoned");
        let Some(candidates) = inner.by_topic.get(&topic) else {
            return Vec::new();
        };
        candidates
            .iter()
            .filter(|conn_id| {
                inner
                    .by_connection
                    .get(*conn_id)
                    .and_then(|m| m.get(&topic))
                    .map(|sub| match &sub.filter {
                        None => true,
                        Some(f) => f.matches(topic, event),
                    })
                    .unwrap_or(false)
            })
            .cloned()
            .collect()
    }

    pub fn stats_subscribers(&self) -> Vec<ConnectionId> {
        let inner = self.inner.read().expect("subscription registry lock poisoned");
        inner
            .by_topic
            .get(&Topic::Stats)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn subscription_count(&self) -> usize {
        let inner = self.inner.read().expect("subscription registry lock poisoned");
        inner.by_connection.values().map(|m| m.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventPayload;

    #[test]
    fn replaces_filter_on_resubscribe() {
        let reg = SubscriptionRegistry::new();
        reg.subscribe("c1", Topic::Work, None);
        let mut f = BTreeMap::new();
        f.insert("capability".to_string(), "typescript".to_string());
        reg.subscribe("c1", Topic::Work, Some(Filter(f)));

        let e1 = Event::new("p1", EventPayload::WorkSubmitted {
            work_item_id: "1".into(), capability: "python".into(), boundary: "b".into(), task_id: "t".into(), priority: 5,
        });
        assert!(reg.fanout(&e1).is_empty());
    }

    #[test]
    fn unsubscribe_all_then_unsubscribe_fails() {
        let reg = SubscriptionRegistry::new();
        reg.subscribe("c1", Topic::Work, None);
        reg.unsubscribe_all("c1");
        assert!(reg.unsubscribe("c1", Topic::Work).is_err());
    }

    #[test]
    fn fanout_filters_by_capability() {
        let reg = SubscriptionRegistry::new();
        let mut f = BTreeMap::new();
        f.insert("capability".to_string(), "typescript".to_string());
        reg.subscribe("c1", Topic::Work, Some(Filter(f)));

        for cap in ["typescript", "python", "typescript"] {
            let e = Event::new("p1", EventPayload::WorkSubmitted {
                work_item_id: "x".into(), capability: cap.into(), boundary: "b".into(), task_id: "t".into(), priority: 5,
            });
            let matched = reg.fanout(&e);
            assert_eq!(matched.len(), if cap == "typescript" { 1 } else { 0 });
        }
    }
}
