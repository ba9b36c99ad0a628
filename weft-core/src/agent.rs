//! Agent Registry: live agent records, lookups, and the
//! registry-owned agent lifecycle events.

use crate::event::{Event, EventBus, EventPayload};
use crate::model::{Agent, AgentGuid, AgentStats, AgentStatus, AgentSummary, AgentType};
use crate::work::AgentLookup;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

#[derive(Clone, Debug, Default)]
pub struct AgentFilter {
    pub agent_type: Option<AgentType>,
    pub status: Option<AgentStatus>,
    pub capability: Option<String>,
}

pub struct AgentRegistry {
    project_id: String,
    bus: Arc<EventBus>,
    agents: RwLock<HashMap<AgentGuid, Agent>>,
}

impl AgentRegistry {
    pub fn new(project_id: impl Into<String>, bus: Arc<EventBus>) -> Self {
        Self {
            project_id: project_id.into(),
            bus,
            agents: RwLock::new(HashMap::new()),
        }
    }

    fn emit(&self, payload: EventPayload) {
        self.bus.publish(Event::new(self.project_id.clone(), payload));
    }

    pub fn register(
        &self,
        guid: AgentGuid,
        handle: String,
        agent_type: AgentType,
        hostname: String,
        capabilities: HashSet<String>,
        boundaries: HashSet<String>,
    ) -> Agent {
        let agent = Agent {
            guid: guid.clone(),
            handle,
            agent_type,
            hostname,
            capabilities: capabilities.clone(),
            boundaries: boundaries.clone(),
            status: AgentStatus::Online,
            current_task_count: 0,
        };
        self.agents.write().expect("agent registry lock poisoned").insert(guid, agent.clone());
        self.emit(EventPayload::AgentRegistered {
            agent: agent.summary(),
            status: agent.status,
            capabilities: capabilities.into_iter().collect(),
            boundaries: boundaries.into_iter().collect(),
        });
        agent
    }

    pub fn update_status(&self, guid: &str, status: AgentStatus, current_task_count: Option<u32>) -> bool {
        let agent = {
            let mut agents = self.agents.write().expect("agent registry lock poisoned");
            let Some(agent) = agents.get_mut(guid) else { return false };
            agent.status = status;
            if let Some(count) = current_task_count {
                agent.current_task_count = count;
            }
            agent.clone()
        };
        self.emit(EventPayload::AgentUpdated {
            agent: agent.summary(),
            new_status: status,
            capabilities: agent.capabilities.into_iter().collect(),
            boundaries: agent.boundaries.into_iter().collect(),
        });
        true
    }

    /// Graceful shutdown emits an `agent:updated` transition to `offline`
    /// before the removal event, so subscribers see the agent wind down
    /// rather than disappear mid-task. Non-graceful skips straight to
    /// `agent:shutdown`.
    pub fn shutdown(&self, guid: &str, graceful: bool) -> bool {
        if graceful {
            self.update_status(guid, AgentStatus::Offline, None);
        }
        let removed = self.agents.write().expect("agent registry lock poisoned").remove(guid);
        let Some(agent) = removed else { return false };
        self.emit(EventPayload::AgentShutdown { agent: agent.summary() });
        true
    }

    pub fn get_by_guid(&self, guid: &str) -> Option<Agent> {
        self.agents.read().expect("agent registry lock poisoned").get(guid).cloned()
    }

    pub fn list(&self, filter: &AgentFilter) -> Vec<Agent> {
        let agents = self.agents.read().expect("agent registry lock poisoned");
        let mut matched: Vec<Agent> = agents
            .values()
            .filter(|a| filter.agent_type.is_none_or(|t| t == a.agent_type))
            .filter(|a| filter.status.is_none_or(|s| s == a.status))
            .filter(|a| filter.capability.as_ref().is_none_or(|c| a.capabilities.contains(c)))
            .cloned()
            .collect();
        matched.sort_by(|a, b| a.guid.cmp(&b.guid));
        matched
    }

    pub fn stats(&self) -> AgentStats {
        let agents = self.agents.read().expect("agent registry lock poisoned");
        let mut stats = AgentStats::default();
        stats.total = agents.len();
        for t in ["copilot-cli", "claude-code"] {
            stats.by_type.insert(t.to_string(), 0);
        }
        for s in ["online", "busy", "offline"] {
            stats.by_status.insert(s.to_string(), 0);
        }
        for agent in agents.values() {
            let type_key = match agent.agent_type {
                AgentType::CopilotCli => "copilot-cli",
                AgentType::ClaudeCode => "claude-code",
            };
            *stats.by_type.entry(type_key.to_string()).or_insert(0) += 1;
            let status_key = match agent.status {
                AgentStatus::Online => "online",
                AgentStatus::Busy => "busy",
                AgentStatus::Offline => "offline",
            };
            *stats.by_status.entry(status_key.to_string()).or_insert(0) += 1;
        }
        stats
    }
}

impl AgentLookup for AgentRegistry {
    fn resolve_summary(&self, guid: &str) -> Option<AgentSummary> {
        self.get_by_guid(guid).map(|a| a.summary())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_then_lookup() {
        let bus = Arc::new(EventBus::new());
        let reg = AgentRegistry::new("p1", bus);
        reg.register(
            "g1".into(),
            "worker-1".into(),
            AgentType::ClaudeCode,
            "host".into(),
            ["typescript".to_string()].into_iter().collect(),
            HashSet::new(),
        );
        assert!(reg.get_by_guid("g1").is_some());
        assert_eq!(reg.resolve_summary("g1").unwrap().guid, "g1");
        assert!(reg.resolve_summary("missing").is_none());
    }

    #[test]
    fn shutdown_removes_agent() {
        let bus = Arc::new(EventBus::new());
        let reg = AgentRegistry::new("p1", bus);
        reg.register("g1".into(), "w".into(), AgentType::ClaudeCode, "h".into(), HashSet::new(), HashSet::new());
        assert!(reg.shutdown("g1", true));
        assert!(reg.get_by_guid("g1").is_none());
        assert!(!reg.shutdown("g1", true));
    }
}
