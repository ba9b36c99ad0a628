//! Event Bus: a synchronous, in-process broadcaster over the
//! closed set of coordinator event kinds.

use crate::model::{AgentStatus, AgentSummary, AgentType, SpinUpOutcome, TargetHealth, TargetStatus, WorkStatus};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, RwLock};
use tracing::warn;

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type")]
pub enum EventPayload {
    #[serde(rename = "work:submitted")]
    #[serde(rename_all = "camelCase")]
    WorkSubmitted { work_item_id: String, capability: String, boundary: String, task_id: String, priority: u8 },
    #[serde(rename = "work:assigned")]
    #[serde(rename_all = "camelCase")]
    WorkAssigned {
        work_item_id: String,
        assigned_to: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        assigned_to_agent: Option<AgentSummary>,
        capability: String,
        boundary: String,
        task_id: String,
    },
    #[serde(rename = "work:started")]
    #[serde(rename_all = "camelCase")]
    WorkStarted { work_item_id: String, capability: String, boundary: String, task_id: String },
    #[serde(rename = "work:progress")]
    #[serde(rename_all = "camelCase")]
    WorkProgress { work_item_id: String, progress: u8, capability: String, boundary: String, task_id: String },
    #[serde(rename = "work:completed")]
    #[serde(rename_all = "camelCase")]
    WorkCompleted {
        work_item_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        summary: Option<String>,
        capability: String,
        boundary: String,
        task_id: String,
    },
    #[serde(rename = "work:failed")]
    #[serde(rename_all = "camelCase")]
    WorkFailed {
        work_item_id: String,
        message: String,
        recoverable: bool,
        capability: String,
        boundary: String,
        task_id: String,
    },
    #[serde(rename = "work:cancelled")]
    #[serde(rename_all = "camelCase")]
    WorkCancelled { work_item_id: String, capability: String, boundary: String, task_id: String },
    #[serde(rename = "agent:registered")]
    #[serde(rename_all = "camelCase")]
    AgentRegistered { agent: AgentSummary, status: AgentStatus, capabilities: Vec<String>, boundaries: Vec<String> },
    #[serde(rename = "agent:updated")]
    #[serde(rename_all = "camelCase")]
    AgentUpdated { agent: AgentSummary, new_status: AgentStatus, capabilities: Vec<String>, boundaries: Vec<String> },
    #[serde(rename = "agent:shutdown")]
    #[serde(rename_all = "camelCase")]
    AgentShutdown { agent: AgentSummary },
    #[serde(rename = "target:registered")]
    #[serde(rename_all = "camelCase")]
    TargetRegistered { target_id: String, agent_type: AgentType, mechanism: String, capabilities: Vec<String>, boundaries: Vec<String> },
    #[serde(rename = "target:updated")]
    #[serde(rename_all = "camelCase")]
    TargetUpdated { target_id: String, new_status: TargetStatus, agent_type: AgentType, mechanism: String, capabilities: Vec<String>, boundaries: Vec<String> },
    #[serde(rename = "target:disabled")]
    #[serde(rename_all = "camelCase")]
    TargetDisabled { target_id: String, agent_type: AgentType, mechanism: String },
    #[serde(rename = "target:removed")]
    #[serde(rename_all = "camelCase")]
    TargetRemoved { target_id: String },
    #[serde(rename = "target:health-changed")]
    #[serde(rename_all = "camelCase")]
    TargetHealthChanged { target_id: String, health: TargetHealth, agent_type: AgentType, mechanism: String },
    #[serde(rename = "spin-up:triggered")]
    #[serde(rename_all = "camelCase")]
    SpinUpTriggered { target_id: String, agent_type: AgentType, mechanism: String },
    #[serde(rename = "spin-up:started")]
    #[serde(rename_all = "camelCase")]
    SpinUpStarted { target_id: String, agent_type: AgentType, mechanism: String },
    #[serde(rename = "spin-up:completed")]
    #[serde(rename_all = "camelCase")]
    SpinUpCompleted { target_id: String, agent: Option<AgentSummary>, agent_type: AgentType, mechanism: String },
    #[serde(rename = "spin-up:failed")]
    #[serde(rename_all = "camelCase")]
    SpinUpFailed { target_id: String, error: String, agent_type: AgentType, mechanism: String, outcome: SpinUpOutcome },
}

impl EventPayload {
    /// `work:*` / `agent:*` / `target:*` / `spin-up:*` — used to derive the
    /// WebSocket fan-out topic by prefix.
    pub fn kind(&self) -> &'static str {
        match self {
            EventPayload::WorkSubmitted { .. } => "work:submitted",
            EventPayload::WorkAssigned { .. } => "work:assigned",
            EventPayload::WorkStarted { .. } => "work:started",
            EventPayload::WorkProgress { .. } => "work:progress",
            EventPayload::WorkCompleted { .. } => "work:completed",
            EventPayload::WorkFailed { .. } => "work:failed",
            EventPayload::WorkCancelled { .. } => "work:cancelled",
            EventPayload::AgentRegistered { .. } => "agent:registered",
            EventPayload::AgentUpdated { .. } => "agent:updated",
            EventPayload::AgentShutdown { .. } => "agent:shutdown",
            EventPayload::TargetRegistered { .. } => "target:registered",
            EventPayload::TargetUpdated { .. } => "target:updated",
            EventPayload::TargetDisabled { .. } => "target:disabled",
            EventPayload::TargetRemoved { .. } => "target:removed",
            EventPayload::TargetHealthChanged { .. } => "target:health-changed",
            EventPayload::SpinUpTriggered { .. } => "spin-up:triggered",
            EventPayload::SpinUpStarted { .. } => "spin-up:started",
            EventPayload::SpinUpCompleted { .. } => "spin-up:completed",
            EventPayload::SpinUpFailed { .. } => "spin-up:failed",
        }
    }

    /// WebSocket topic an event routes to by kind prefix.
    pub fn topic(&self) -> &'static str {
        match self.kind().split(':').next().unwrap_or("") {
            "work" => "work",
            "agent" => "agents",
            "target" | "spin-up" => "targets",
            other => other,
        }
    }

    /// The work-status bucket this event maps to — only meaningful for
    /// `work:*` events.
    pub fn work_status_bucket(&self) -> Option<WorkStatus> {
        Some(match self {
            EventPayload::WorkSubmitted { .. } => WorkStatus::Pending,
            EventPayload::WorkAssigned { .. } => WorkStatus::Assigned,
            EventPayload::WorkStarted { .. } | EventPayload::WorkProgress { .. } => WorkStatus::InProgress,
            EventPayload::WorkCompleted { .. } => WorkStatus::Completed,
            EventPayload::WorkFailed { .. } => WorkStatus::Failed,
            EventPayload::WorkCancelled { .. } => WorkStatus::Cancelled,
            _ => return None,
        })
    }
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub project_id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub payload: EventPayload,
}

impl Event {
    pub fn new(project_id: impl Into<String>, payload: EventPayload) -> Self {
        Self {
            project_id: project_id.into(),
            timestamp: Utc::now(),
            payload,
        }
    }

    pub fn kind(&self) -> &'static str {
        self.payload.kind()
    }

    pub fn topic(&self) -> &'static str {
        self.payload.topic()
    }
}

/// A subscriber to the bus. Implementations must not block for long —
/// the bus delivers synchronously and waits for every listener in turn.
pub trait EventListener: Send + Sync {
    fn on_event(&self, event: &Event);
}

/// In-process publish/subscribe with no persistence or replay.
#[derive(Default)]
pub struct EventBus {
    listeners: RwLock<Vec<Arc<dyn EventListener>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, listener: Arc<dyn EventListener>) {
        self.listeners.write().expect("event bus lock poisoned").push(listener);
    }

    /// Delivers to every listener, in registration order, before returning.
    /// A listener that panics is isolated: logged, skipped, delivery to the
    /// remaining listeners continues.
    pub fn publish(&self, event: Event) {
        let listeners = self.listeners.read().expect("event bus lock poisoned").clone();
        for listener in listeners {
            let event_ref = &event;
            let result = std::panic::catch_unwind(AssertUnwindSafe(|| listener.on_event(event_ref)));
            if let Err(_panic) = result {
                warn!(kind = event.kind(), "event listener panicked; continuing fan-out");
            }
        }
    }
}

/// Test/debug listener that records every event it sees, in order.
#[derive(Default)]
pub struct RecordingListener {
    pub events: RwLock<Vec<Event>>,
}

impl EventListener for RecordingListener {
    fn on_event(&self, event: &Event) {
        self.events.write().expect("recording listener lock poisoned").push(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct PanickingListener;
    impl EventListener for PanickingListener {
        fn on_event(&self, _event: &Event) {
            panic!("boom");
        }
    }

    #[test]
    fn delivers_in_publication_order() {
        let bus = EventBus::new();
        let recorder = Arc::new(RecordingListener::default());
        bus.subscribe(recorder.clone());
        bus.publish(Event::new("p1", EventPayload::WorkSubmitted {
            work_item_id: "1".into(), capability: "c".into(), boundary: "b".into(), task_id: "t".into(), priority: 5,
        }));
        bus.publish(Event::new("p1", EventPayload::WorkStarted {
            work_item_id: "1".into(), capability: "c".into(), boundary: "b".into(), task_id: "t".into(),
        }));
        let seen = recorder.events.read().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].kind(), "work:submitted");
        assert_eq!(seen[1].kind(), "work:started");
    }

    #[test]
    fn isolates_panicking_listener() {
        let bus = EventBus::new();
        bus.subscribe(Arc::new(PanickingListener));
        let recorder = Arc::new(RecordingListener::default());
        bus.subscribe(recorder.clone());
        bus.publish(Event::new("p1", EventPayload::WorkCancelled {
            work_item_id: "1".into(), capability: "c".into(), boundary: "b".into(), task_id: "t".into(),
        }));
        assert_eq!(recorder.events.read().unwrap().len(), 1);
    }
}
