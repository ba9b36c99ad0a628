//! Core data model: WorkItem, Agent, Target and their status enums.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use uuid::Uuid;

pub type AgentGuid = String;
pub type TargetId = String;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AgentType {
    CopilotCli,
    ClaudeCode,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Online,
    Busy,
    Offline,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WorkStatus {
    Pending,
    Assigned,
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

impl WorkStatus {
    /// The wire/bucket string used in filters and the stats snapshot.
    pub fn as_str(self) -> &'static str {
        match self {
            WorkStatus::Pending => "pending",
            WorkStatus::Assigned => "assigned",
            WorkStatus::InProgress => "in-progress",
            WorkStatus::Completed => "completed",
            WorkStatus::Failed => "failed",
            WorkStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            WorkStatus::Completed | WorkStatus::Failed | WorkStatus::Cancelled
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TargetStatus {
    Available,
    InUse,
    Disabled,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetHealth {
    Unknown,
    Healthy,
    Unhealthy,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpinUpOutcome {
    Success,
    Failure,
}

/// `{guid, handle?, agentType, hostname?}` — the join shape work events
/// carry once enriched by the Agent Registry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentSummary {
    pub guid: AgentGuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub handle: Option<String>,
    pub agent_type: AgentType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Agent {
    pub guid: AgentGuid,
    pub handle: String,
    pub agent_type: AgentType,
    pub hostname: String,
    pub capabilities: HashSet<String>,
    pub boundaries: HashSet<String>,
    pub status: AgentStatus,
    pub current_task_count: u32,
}

impl Agent {
    pub fn summary(&self) -> AgentSummary {
        AgentSummary {
            guid: self.guid.clone(),
            handle: Some(self.handle.clone()),
            agent_type: self.agent_type,
            hostname: Some(self.hostname.clone()),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpinUpRecord {
    pub at: DateTime<Utc>,
    pub outcome: SpinUpOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent: Option<AgentSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub work_item_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Target {
    pub target_id: TargetId,
    pub target_name: String,
    pub agent_type: AgentType,
    pub capabilities: HashSet<String>,
    pub boundaries: HashSet<String>,
    pub mechanism: String,
    pub status: TargetStatus,
    pub health: TargetHealth,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_spin_up: Option<SpinUpRecord>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    pub output: serde_json::Value,
    pub completed_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkError {
    pub message: String,
    pub recoverable: bool,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkItem {
    pub id: String,
    pub task_id: String,
    pub description: String,
    pub capability: String,
    pub boundary: String,
    pub priority: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deadline: Option<DateTime<Utc>>,
    pub context_data: BTreeMap<String, serde_json::Value>,
    pub status: WorkStatus,
    pub offered_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<AgentGuid>,
    pub attempts: u32,
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<WorkResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<WorkError>,
}

/// Request shape for `submitWork`.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitWorkRequest {
    #[serde(default)]
    pub task_id: Option<String>,
    pub description: String,
    pub capability: String,
    pub boundary: String,
    #[serde(default)]
    pub priority: Option<u8>,
    #[serde(default)]
    pub deadline: Option<DateTime<Utc>>,
    #[serde(default)]
    pub context_data: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub preferred_agent_type: Option<AgentType>,
    #[serde(default)]
    pub required_agent_type: Option<AgentType>,
}

pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkStats {
    pub pending: usize,
    pub active: usize,
    pub completed: usize,
    pub failed: usize,
    pub total: usize,
}

#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentStats {
    pub total: usize,
    pub by_type: BTreeMap<String, usize>,
    pub by_status: BTreeMap<String, usize>,
}

#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetStats {
    pub total: usize,
    pub available: usize,
    pub in_use: usize,
    pub disabled: usize,
}
