use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One arm per condition family — dispatch is a match, same shape as
/// `EventType`/`PayloadKind`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "condition_kind", rename_all = "snake_case")]
pub enum ConditionConfig {
    AgentStuck {
        stuck_threshold_seconds: i64,
        #[serde(default)]
        agent_id: Option<String>,
    },
    TaskFailed {
        #[serde(default)]
        agent_id: Option<String>,
        #[serde(default)]
        threshold_count: Option<i64>,
        window_seconds: i64,
    },
    ErrorRate {
        threshold_percent: f64,
        window_seconds: i64,
        #[serde(default)]
        agent_id: Option<String>,
    },
    DurationExceeded {
        threshold_ms: i64,
        #[serde(default)]
        agent_id: Option<String>,
    },
    HeartbeatLost {
        agent_id: String,
        window_seconds: i64,
    },
    CostThreshold {
        threshold_usd: f64,
        window_hours: i64,
        scope: CostScope,
        /// Required when `scope` is `agent` or `project`; ignored for
        /// `tenant`, which sums every agent in the tenant.
        #[serde(default)]
        scope_id: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CostScope {
    Agent,
    Project,
    Tenant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AlertAction {
    Webhook { url: String },
    Email { to: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertRule {
    pub rule_id: String,
    pub tenant_id: String,
    pub name: String,
    #[serde(flatten)]
    pub condition: ConditionConfig,
    pub actions: Vec<AlertAction>,
    pub cooldown_seconds: i64,
    pub is_enabled: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Delivered,
    Failed,
    Queued,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionDelivery {
    pub action: AlertAction,
    pub status: DeliveryStatus,
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertHistoryEntry {
    pub alert_id: String,
    pub rule_id: String,
    pub tenant_id: String,
    pub fired_at: DateTime<Utc>,
    pub condition_snapshot: ConditionConfig,
    pub related_agent_id: Option<String>,
    pub related_task_id: Option<String>,
    pub deliveries: Vec<ActionDelivery>,
}
