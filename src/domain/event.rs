use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The closed 13-value event type enum.
///
/// Dispatch on this (rollup increments, severity defaults, derived status) is
/// a match, never a string compare — see `PayloadKind` for the same idea
/// applied to `payload.kind`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    AgentRegistered,
    Heartbeat,
    TaskStarted,
    TaskCompleted,
    TaskFailed,
    ActionStarted,
    ActionCompleted,
    ActionFailed,
    RetryStarted,
    Escalated,
    ApprovalRequested,
    ApprovalReceived,
    Custom,
}

impl EventType {
    /// Severity assigned when the sender omits one.
    pub fn default_severity(self) -> Severity {
        match self {
            EventType::Heartbeat => Severity::Debug,
            EventType::AgentRegistered
            | EventType::TaskStarted
            | EventType::TaskCompleted
            | EventType::ActionStarted
            | EventType::ActionCompleted
            | EventType::ApprovalReceived
            | EventType::Custom => Severity::Info,
            EventType::RetryStarted | EventType::ApprovalRequested | EventType::Escalated => {
                Severity::Warn
            }
            EventType::TaskFailed | EventType::ActionFailed => Severity::Error,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Debug,
    Info,
    Warn,
    Error,
}

/// `{kind, summary?, data, tags?}` — the envelope every well-known payload
/// shares. `data` is kept as raw JSON; `typed()` interprets it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Payload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default = "default_data")]
    pub data: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

fn default_data() -> serde_json::Value {
    serde_json::Value::Null
}

impl Payload {
    /// Max on-wire size enforced at stage 3 of ingest.
    pub const MAX_BYTES: usize = 32 * 1024;

    pub fn byte_len(&self) -> usize {
        serde_json::to_vec(self).map(|v| v.len()).unwrap_or(0)
    }

    /// Interprets `data` against the well-known kind named in `kind`, if any.
    /// Unknown or absent kinds come back as `Other`, keeping `summary`/`tags`
    /// usable regardless.
    pub fn typed(&self) -> TypedPayload {
        match self.kind.as_deref() {
            Some("llm_call") => TypedPayload::LlmCall(LlmCallData::from_value(&self.data)),
            Some("queue_snapshot") => {
                TypedPayload::QueueSnapshot(QueueSnapshotData::from_value(&self.data))
            }
            Some("todo") => TypedPayload::Todo(TodoData::from_value(&self.data)),
            Some("plan_created") => {
                TypedPayload::PlanCreated(PlanCreatedData::from_value(&self.data))
            }
            Some("plan_step") => TypedPayload::PlanStep(PlanStepData::from_value(&self.data)),
            Some("issue") => TypedPayload::Issue(IssueData::from_value(&self.data)),
            Some("scheduled") => TypedPayload::Scheduled(ScheduledData::from_value(&self.data)),
            _ => TypedPayload::Other,
        }
    }
}

#[derive(Debug, Clone)]
pub enum TypedPayload {
    LlmCall(LlmCallData),
    QueueSnapshot(QueueSnapshotData),
    Todo(TodoData),
    PlanCreated(PlanCreatedData),
    PlanStep(PlanStepData),
    Issue(IssueData),
    Scheduled(ScheduledData),
    Other,
}

fn str_field(v: &serde_json::Value, key: &str) -> Option<String> {
    v.get(key).and_then(|x| x.as_str()).map(str::to_owned)
}

fn i64_field(v: &serde_json::Value, key: &str) -> Option<i64> {
    v.get(key).and_then(|x| x.as_i64())
}

fn f64_field(v: &serde_json::Value, key: &str) -> Option<f64> {
    v.get(key).and_then(|x| x.as_f64())
}

#[derive(Debug, Clone, Default)]
pub struct LlmCallData {
    pub name: Option<String>,
    pub model: Option<String>,
    pub tokens_in: Option<i64>,
    pub tokens_out: Option<i64>,
    pub cost: Option<f64>,
    pub duration_ms: Option<i64>,
    pub prompt_preview: Option<String>,
    pub response_preview: Option<String>,
}

impl LlmCallData {
    fn from_value(v: &serde_json::Value) -> Self {
        Self {
            name: str_field(v, "name"),
            model: str_field(v, "model"),
            tokens_in: i64_field(v, "tokens_in"),
            tokens_out: i64_field(v, "tokens_out"),
            cost: f64_field(v, "cost"),
            duration_ms: i64_field(v, "duration_ms"),
            prompt_preview: str_field(v, "prompt_preview"),
            response_preview: str_field(v, "response_preview"),
        }
    }

    /// Required-field shortfalls for the advisory check in ingest stage 4.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.name.is_none() {
            missing.push("name");
        }
        if self.model.is_none() {
            missing.push("model");
        }
        missing
    }
}

#[derive(Debug, Clone, Default)]
pub struct QueueSnapshotData {
    pub depth: Option<i64>,
}

impl QueueSnapshotData {
    fn from_value(v: &serde_json::Value) -> Self {
        Self {
            depth: i64_field(v, "depth"),
        }
    }

    pub fn missing_fields(&self) -> Vec<&'static str> {
        if self.depth.is_none() {
            vec!["depth"]
        } else {
            vec![]
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TodoData {
    pub todo_id: Option<String>,
    pub action: Option<String>,
}

impl TodoData {
    fn from_value(v: &serde_json::Value) -> Self {
        Self {
            todo_id: str_field(v, "todo_id"),
            action: str_field(v, "action"),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PlanCreatedData {
    pub goal: Option<String>,
    pub steps: Option<serde_json::Value>,
    pub revision: Option<i64>,
}

impl PlanCreatedData {
    fn from_value(v: &serde_json::Value) -> Self {
        Self {
            goal: str_field(v, "goal"),
            steps: v.get("steps").cloned(),
            revision: i64_field(v, "revision"),
        }
    }

    pub fn missing_fields(&self) -> Vec<&'static str> {
        if self.steps.is_none() {
            vec!["steps"]
        } else {
            vec![]
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PlanStepData {
    pub step_index: Option<i64>,
    pub total_steps: Option<i64>,
    pub action: Option<String>,
    pub summary: Option<String>,
    pub turns: Option<i64>,
    pub tokens: Option<i64>,
}

impl PlanStepData {
    fn from_value(v: &serde_json::Value) -> Self {
        Self {
            step_index: i64_field(v, "step_index"),
            total_steps: i64_field(v, "total_steps"),
            action: str_field(v, "action"),
            summary: str_field(v, "summary"),
            turns: i64_field(v, "turns"),
            tokens: i64_field(v, "tokens"),
        }
    }

    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.step_index.is_none() {
            missing.push("step_index");
        }
        if self.total_steps.is_none() {
            missing.push("total_steps");
        }
        if self.action.is_none() {
            missing.push("action");
        }
        missing
    }
}

#[derive(Debug, Clone, Default)]
pub struct IssueData {
    pub severity: Option<String>,
    pub action: Option<String>,
    pub issue_id: Option<String>,
}

impl IssueData {
    fn from_value(v: &serde_json::Value) -> Self {
        Self {
            severity: str_field(v, "severity"),
            action: str_field(v, "action"),
            issue_id: str_field(v, "issue_id"),
        }
    }

    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.severity.is_none() {
            missing.push("severity");
        }
        if self.action.is_none() {
            missing.push("action");
        }
        missing
    }

    /// Severity override for `issue` payloads; unknown values default to
    /// `info`.
    pub fn mapped_severity(&self) -> Severity {
        match self.severity.as_deref() {
            Some("critical") | Some("high") => Severity::Error,
            Some("medium") => Severity::Warn,
            Some("low") => Severity::Info,
            _ => Severity::Info,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ScheduledData {
    pub items: Option<serde_json::Value>,
}

impl ScheduledData {
    fn from_value(v: &serde_json::Value) -> Self {
        Self {
            items: v.get("items").cloned(),
        }
    }
}

/// Single source-of-truth record. Immutable once accepted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub event_id: Uuid,
    pub tenant_id: String,
    pub agent_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_action_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_event_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    pub event_type: EventType,
    pub severity: Severity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub received_at: DateTime<Utc>,
    #[serde(default)]
    pub payload: Payload,
}

impl Event {
    /// UTC-truncated hour this event rolls up into, keyed off sender clock
    /// (`timestamp`), never `received_at` — late events land in their real
    /// historical hour.
    pub fn bucket_hour(&self) -> DateTime<Utc> {
        let naive = self
            .timestamp
            .date_naive()
            .and_hms_opt(self.timestamp.hour(), 0, 0)
            .unwrap_or_else(|| self.timestamp.naive_utc());
        DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc)
    }
}

/// Raw wire shape for an event inside an ingest batch, before envelope
/// expansion. Mirrors `Event` but every correlation/metadata field is
/// optional since the envelope may supply it instead.
#[derive(Debug, Clone, Deserialize)]
pub struct RawEvent {
    pub event_id: Option<Uuid>,
    pub agent_id: Option<String>,
    pub task_id: Option<String>,
    pub action_id: Option<String>,
    pub parent_action_id: Option<String>,
    pub parent_event_id: Option<String>,
    pub project_id: Option<String>,
    pub environment: Option<String>,
    pub group: Option<String>,
    pub event_type: Option<EventType>,
    pub severity: Option<Severity>,
    pub status: Option<String>,
    pub duration_ms: Option<i64>,
    pub error_type: Option<String>,
    pub error_message: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub payload: Payload,
}

/// `{envelope: {...}, events: [...]}` — the `/v1/ingest` body.
#[derive(Debug, Clone, Deserialize)]
pub struct IngestBatch {
    pub envelope: Envelope,
    pub events: Vec<RawEvent>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Envelope {
    pub agent_id: String,
    #[serde(default)]
    pub agent_type: Option<String>,
    #[serde(default)]
    pub environment: Option<String>,
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default)]
    pub runtime: Option<String>,
    #[serde(default)]
    pub sdk_version: Option<String>,
    #[serde(default)]
    pub framework: Option<String>,
}
