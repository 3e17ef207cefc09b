use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::event::EventType;

/// The agent cache row — mirrors the latest heartbeat envelope.
/// Not a source of truth: every field here is derived by replaying batches
/// through `upsert`, and nothing here is ever read back out of `events`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentCache {
    pub tenant_id: String,
    pub agent_id: String,
    pub agent_type: Option<String>,
    pub agent_version: Option<String>,
    pub framework: Option<String>,
    pub runtime: Option<String>,
    pub sdk_version: Option<String>,
    pub environment: Option<String>,
    pub group: Option<String>,
    pub last_seen: DateTime<Utc>,
    pub last_heartbeat: Option<DateTime<Utc>>,
    pub last_event_type: Option<EventType>,
    pub last_task_id: Option<String>,
    pub last_project_id: Option<String>,
    pub heartbeat_payload: Option<serde_json::Value>,
    pub queue_state: Option<serde_json::Value>,
    pub stuck_threshold_seconds: i64,
}

/// Fields carried by a single accepted event, folded into the cache row with
/// COALESCE semantics:
/// non-null incoming fields replace existing ones, null fields never
/// overwrite a previously-set value. Order of application across a batch
/// follows event order, so last-write-wins among non-null values.
#[derive(Debug, Clone, Default)]
pub struct AgentUpsert {
    pub agent_type: Option<String>,
    pub agent_version: Option<String>,
    pub framework: Option<String>,
    pub runtime: Option<String>,
    pub sdk_version: Option<String>,
    pub environment: Option<String>,
    pub group: Option<String>,
    pub seen_at: DateTime<Utc>,
    pub is_heartbeat: bool,
    pub event_type: EventType,
    pub task_id: Option<String>,
    pub project_id: Option<String>,
    pub heartbeat_payload: Option<serde_json::Value>,
    pub queue_state: Option<serde_json::Value>,
}

pub const DEFAULT_STUCK_THRESHOLD_SECONDS: i64 = 120;

impl AgentCache {
    pub fn new(tenant_id: String, agent_id: String, seen_at: DateTime<Utc>) -> Self {
        Self {
            tenant_id,
            agent_id,
            agent_type: None,
            agent_version: None,
            framework: None,
            runtime: None,
            sdk_version: None,
            environment: None,
            group: None,
            last_seen: seen_at,
            last_heartbeat: None,
            last_event_type: None,
            last_task_id: None,
            last_project_id: None,
            heartbeat_payload: None,
            queue_state: None,
            stuck_threshold_seconds: DEFAULT_STUCK_THRESHOLD_SECONDS,
        }
    }

    /// Applies one upsert. Callers may feed upserts in any order (e.g.
    /// original request order, not chronological order) — the
    /// chronologically-latest-wins fields (`last_event_type`, `last_task_id`,
    /// `last_project_id`) are resolved here via a running max-by-timestamp
    /// comparison against `last_seen`, not by call order.
    pub fn apply(&mut self, u: &AgentUpsert) {
        if let Some(v) = &u.agent_type {
            self.agent_type = Some(v.clone());
        }
        if let Some(v) = &u.agent_version {
            self.agent_version = Some(v.clone());
        }
        if let Some(v) = &u.framework {
            self.framework = Some(v.clone());
        }
        if let Some(v) = &u.runtime {
            self.runtime = Some(v.clone());
        }
        if let Some(v) = &u.sdk_version {
            self.sdk_version = Some(v.clone());
        }
        if let Some(v) = &u.environment {
            self.environment = Some(v.clone());
        }
        if let Some(v) = &u.group {
            self.group = Some(v.clone());
        }
        if u.seen_at > self.last_seen {
            self.last_seen = u.seen_at;
        }
        if u.is_heartbeat {
            self.last_heartbeat = Some(u.seen_at);
            if let Some(payload) = &u.heartbeat_payload {
                if !payload.is_null() {
                    self.heartbeat_payload = Some(payload.clone());
                }
            }
        }
        if u.seen_at >= self.last_seen {
            self.last_event_type = Some(u.event_type);
            if u.task_id.is_some() {
                self.last_task_id = u.task_id.clone();
            }
            if u.project_id.is_some() {
                self.last_project_id = u.project_id.clone();
            }
        }
        if let Some(qs) = &u.queue_state {
            self.queue_state = Some(qs.clone());
        }
    }
}

/// `(tenant_id, project_id, agent_id)` — idempotent on insert.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProjectAgentLink {
    pub tenant_id: String,
    pub project_id: String,
    pub agent_id: String,
}

/// Agent derived status — a pure function of `(now, cache
/// row)`, never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DerivedStatus {
    Stuck,
    Error,
    WaitingApproval,
    Processing,
    Idle,
}

pub fn derive_status(cache: &AgentCache, now: DateTime<Utc>) -> DerivedStatus {
    let stuck = match cache.last_heartbeat {
        None => true,
        Some(hb) => (now - hb).num_milliseconds() > cache.stuck_threshold_seconds * 1000,
    };
    if stuck {
        return DerivedStatus::Stuck;
    }
    match cache.last_event_type {
        Some(EventType::TaskFailed) | Some(EventType::ActionFailed) => DerivedStatus::Error,
        Some(EventType::ApprovalRequested) => DerivedStatus::WaitingApproval,
        Some(EventType::TaskStarted) | Some(EventType::ActionStarted) => {
            DerivedStatus::Processing
        }
        _ => DerivedStatus::Idle,
    }
}

pub fn heartbeat_age_seconds(cache: &AgentCache, now: DateTime<Utc>) -> Option<i64> {
    cache.last_heartbeat.map(|hb| (now - hb).num_seconds())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    fn cache_with_heartbeat(hb: DateTime<Utc>) -> AgentCache {
        let mut cache = AgentCache::new("t1".to_string(), "agent-1".to_string(), hb);
        cache.last_heartbeat = Some(hb);
        cache
    }

    #[test]
    fn stays_alive_exactly_at_the_threshold() {
        let now = Utc::now();
        let cache = cache_with_heartbeat(now - ChronoDuration::seconds(DEFAULT_STUCK_THRESHOLD_SECONDS));
        assert_eq!(derive_status(&cache, now), DerivedStatus::Idle);
    }

    #[test]
    fn goes_stuck_one_millisecond_past_the_threshold() {
        let now = Utc::now();
        let cache = cache_with_heartbeat(
            now - ChronoDuration::seconds(DEFAULT_STUCK_THRESHOLD_SECONDS) - ChronoDuration::milliseconds(1),
        );
        assert_eq!(derive_status(&cache, now), DerivedStatus::Stuck);
    }
}
