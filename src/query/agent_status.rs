use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::domain::agent::{derive_status, heartbeat_age_seconds, AgentCache, DerivedStatus};
use crate::domain::event::{EventType, TypedPayload};
use crate::storage::{EventFilter, StorageBackend, StorageResult};

/// `stats_1h` — computed by scanning the agent's events from
/// the last hour. Large-scale deployments would read this from the most
/// recent hourly bucket instead; the reference query engine always scans,
/// since the in-memory store makes that cheap.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Stats1h {
    pub tasks_completed: i64,
    pub tasks_failed: i64,
    pub success_rate: f64,
    pub avg_duration_ms: Option<f64>,
    pub total_cost_usd: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct AgentStatusView {
    #[serde(flatten)]
    pub cache: AgentCache,
    pub derived_status: DerivedStatus,
    pub heartbeat_age_seconds: Option<i64>,
    pub stats_1h: Stats1h,
}

pub async fn agent_status_view(
    storage: &dyn StorageBackend,
    tenant_id: &str,
    cache: AgentCache,
    now: DateTime<Utc>,
) -> StorageResult<AgentStatusView> {
    let status = derive_status(&cache, now);
    let age = heartbeat_age_seconds(&cache, now);
    let stats = stats_1h(storage, tenant_id, &cache.agent_id, now).await?;
    Ok(AgentStatusView {
        cache,
        derived_status: status,
        heartbeat_age_seconds: age,
        stats_1h: stats,
    })
}

async fn stats_1h(
    storage: &dyn StorageBackend,
    tenant_id: &str,
    agent_id: &str,
    now: DateTime<Utc>,
) -> StorageResult<Stats1h> {
    let filter = EventFilter {
        agent_id: Some(agent_id.to_string()),
        since: Some(now - Duration::hours(1)),
        until: Some(now),
        ..Default::default()
    };

    let mut completed = 0i64;
    let mut failed = 0i64;
    let mut total_cost = 0.0;
    let mut durations: Vec<i64> = Vec::new();
    let mut task_starts: std::collections::HashMap<String, DateTime<Utc>> =
        std::collections::HashMap::new();

    let mut cursor = None;
    loop {
        let (events, next) = storage
            .get_events(tenant_id, filter.clone(), cursor.clone(), 200)
            .await?;
        if events.is_empty() {
            break;
        }
        for event in &events {
            match event.event_type {
                EventType::TaskStarted => {
                    if let Some(task_id) = &event.task_id {
                        task_starts.insert(task_id.clone(), event.timestamp);
                    }
                }
                EventType::TaskCompleted => {
                    completed += 1;
                    if let (Some(task_id), end) = (&event.task_id, event.timestamp) {
                        if let Some(start) = task_starts.get(task_id) {
                            durations.push((end - *start).num_milliseconds());
                        }
                    }
                }
                EventType::TaskFailed => {
                    failed += 1;
                }
                EventType::Custom => {
                    if let TypedPayload::LlmCall(data) = event.payload.typed() {
                        total_cost += data.cost.unwrap_or(0.0);
                    }
                }
                _ => {}
            }
        }
        cursor = next;
        if cursor.is_none() {
            break;
        }
    }

    let total = completed + failed;
    let success_rate = if total > 0 {
        completed as f64 / total as f64
    } else {
        0.0
    };
    let avg_duration_ms = if durations.is_empty() {
        None
    } else {
        Some(durations.iter().sum::<i64>() as f64 / durations.len() as f64)
    };

    Ok(Stats1h {
        tasks_completed: completed,
        tasks_failed: failed,
        success_rate,
        avg_duration_ms,
        total_cost_usd: total_cost,
    })
}
