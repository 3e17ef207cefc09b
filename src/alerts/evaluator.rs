use chrono::{DateTime, Duration, Utc};

use crate::domain::event::{EventType, TypedPayload};
use crate::domain::{ConditionConfig, CostScope, Event};
use crate::storage::{EventFilter, StorageBackend, StorageResult};

/// Result of evaluating one rule against the batch that just committed:
/// whether it fired, and which agent/task to attribute the alert to.
pub struct EvalResult {
    pub fired: bool,
    pub related_agent_id: Option<String>,
    pub related_task_id: Option<String>,
}

fn not_fired() -> EvalResult {
    EvalResult {
        fired: false,
        related_agent_id: None,
        related_task_id: None,
    }
}

/// Evaluates one rule's condition against `accepted` (the events from the
/// batch that just committed) and, where the condition needs history beyond
/// the batch, against storage.
pub async fn evaluate(
    storage: &dyn StorageBackend,
    tenant_id: &str,
    condition: &ConditionConfig,
    accepted: &[Event],
    now: DateTime<Utc>,
) -> StorageResult<EvalResult> {
    match condition {
        ConditionConfig::AgentStuck { agent_id, .. } => {
            Ok(eval_agent_stuck(accepted, agent_id.as_deref()))
        }
        ConditionConfig::TaskFailed {
            agent_id,
            threshold_count,
            window_seconds,
        } => {
            eval_task_failed(
                storage,
                tenant_id,
                agent_id.as_deref(),
                *threshold_count,
                *window_seconds,
                now,
            )
            .await
        }
        ConditionConfig::ErrorRate {
            threshold_percent,
            window_seconds,
            agent_id,
        } => {
            eval_error_rate(
                storage,
                tenant_id,
                agent_id.as_deref(),
                *threshold_percent,
                *window_seconds,
                now,
            )
            .await
        }
        ConditionConfig::DurationExceeded {
            threshold_ms,
            agent_id,
        } => Ok(eval_duration_exceeded(accepted, agent_id.as_deref(), *threshold_ms)),
        ConditionConfig::HeartbeatLost {
            agent_id,
            window_seconds,
        } => eval_heartbeat_lost(storage, tenant_id, agent_id, *window_seconds, now).await,
        ConditionConfig::CostThreshold {
            threshold_usd,
            window_hours,
            scope,
            scope_id,
        } => {
            eval_cost_threshold(
                storage,
                tenant_id,
                *threshold_usd,
                *window_hours,
                *scope,
                scope_id.as_deref(),
                now,
            )
            .await
        }
    }
}

fn eval_agent_stuck(accepted: &[Event], agent_filter: Option<&str>) -> EvalResult {
    // The status transition itself is detected by `ws::StatusTracker`; here
    // we only care whether this batch's events concern a relevant agent, so
    // `agent_stuck` rules fire from the ingest path when paired with a
    // transition the caller already observed. Conservatively, treat any
    // heartbeat-absent batch touching the agent as a signal: the engine is
    // invoked with the touched agents' caches already past the threshold
    // check by the caller (see `alerts::engine`).
    if let Some(agent_id) = agent_filter {
        if !accepted.iter().any(|e| e.agent_id == agent_id) {
            return not_fired();
        }
        EvalResult {
            fired: true,
            related_agent_id: Some(agent_id.to_string()),
            related_task_id: None,
        }
    } else {
        not_fired()
    }
}

async fn eval_task_failed(
    storage: &dyn StorageBackend,
    tenant_id: &str,
    agent_id: Option<&str>,
    threshold_count: Option<i64>,
    window_seconds: i64,
    now: DateTime<Utc>,
) -> StorageResult<EvalResult> {
    let filter = EventFilter {
        agent_id: agent_id.map(str::to_string),
        event_types: Some(vec![EventType::TaskFailed]),
        since: Some(now - Duration::seconds(window_seconds)),
        until: Some(now),
        ..Default::default()
    };
    let (events, _) = storage.get_events(tenant_id, filter, None, 500).await?;
    let threshold = threshold_count.unwrap_or(1);
    if (events.len() as i64) >= threshold {
        Ok(EvalResult {
            fired: true,
            related_agent_id: agent_id.map(str::to_string),
            related_task_id: events.last().and_then(|e| e.task_id.clone()),
        })
    } else {
        Ok(not_fired())
    }
}

async fn eval_error_rate(
    storage: &dyn StorageBackend,
    tenant_id: &str,
    agent_id: Option<&str>,
    threshold_percent: f64,
    window_seconds: i64,
    now: DateTime<Utc>,
) -> StorageResult<EvalResult> {
    let filter = EventFilter {
        agent_id: agent_id.map(str::to_string),
        event_types: Some(vec![
            EventType::ActionStarted,
            EventType::ActionCompleted,
            EventType::ActionFailed,
        ]),
        since: Some(now - Duration::seconds(window_seconds)),
        until: Some(now),
        ..Default::default()
    };
    let (events, _) = storage.get_events(tenant_id, filter, None, 2000).await?;
    let total = events
        .iter()
        .filter(|e| !matches!(e.event_type, EventType::ActionStarted))
        .count();
    let failed = events
        .iter()
        .filter(|e| matches!(e.event_type, EventType::ActionFailed))
        .count();
    if total == 0 {
        return Ok(not_fired());
    }
    let rate = (failed as f64 / total as f64) * 100.0;
    Ok(EvalResult {
        fired: rate > threshold_percent,
        related_agent_id: agent_id.map(str::to_string),
        related_task_id: None,
    })
}

fn eval_duration_exceeded(accepted: &[Event], agent_id: Option<&str>, threshold_ms: i64) -> EvalResult {
    let hit = accepted.iter().find(|e| {
        matches!(e.event_type, EventType::TaskCompleted)
            && e.duration_ms.map(|d| d > threshold_ms).unwrap_or(false)
            && agent_id.map(|a| e.agent_id == a).unwrap_or(true)
    });
    match hit {
        Some(e) => EvalResult {
            fired: true,
            related_agent_id: Some(e.agent_id.clone()),
            related_task_id: e.task_id.clone(),
        },
        None => not_fired(),
    }
}

async fn eval_heartbeat_lost(
    storage: &dyn StorageBackend,
    tenant_id: &str,
    agent_id: &str,
    window_seconds: i64,
    now: DateTime<Utc>,
) -> StorageResult<EvalResult> {
    let cache = match storage.get_agent(tenant_id, agent_id).await {
        Ok(c) => c,
        Err(_) => return Ok(not_fired()),
    };
    let lost = match cache.last_heartbeat {
        None => true,
        Some(hb) => (now - hb) > Duration::seconds(window_seconds),
    };
    Ok(EvalResult {
        fired: lost,
        related_agent_id: Some(agent_id.to_string()),
        related_task_id: None,
    })
}

async fn eval_cost_threshold(
    storage: &dyn StorageBackend,
    tenant_id: &str,
    threshold_usd: f64,
    window_hours: i64,
    scope: CostScope,
    scope_id: Option<&str>,
    now: DateTime<Utc>,
) -> StorageResult<EvalResult> {
    let since = now - Duration::hours(window_hours);
    let total = match scope {
        CostScope::Agent => {
            let buckets = storage.list_agent_buckets(tenant_id, scope_id, since, now).await?;
            buckets.iter().map(|b| b.llm_cost_usd).sum::<f64>()
        }
        CostScope::Project => {
            let Some(project_id) = scope_id else {
                return Ok(not_fired());
            };
            let agent_ids = storage.list_project_agents(tenant_id, project_id).await?;
            let mut sum = 0.0;
            for agent_id in &agent_ids {
                let buckets = storage
                    .list_agent_buckets(tenant_id, Some(agent_id.as_str()), since, now)
                    .await?;
                sum += buckets.iter().map(|b| b.llm_cost_usd).sum::<f64>();
            }
            sum
        }
        CostScope::Tenant => {
            let buckets = storage.list_agent_buckets(tenant_id, None, since, now).await?;
            buckets.iter().map(|b| b.llm_cost_usd).sum::<f64>()
        }
    };
    Ok(EvalResult {
        fired: total > threshold_usd,
        related_agent_id: scope_id.filter(|_| matches!(scope, CostScope::Agent)).map(str::to_string),
        related_task_id: None,
    })
}

/// Required `data.cost` lookup used when scanning raw llm_call events
/// directly (kept separate from bucket sums for callers that need
/// per-event attribution).
pub fn event_cost(event: &Event) -> f64 {
    match event.payload.typed() {
        TypedPayload::LlmCall(data) => data.cost.unwrap_or(0.0),
        _ => 0.0,
    }
}
