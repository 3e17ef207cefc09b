use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::domain::bucket::BiggestPrompt;
use crate::domain::event::{EventType, TypedPayload};
use crate::storage::{EventFilter, StorageBackend, StorageResult};

#[derive(Debug, Clone, Serialize, Default)]
pub struct MetricsSummary {
    pub tasks_started: i64,
    pub tasks_completed: i64,
    pub tasks_failed: i64,
    pub success_rate: f64,
    pub avg_task_duration_ms: f64,
    pub llm_calls: i64,
    pub llm_tokens_in: i64,
    pub llm_tokens_out: i64,
    pub llm_cost_usd: f64,
}

/// `GET /v1/metrics` — sums the agent hourly buckets covering `[since,
/// until)`, optionally scoped to one agent.
pub async fn get_metrics(
    storage: &dyn StorageBackend,
    tenant_id: &str,
    agent_id: Option<&str>,
    since: DateTime<Utc>,
    until: DateTime<Utc>,
) -> StorageResult<MetricsSummary> {
    let buckets = storage
        .list_agent_buckets(tenant_id, agent_id, since, until)
        .await?;

    let mut summary = MetricsSummary::default();
    let mut duration_sum = 0i64;
    let mut duration_count = 0i64;
    for b in &buckets {
        summary.tasks_started += b.tasks_started;
        summary.tasks_completed += b.tasks_completed;
        summary.tasks_failed += b.tasks_failed;
        summary.llm_calls += b.llm_calls;
        summary.llm_tokens_in += b.llm_tokens_in;
        summary.llm_tokens_out += b.llm_tokens_out;
        summary.llm_cost_usd += b.llm_cost_usd;
        if b.tasks_completed > 0 {
            duration_sum += b.task_duration_sum_ms;
            duration_count += b.tasks_completed;
        }
    }
    let total = summary.tasks_completed + summary.tasks_failed;
    summary.success_rate = if total > 0 {
        summary.tasks_completed as f64 / total as f64
    } else {
        0.0
    };
    summary.avg_task_duration_ms = if duration_count > 0 {
        duration_sum as f64 / duration_count as f64
    } else {
        0.0
    };

    Ok(summary)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CostGroupBy {
    Agent,
    Model,
}

#[derive(Debug, Clone, Serialize)]
pub struct CostGroupRow {
    pub key: String,
    pub cost_usd: f64,
    pub calls: i64,
}

/// `GET /v1/cost` — cost broken down per agent or per model.
pub async fn get_cost_summary(
    storage: &dyn StorageBackend,
    tenant_id: &str,
    group_by: CostGroupBy,
    since: DateTime<Utc>,
    until: DateTime<Utc>,
) -> StorageResult<Vec<CostGroupRow>> {
    match group_by {
        CostGroupBy::Agent => {
            let buckets = storage.list_agent_buckets(tenant_id, None, since, until).await?;
            let mut by_agent: HashMap<String, (f64, i64)> = HashMap::new();
            for b in buckets {
                let entry = by_agent.entry(b.agent_id.clone()).or_default();
                entry.0 += b.llm_cost_usd;
                entry.1 += b.llm_calls;
            }
            Ok(by_agent
                .into_iter()
                .map(|(key, (cost_usd, calls))| CostGroupRow { key, cost_usd, calls })
                .collect())
        }
        CostGroupBy::Model => {
            let buckets = storage.list_model_buckets(tenant_id, None, since, until).await?;
            let mut by_model: HashMap<String, (f64, i64)> = HashMap::new();
            for b in buckets {
                let entry = by_model.entry(b.model.clone()).or_default();
                entry.0 += b.cost_usd;
                entry.1 += b.call_count;
            }
            Ok(by_model
                .into_iter()
                .map(|(key, (cost_usd, calls))| CostGroupRow { key, cost_usd, calls })
                .collect())
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LlmCallRow {
    pub event_id: uuid::Uuid,
    pub agent_id: String,
    pub task_id: Option<String>,
    pub model: Option<String>,
    pub name: Option<String>,
    pub cost_usd: Option<f64>,
    pub tokens_in: Option<i64>,
    pub tokens_out: Option<i64>,
    pub timestamp: DateTime<Utc>,
}

/// `GET /v1/cost/calls` and `GET /v1/llm-calls` — individual `llm_call`
/// events in range, newest first. Buckets only carry aggregates, so this
/// scans raw events; callers on a 90-day-pruned tenant get an empty result
/// for ranges past raw-event retention, which is expected.
pub async fn list_llm_calls(
    storage: &dyn StorageBackend,
    tenant_id: &str,
    agent_id: Option<&str>,
    since: DateTime<Utc>,
    until: DateTime<Utc>,
    limit: usize,
) -> StorageResult<Vec<LlmCallRow>> {
    let filter = EventFilter {
        agent_id: agent_id.map(str::to_string),
        event_types: Some(vec![EventType::Custom]),
        since: Some(since),
        until: Some(until),
        ..Default::default()
    };

    let mut rows = Vec::new();
    let mut cursor = None;
    loop {
        let (events, next) = storage.get_events(tenant_id, filter.clone(), cursor, 200).await?;
        if events.is_empty() {
            break;
        }
        for e in events {
            if let TypedPayload::LlmCall(data) = e.payload.typed() {
                rows.push(LlmCallRow {
                    event_id: e.event_id,
                    agent_id: e.agent_id.clone(),
                    task_id: e.task_id.clone(),
                    model: data.model,
                    name: data.name,
                    cost_usd: data.cost,
                    tokens_in: data.tokens_in,
                    tokens_out: data.tokens_out,
                    timestamp: e.timestamp,
                });
            }
        }
        cursor = next;
        if cursor.is_none() || rows.len() >= limit {
            break;
        }
    }
    rows.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    rows.truncate(limit);
    Ok(rows)
}

#[derive(Debug, Clone, Serialize)]
pub struct TimeseriesPoint {
    pub hour: DateTime<Utc>,
    pub value: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeseriesMetric {
    Cost,
    Calls,
    TasksCompleted,
    TasksFailed,
}

/// Zero-fills every hour in `[since, until)` so charts don't show gaps
///.
pub async fn get_timeseries(
    storage: &dyn StorageBackend,
    tenant_id: &str,
    agent_id: Option<&str>,
    metric: TimeseriesMetric,
    since: DateTime<Utc>,
    until: DateTime<Utc>,
) -> StorageResult<Vec<TimeseriesPoint>> {
    let buckets = storage
        .list_agent_buckets(tenant_id, agent_id, since, until)
        .await?;
    let mut by_hour: HashMap<DateTime<Utc>, f64> = HashMap::new();
    for b in buckets {
        let value = match metric {
            TimeseriesMetric::Cost => b.llm_cost_usd,
            TimeseriesMetric::Calls => b.llm_calls as f64,
            TimeseriesMetric::TasksCompleted => b.tasks_completed as f64,
            TimeseriesMetric::TasksFailed => b.tasks_failed as f64,
        };
        *by_hour.entry(b.hour).or_insert(0.0) += value;
    }

    let mut points = Vec::new();
    let mut hour = truncate_hour(since);
    let end = truncate_hour(until);
    while hour <= end {
        points.push(TimeseriesPoint {
            hour,
            value: *by_hour.get(&hour).unwrap_or(&0.0),
        });
        hour += Duration::hours(1);
    }
    Ok(points)
}

fn truncate_hour(ts: DateTime<Utc>) -> DateTime<Utc> {
    use chrono::Timelike;
    let naive = ts
        .date_naive()
        .and_hms_opt(ts.hour(), 0, 0)
        .unwrap_or_else(|| ts.naive_utc());
    DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc)
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorBreakdown {
    pub by_type: HashMap<String, i64>,
    pub by_category: HashMap<String, i64>,
}

/// `GET /v1/insights/errors`.
pub async fn get_error_insights(
    storage: &dyn StorageBackend,
    tenant_id: &str,
    since: DateTime<Utc>,
    until: DateTime<Utc>,
) -> StorageResult<ErrorBreakdown> {
    let buckets = storage.list_agent_buckets(tenant_id, None, since, until).await?;
    let mut by_type = HashMap::new();
    let mut by_category = HashMap::new();
    for b in buckets {
        for (k, v) in b.errors_by_type {
            *by_type.entry(k).or_insert(0) += v;
        }
        for (k, v) in b.errors_by_category {
            *by_category.entry(k).or_insert(0) += v;
        }
    }
    Ok(ErrorBreakdown { by_type, by_category })
}

/// `GET /v1/insights/prompts` — the single biggest prompt seen across the
/// range, attributed to its agent/model/call.
pub async fn get_biggest_prompt(
    storage: &dyn StorageBackend,
    tenant_id: &str,
    since: DateTime<Utc>,
    until: DateTime<Utc>,
) -> StorageResult<Option<BiggestPrompt>> {
    let buckets = storage.list_agent_buckets(tenant_id, None, since, until).await?;
    Ok(buckets
        .into_iter()
        .map(|b| b.biggest_prompt)
        .max_by_key(|p| p.tokens_in))
}

/// `GET /v1/insights/actions` — usage distribution across action names.
pub async fn get_action_distribution(
    storage: &dyn StorageBackend,
    tenant_id: &str,
    since: DateTime<Utc>,
    until: DateTime<Utc>,
) -> StorageResult<HashMap<String, i64>> {
    let buckets = storage.list_agent_buckets(tenant_id, None, since, until).await?;
    let mut by_name = HashMap::new();
    for b in buckets {
        for (k, v) in b.actions_by_name {
            *by_name.entry(k).or_insert(0) += v;
        }
    }
    Ok(by_name)
}
