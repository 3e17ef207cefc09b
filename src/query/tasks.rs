use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::event::{EventType, TypedPayload};
use crate::domain::Event;
use crate::storage::{EventFilter, StorageBackend, StorageResult};

use super::cursor;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Completed,
    Failed,
    Escalated,
    Waiting,
    Processing,
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskView {
    pub task_id: String,
    pub agent_id: String,
    pub project_id: Option<String>,
    pub task_type: Option<String>,
    pub status: TaskStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
    pub cost_usd: f64,
    pub action_count: i64,
    pub error_count: i64,
}

/// Projects one task's events into a `TaskView`. `events` must
/// already be every event carrying this `task_id`, in any order.
pub fn derive_task(task_id: &str, events: &[Event]) -> Option<TaskView> {
    let first = events.first()?;
    let agent_id = first.agent_id.clone();
    let project_id = events.iter().find_map(|e| e.project_id.clone());

    let mut started_at = None;
    let mut ended_at = None;
    let mut task_type = None;
    let mut completed = false;
    let mut failed = false;
    let mut escalated = false;
    let mut approval_requested = false;
    let mut approval_received = false;
    let mut action_count = 0i64;
    let mut error_count = 0i64;
    let mut cost_usd = 0.0;

    for event in events {
        match event.event_type {
            EventType::TaskStarted => {
                started_at = Some(started_at.map_or(event.timestamp, |t: DateTime<Utc>| t.min(event.timestamp)));
                if task_type.is_none() {
                    task_type = event.payload.kind.clone();
                }
            }
            EventType::TaskCompleted => {
                completed = true;
                ended_at = Some(ended_at.map_or(event.timestamp, |t: DateTime<Utc>| t.max(event.timestamp)));
            }
            EventType::TaskFailed => {
                failed = true;
                error_count += 1;
                ended_at = Some(ended_at.map_or(event.timestamp, |t: DateTime<Utc>| t.max(event.timestamp)));
            }
            EventType::Escalated => escalated = true,
            EventType::ApprovalRequested => approval_requested = true,
            EventType::ApprovalReceived => approval_received = true,
            EventType::ActionStarted => action_count += 1,
            EventType::ActionFailed => error_count += 1,
            EventType::Custom => {
                if let TypedPayload::LlmCall(data) = event.payload.typed() {
                    cost_usd += data.cost.unwrap_or(0.0);
                }
            }
            _ => {}
        }
    }

    let status = if completed {
        TaskStatus::Completed
    } else if failed {
        TaskStatus::Failed
    } else if escalated {
        TaskStatus::Escalated
    } else if approval_requested && !approval_received {
        TaskStatus::Waiting
    } else {
        TaskStatus::Processing
    };

    let duration_ms = match (started_at, ended_at) {
        (Some(s), Some(e)) => Some((e - s).num_milliseconds()),
        _ => None,
    };

    Some(TaskView {
        task_id: task_id.to_string(),
        agent_id,
        project_id,
        task_type,
        status,
        started_at,
        ended_at,
        duration_ms,
        cost_usd,
        action_count,
        error_count,
    })
}

#[derive(Debug, Clone, Default)]
pub struct TaskListFilter {
    pub project_id: Option<String>,
    pub agent_id: Option<String>,
    pub status: Option<TaskStatus>,
}

/// Lists task projections. The reference engine
/// enumerates candidate task ids via the event filter, derives each, then
/// filters/sorts/paginates in memory — a SQL-backed implementation would
/// push this down to a rollup table instead.
pub async fn list_tasks(
    storage: &dyn StorageBackend,
    tenant_id: &str,
    filter: TaskListFilter,
    cursor_token: Option<String>,
    limit: Option<usize>,
) -> StorageResult<(Vec<TaskView>, Option<String>)> {
    let event_filter = EventFilter {
        project_id: filter.project_id.clone(),
        agent_id: filter.agent_id.clone(),
        ..Default::default()
    };

    let task_ids = storage.list_all_task_ids(tenant_id, event_filter).await?;

    let mut views = Vec::new();
    for task_id in task_ids {
        let events = storage.get_task_events(tenant_id, &task_id).await?;
        if let Some(view) = derive_task(&task_id, &events) {
            if let Some(status) = filter.status {
                if view.status != status {
                    continue;
                }
            }
            views.push(view);
        }
    }

    views.sort_by(|a, b| {
        b.started_at
            .unwrap_or_default()
            .cmp(&a.started_at.unwrap_or_default())
            .then_with(|| b.task_id.cmp(&a.task_id))
    });

    let after = cursor_token.as_deref().and_then(cursor::decode);
    let start = match after {
        Some((ts, id)) => views
            .iter()
            .position(|v| (v.started_at.unwrap_or_default(), v.task_id.as_str()) < (ts, id.as_str()))
            .unwrap_or(views.len()),
        None => 0,
    };

    let limit = cursor::clamp_limit(limit);
    let page: Vec<TaskView> = views.iter().skip(start).take(limit).cloned().collect();
    let next = if start + page.len() < views.len() {
        page.last()
            .map(|v| cursor::encode(v.started_at.unwrap_or_default(), &v.task_id))
    } else {
        None
    };

    Ok((page, next))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::event::{Payload, Severity};
    use uuid::Uuid;

    fn event(event_type: EventType, timestamp: DateTime<Utc>) -> Event {
        Event {
            event_id: Uuid::new_v4(),
            tenant_id: "t1".to_string(),
            agent_id: "agent-1".to_string(),
            task_id: Some("task-1".to_string()),
            action_id: None,
            parent_action_id: None,
            parent_event_id: None,
            project_id: None,
            environment: None,
            group: None,
            event_type,
            severity: Severity::Info,
            status: None,
            duration_ms: None,
            error_type: None,
            error_message: None,
            timestamp,
            received_at: timestamp,
            payload: Payload::default(),
        }
    }

    #[test]
    fn duration_spans_the_earliest_start_to_the_latest_end() {
        let t0 = Utc::now();
        let events = vec![
            event(EventType::TaskStarted, t0),
            event(EventType::TaskStarted, t0 + chrono::Duration::seconds(30)),
            event(EventType::TaskCompleted, t0 + chrono::Duration::seconds(90)),
        ];
        let view = derive_task("task-1", &events).unwrap();
        assert_eq!(view.started_at, Some(t0));
        assert_eq!(view.duration_ms, Some(90_000));
    }
}
