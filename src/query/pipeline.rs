use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::event::TypedPayload;
use crate::storage::{AgentFilter, EventFilter, StorageBackend, StorageResult};

#[derive(Debug, Clone, Serialize)]
pub struct TodoView {
    pub todo_id: String,
    pub action: String,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IssueView {
    pub issue_key: String,
    pub action: String,
    pub severity: Option<String>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AgentPipeline {
    pub agent_id: String,
    pub queue_state: Option<serde_json::Value>,
    pub active_todos: Vec<TodoView>,
    pub latest_scheduled: Option<serde_json::Value>,
    pub active_issues: Vec<IssueView>,
}

const TODO_TERMINAL: &[&str] = &["completed", "dismissed"];
const ISSUE_TERMINAL: &str = "resolved";

/// Derives one agent's pipeline view by scanning its recent
/// `todo`/`scheduled`/`issue` events and keeping the latest action per group.
pub async fn agent_pipeline(
    storage: &dyn StorageBackend,
    tenant_id: &str,
    agent_id: &str,
) -> StorageResult<AgentPipeline> {
    let cache = storage.get_agent(tenant_id, agent_id).await?;

    let filter = EventFilter {
        agent_id: Some(agent_id.to_string()),
        ..Default::default()
    };
    let mut events = Vec::new();
    let mut cursor = None;
    loop {
        let (page, next) = storage.get_events(tenant_id, filter.clone(), cursor, 200).await?;
        if page.is_empty() {
            break;
        }
        events.extend(page);
        cursor = next;
        if cursor.is_none() {
            break;
        }
    }
    events.sort_by_key(|e| e.timestamp);

    let mut todos: HashMap<String, TodoView> = HashMap::new();
    let mut latest_scheduled = None;
    let mut issues: HashMap<String, IssueView> = HashMap::new();

    for e in &events {
        match e.payload.typed() {
            TypedPayload::Todo(data) => {
                if let (Some(todo_id), Some(action)) = (data.todo_id, data.action) {
                    todos.insert(
                        todo_id.clone(),
                        TodoView {
                            todo_id,
                            action,
                            updated_at: e.timestamp,
                        },
                    );
                }
            }
            TypedPayload::Scheduled(data) => {
                latest_scheduled = data.items;
            }
            TypedPayload::Issue(data) => {
                let key = data
                    .issue_id
                    .clone()
                    .unwrap_or_else(|| format!("{:x}", md5_like_hash(e.payload.summary.as_deref().unwrap_or(""))));
                if let Some(action) = data.action {
                    issues.insert(
                        key.clone(),
                        IssueView {
                            issue_key: key,
                            action,
                            severity: data.severity,
                            updated_at: e.timestamp,
                        },
                    );
                }
            }
            _ => {}
        }
    }

    let active_todos = todos
        .into_values()
        .filter(|t| !TODO_TERMINAL.contains(&t.action.as_str()))
        .collect();
    let active_issues = issues
        .into_values()
        .filter(|i| i.action != ISSUE_TERMINAL)
        .collect();

    Ok(AgentPipeline {
        agent_id: agent_id.to_string(),
        queue_state: cache.queue_state,
        active_todos,
        latest_scheduled,
        active_issues,
    })
}

/// Cheap, stable hash used only to key issues that omit `issue_id` — not a
/// security primitive, just a stand-in for "group by summary text".
fn md5_like_hash(s: &str) -> u64 {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    s.hash(&mut hasher);
    hasher.finish()
}

#[derive(Debug, Clone, Serialize)]
pub struct FleetPipeline {
    pub total_active_todos: usize,
    pub total_active_issues: usize,
    pub agents: Vec<AgentPipeline>,
}

pub async fn fleet_pipeline(storage: &dyn StorageBackend, tenant_id: &str) -> StorageResult<FleetPipeline> {
    let agents = storage.list_agents(tenant_id, AgentFilter::default()).await?;
    let mut views = Vec::with_capacity(agents.len());
    for agent in agents {
        views.push(agent_pipeline(storage, tenant_id, &agent.agent_id).await?);
    }
    let total_active_todos = views.iter().map(|v| v.active_todos.len()).sum();
    let total_active_issues = views.iter().map(|v| v.active_issues.len()).sum();
    Ok(FleetPipeline {
        total_active_todos,
        total_active_issues,
        agents: views,
    })
}
