use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::event::TypedPayload;
use crate::domain::Event;
use crate::storage::{StorageBackend, StorageResult};

#[derive(Debug, Clone, Serialize)]
pub struct ActionNode {
    pub action_id: String,
    pub name: Option<String>,
    pub status: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
    pub children: Vec<ActionNode>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlanStepView {
    pub step_index: i64,
    pub action: Option<String>,
    pub summary: Option<String>,
    pub turns: Option<i64>,
    pub tokens: Option<i64>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlanOverlay {
    pub goal: Option<String>,
    pub steps: Option<serde_json::Value>,
    pub revision: Option<i64>,
    pub step_progress: Vec<PlanStepView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Timeline {
    pub events: Vec<Event>,
    pub action_tree: Vec<ActionNode>,
    pub error_chains: Vec<Vec<Event>>,
    pub plan: Option<PlanOverlay>,
}

pub async fn build_timeline(
    storage: &dyn StorageBackend,
    tenant_id: &str,
    task_id: &str,
) -> StorageResult<Timeline> {
    let mut events = storage.get_task_events(tenant_id, task_id).await?;
    events.sort_by_key(|e| e.timestamp);

    let action_tree = build_action_tree(&events);
    let error_chains = build_error_chains(&events);
    let plan = build_plan_overlay(&events);

    Ok(Timeline {
        events,
        action_tree,
        error_chains,
        plan,
    })
}

fn build_action_tree(events: &[Event]) -> Vec<ActionNode> {
    let mut by_action: HashMap<String, Vec<&Event>> = HashMap::new();
    for e in events {
        if let Some(action_id) = &e.action_id {
            by_action.entry(action_id.clone()).or_default().push(e);
        }
    }

    fn node_for(action_id: &str, by_action: &HashMap<String, Vec<&Event>>) -> ActionNode {
        let group = by_action.get(action_id);
        let name = group
            .and_then(|g| g.iter().find_map(|e| e.payload.summary.clone()));
        let started_at = group.and_then(|g| {
            g.iter()
                .filter(|e| matches!(e.event_type, crate::domain::EventType::ActionStarted))
                .map(|e| e.timestamp)
                .min()
        });
        let completed_at = group.and_then(|g| {
            g.iter()
                .filter(|e| {
                    matches!(
                        e.event_type,
                        crate::domain::EventType::ActionCompleted
                            | crate::domain::EventType::ActionFailed
                    )
                })
                .map(|e| e.timestamp)
                .max()
        });
        let status = group.and_then(|g| g.last().and_then(|e| e.status.clone()));
        let duration_ms = match (started_at, completed_at) {
            (Some(s), Some(c)) => Some((c - s).num_milliseconds()),
            _ => None,
        };

        let children = by_action
            .iter()
            .filter(|(_, g)| {
                g.iter()
                    .any(|e| e.parent_action_id.as_deref() == Some(action_id))
            })
            .map(|(child_id, _)| node_for(child_id, by_action))
            .collect();

        ActionNode {
            action_id: action_id.to_string(),
            name,
            status,
            started_at,
            completed_at,
            duration_ms,
            children,
        }
    }

    let roots: Vec<&String> = by_action
        .keys()
        .filter(|action_id| {
            by_action[*action_id]
                .iter()
                .all(|e| e.parent_action_id.is_none())
        })
        .collect();

    roots.into_iter().map(|id| node_for(id, &by_action)).collect()
}

/// Follows `parent_event_id` backward from every retry/escalation/failure
/// event to its root, oldest-first.
fn build_error_chains(events: &[Event]) -> Vec<Vec<Event>> {
    let by_id: HashMap<String, &Event> = events
        .iter()
        .map(|e| (e.event_id.to_string(), e))
        .collect();

    let roots_with_children: std::collections::HashSet<&str> = events
        .iter()
        .filter_map(|e| e.parent_event_id.as_deref())
        .collect();

    let mut chains = Vec::new();
    for e in events {
        let is_chain_leaf = matches!(
            e.event_type,
            crate::domain::EventType::RetryStarted
                | crate::domain::EventType::Escalated
                | crate::domain::EventType::ActionFailed
                | crate::domain::EventType::TaskFailed
        ) && !roots_with_children.contains(e.event_id.to_string().as_str());

        if !is_chain_leaf || e.parent_event_id.is_none() {
            continue;
        }

        let mut chain = vec![e.clone()];
        let mut cursor = e.parent_event_id.clone();
        while let Some(parent_id) = cursor {
            match by_id.get(&parent_id) {
                Some(parent) => {
                    chain.push((*parent).clone());
                    cursor = parent.parent_event_id.clone();
                }
                None => break,
            }
        }
        chain.reverse();
        chains.push(chain);
    }
    chains
}

fn build_plan_overlay(events: &[Event]) -> Option<PlanOverlay> {
    let latest_plan = events
        .iter()
        .filter(|e| e.payload.kind.as_deref() == Some("plan_created"))
        .max_by_key(|e| e.timestamp)?;

    let plan_data = match latest_plan.payload.typed() {
        TypedPayload::PlanCreated(data) => data,
        _ => Default::default(),
    };

    let mut steps_by_index: HashMap<i64, PlanStepView> = HashMap::new();
    for e in events
        .iter()
        .filter(|e| e.payload.kind.as_deref() == Some("plan_step"))
    {
        if let TypedPayload::PlanStep(data) = e.payload.typed() {
            if let Some(index) = data.step_index {
                let entry = steps_by_index.entry(index).or_insert(PlanStepView {
                    step_index: index,
                    action: data.action.clone(),
                    summary: data.summary.clone(),
                    turns: data.turns,
                    tokens: data.tokens,
                    updated_at: e.timestamp,
                });
                if e.timestamp >= entry.updated_at {
                    entry.action = data.action;
                    entry.summary = data.summary;
                    entry.turns = data.turns;
                    entry.tokens = data.tokens;
                    entry.updated_at = e.timestamp;
                }
            }
        }
    }

    let mut step_progress: Vec<PlanStepView> = steps_by_index.into_values().collect();
    step_progress.sort_by_key(|s| s.step_index);

    Some(PlanOverlay {
        goal: plan_data.goal,
        steps: plan_data.steps,
        revision: plan_data.revision,
        step_progress,
    })
}
