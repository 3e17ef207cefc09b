use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{Event, EventType, Severity};
use crate::error::{AppError, AppResult};
use crate::query::cursor;
use crate::state::AppState;
use crate::storage::EventFilter;

use super::helpers::Ctx;

#[derive(Debug, Deserialize)]
pub struct ListEventsQuery {
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub agent_id: Option<String>,
    #[serde(default)]
    pub task_id: Option<String>,
    #[serde(default)]
    pub event_type: Option<EventType>,
    #[serde(default)]
    pub min_severity: Option<Severity>,
    #[serde(default)]
    pub since: Option<DateTime<Utc>>,
    #[serde(default)]
    pub until: Option<DateTime<Utc>>,
    #[serde(default)]
    pub cursor: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct EventListResponse {
    pub events: Vec<Event>,
    pub next_cursor: Option<String>,
}

pub async fn list_events(
    ctx: Ctx,
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListEventsQuery>,
) -> AppResult<Json<EventListResponse>> {
    let filter = EventFilter {
        project_id: query.project_id,
        agent_id: query.agent_id,
        task_id: query.task_id,
        event_types: query.event_type.map(|t| vec![t]),
        min_severity: query.min_severity,
        since: query.since,
        until: query.until,
    };
    let limit = cursor::clamp_limit(query.limit);
    let (events, next_cursor) = state
        .storage
        .get_events(&ctx.tenant_id, filter, query.cursor, limit)
        .await?;
    Ok(Json(EventListResponse { events, next_cursor }))
}

pub async fn get_event(
    ctx: Ctx,
    State(state): State<Arc<AppState>>,
    Path(event_id): Path<String>,
) -> AppResult<Json<Event>> {
    let event_id = Uuid::parse_str(&event_id).map_err(|_| AppError::Validation("invalid event_id".into()))?;
    let event = state.storage.get_event(&ctx.tenant_id, event_id).await?;
    Ok(Json(event))
}
