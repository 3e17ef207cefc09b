use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::error::AppResult;
use crate::query::{self, TaskListFilter, TaskStatus, TaskView, Timeline};
use crate::state::AppState;

use super::helpers::Ctx;

#[derive(Debug, Deserialize)]
pub struct ListTasksQuery {
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub agent_id: Option<String>,
    #[serde(default)]
    pub status: Option<TaskStatus>,
    #[serde(default)]
    pub cursor: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct TaskListResponse {
    pub tasks: Vec<TaskView>,
    pub next_cursor: Option<String>,
}

pub async fn list_tasks(
    ctx: Ctx,
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListTasksQuery>,
) -> AppResult<Json<TaskListResponse>> {
    let filter = TaskListFilter {
        project_id: query.project_id,
        agent_id: query.agent_id,
        status: query.status,
    };
    let (tasks, next_cursor) = query::list_tasks(
        state.storage.as_ref(),
        &ctx.tenant_id,
        filter,
        query.cursor,
        query.limit,
    )
    .await?;
    Ok(Json(TaskListResponse { tasks, next_cursor }))
}

pub async fn get_task_timeline(
    ctx: Ctx,
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<String>,
) -> AppResult<Json<Timeline>> {
    let timeline = query::build_timeline(state.storage.as_ref(), &ctx.tenant_id, &task_id).await?;
    Ok(Json(timeline))
}
