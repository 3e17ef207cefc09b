use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::Utc;
use serde::Deserialize;

use crate::domain::AgentCache;
use crate::error::AppResult;
use crate::query;
use crate::state::AppState;
use crate::storage::AgentFilter;

use super::helpers::Ctx;

#[derive(Debug, Deserialize)]
pub struct ListAgentsQuery {
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub environment: Option<String>,
    #[serde(default)]
    pub group: Option<String>,
}

pub async fn list_agents(
    ctx: Ctx,
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListAgentsQuery>,
) -> AppResult<Json<Vec<AgentCache>>> {
    let filter = AgentFilter {
        project_id: query.project_id,
        environment: query.environment,
        group: query.group,
    };
    let agents = state.storage.list_agents(&ctx.tenant_id, filter).await?;
    Ok(Json(agents))
}

pub async fn get_agent(
    ctx: Ctx,
    State(state): State<Arc<AppState>>,
    Path(agent_id): Path<String>,
) -> AppResult<Json<query::AgentStatusView>> {
    let cache = state.storage.get_agent(&ctx.tenant_id, &agent_id).await?;
    let view = query::agent_status_view(state.storage.as_ref(), &ctx.tenant_id, cache, Utc::now()).await?;
    Ok(Json(view))
}

pub async fn agent_pipeline(
    ctx: Ctx,
    State(state): State<Arc<AppState>>,
    Path(agent_id): Path<String>,
) -> AppResult<Json<query::AgentPipeline>> {
    let pipeline = query::agent_pipeline(state.storage.as_ref(), &ctx.tenant_id, &agent_id).await?;
    Ok(Json(pipeline))
}
