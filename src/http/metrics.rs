use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::bucket::BiggestPrompt;
use crate::error::{AppError, AppResult};
use crate::query::metrics::{
    self, CostGroupBy, CostGroupRow, ErrorBreakdown, LlmCallRow, MetricsSummary, TimeseriesMetric,
    TimeseriesPoint,
};
use crate::query::{self, FleetPipeline};
use crate::state::AppState;

use super::helpers::Ctx;

const DEFAULT_WINDOW_HOURS: i64 = 24;

#[derive(Debug, Deserialize)]
pub struct RangeQuery {
    #[serde(default)]
    pub agent_id: Option<String>,
    #[serde(default)]
    pub since: Option<DateTime<Utc>>,
    #[serde(default)]
    pub until: Option<DateTime<Utc>>,
}

fn resolve_range(since: Option<DateTime<Utc>>, until: Option<DateTime<Utc>>) -> (DateTime<Utc>, DateTime<Utc>) {
    let until = until.unwrap_or_else(Utc::now);
    let since = since.unwrap_or(until - Duration::hours(DEFAULT_WINDOW_HOURS));
    (since, until)
}

pub async fn get_metrics(
    ctx: Ctx,
    State(state): State<Arc<AppState>>,
    Query(query): Query<RangeQuery>,
) -> AppResult<Json<MetricsSummary>> {
    let (since, until) = resolve_range(query.since, query.until);
    let summary = metrics::get_metrics(
        state.storage.as_ref(),
        &ctx.tenant_id,
        query.agent_id.as_deref(),
        since,
        until,
    )
    .await?;
    Ok(Json(summary))
}

#[derive(Debug, Deserialize)]
pub struct CostQuery {
    #[serde(default)]
    pub group_by: Option<String>,
    #[serde(default)]
    pub since: Option<DateTime<Utc>>,
    #[serde(default)]
    pub until: Option<DateTime<Utc>>,
}

pub async fn get_cost(
    ctx: Ctx,
    State(state): State<Arc<AppState>>,
    Query(query): Query<CostQuery>,
) -> AppResult<Json<Vec<CostGroupRow>>> {
    let (since, until) = resolve_range(query.since, query.until);
    let group_by = match query.group_by.as_deref() {
        None | Some("agent") => CostGroupBy::Agent,
        Some("model") => CostGroupBy::Model,
        Some(other) => return Err(AppError::Validation(format!("unknown group_by: {other}"))),
    };
    let rows = metrics::get_cost_summary(state.storage.as_ref(), &ctx.tenant_id, group_by, since, until).await?;
    Ok(Json(rows))
}

#[derive(Debug, Deserialize)]
pub struct LlmCallsQuery {
    #[serde(default)]
    pub agent_id: Option<String>,
    #[serde(default)]
    pub since: Option<DateTime<Utc>>,
    #[serde(default)]
    pub until: Option<DateTime<Utc>>,
    #[serde(default)]
    pub limit: Option<usize>,
}

pub async fn list_llm_calls(
    ctx: Ctx,
    State(state): State<Arc<AppState>>,
    Query(query): Query<LlmCallsQuery>,
) -> AppResult<Json<Vec<LlmCallRow>>> {
    let (since, until) = resolve_range(query.since, query.until);
    let limit = query.limit.unwrap_or(100).min(500).max(1);
    let rows = metrics::list_llm_calls(
        state.storage.as_ref(),
        &ctx.tenant_id,
        query.agent_id.as_deref(),
        since,
        until,
        limit,
    )
    .await?;
    Ok(Json(rows))
}

#[derive(Debug, Deserialize)]
pub struct TimeseriesQuery {
    #[serde(default)]
    pub agent_id: Option<String>,
    pub metric: String,
    #[serde(default)]
    pub since: Option<DateTime<Utc>>,
    #[serde(default)]
    pub until: Option<DateTime<Utc>>,
}

pub async fn get_cost_timeseries(
    ctx: Ctx,
    State(state): State<Arc<AppState>>,
    Query(query): Query<TimeseriesQuery>,
) -> AppResult<Json<Vec<TimeseriesPoint>>> {
    let (since, until) = resolve_range(query.since, query.until);
    let metric = match query.metric.as_str() {
        "cost" => TimeseriesMetric::Cost,
        "calls" => TimeseriesMetric::Calls,
        "tasks_completed" => TimeseriesMetric::TasksCompleted,
        "tasks_failed" => TimeseriesMetric::TasksFailed,
        other => return Err(AppError::Validation(format!("unknown metric: {other}"))),
    };
    let points = metrics::get_timeseries(
        state.storage.as_ref(),
        &ctx.tenant_id,
        query.agent_id.as_deref(),
        metric,
        since,
        until,
    )
    .await?;
    Ok(Json(points))
}

pub async fn fleet_pipeline(ctx: Ctx, State(state): State<Arc<AppState>>) -> AppResult<Json<FleetPipeline>> {
    let pipeline = query::fleet_pipeline(state.storage.as_ref(), &ctx.tenant_id).await?;
    Ok(Json(pipeline))
}

#[derive(Debug, Serialize)]
pub struct ActionDistribution {
    pub by_name: std::collections::HashMap<String, i64>,
}

/// `GET /v1/insights/agents` — per-agent cost/call ranking, same shape as
/// `GET /v1/cost?group_by=agent`.
pub async fn insights_agents(
    ctx: Ctx,
    State(state): State<Arc<AppState>>,
    Query(query): Query<RangeQuery>,
) -> AppResult<Json<Vec<CostGroupRow>>> {
    let (since, until) = resolve_range(query.since, query.until);
    let rows =
        metrics::get_cost_summary(state.storage.as_ref(), &ctx.tenant_id, CostGroupBy::Agent, since, until).await?;
    Ok(Json(rows))
}

pub async fn insights_models(
    ctx: Ctx,
    State(state): State<Arc<AppState>>,
    Query(query): Query<RangeQuery>,
) -> AppResult<Json<Vec<CostGroupRow>>> {
    let (since, until) = resolve_range(query.since, query.until);
    let rows =
        metrics::get_cost_summary(state.storage.as_ref(), &ctx.tenant_id, CostGroupBy::Model, since, until).await?;
    Ok(Json(rows))
}

pub async fn insights_timeseries(
    ctx: Ctx,
    State(state): State<Arc<AppState>>,
    Query(query): Query<TimeseriesQuery>,
) -> AppResult<Json<Vec<TimeseriesPoint>>> {
    get_cost_timeseries(ctx, State(state), Query(query)).await
}

pub async fn insights_errors(
    ctx: Ctx,
    State(state): State<Arc<AppState>>,
    Query(query): Query<RangeQuery>,
) -> AppResult<Json<ErrorBreakdown>> {
    let (since, until) = resolve_range(query.since, query.until);
    let breakdown = metrics::get_error_insights(state.storage.as_ref(), &ctx.tenant_id, since, until).await?;
    Ok(Json(breakdown))
}

pub async fn insights_prompts(
    ctx: Ctx,
    State(state): State<Arc<AppState>>,
    Query(query): Query<RangeQuery>,
) -> AppResult<Json<Option<BiggestPrompt>>> {
    let (since, until) = resolve_range(query.since, query.until);
    let prompt = metrics::get_biggest_prompt(state.storage.as_ref(), &ctx.tenant_id, since, until).await?;
    Ok(Json(prompt))
}

pub async fn insights_actions(
    ctx: Ctx,
    State(state): State<Arc<AppState>>,
    Query(query): Query<RangeQuery>,
) -> AppResult<Json<ActionDistribution>> {
    let (since, until) = resolve_range(query.since, query.until);
    let by_name = metrics::get_action_distribution(state.storage.as_ref(), &ctx.tenant_id, since, until).await?;
    Ok(Json(ActionDistribution { by_name }))
}
