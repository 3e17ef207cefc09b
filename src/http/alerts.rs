use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use crate::domain::{AlertAction, AlertHistoryEntry, AlertRule, ConditionConfig, Role};
use crate::error::AppResult;
use crate::state::AppState;

use super::helpers::{require_role, Ctx};

#[derive(Debug, Deserialize)]
pub struct CreateRuleRequest {
    pub name: String,
    #[serde(flatten)]
    pub condition: ConditionConfig,
    pub actions: Vec<AlertAction>,
    #[serde(default = "default_cooldown")]
    pub cooldown_seconds: i64,
}

fn default_cooldown() -> i64 {
    300
}

pub async fn create_rule(
    ctx: Ctx,
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateRuleRequest>,
) -> AppResult<Json<AlertRule>> {
    require_role(&ctx, Role::Admin)?;
    let rule = AlertRule {
        rule_id: Uuid::new_v4().to_string(),
        tenant_id: ctx.tenant_id.clone(),
        name: req.name,
        condition: req.condition,
        actions: req.actions,
        cooldown_seconds: req.cooldown_seconds,
        is_enabled: true,
        created_at: chrono::Utc::now(),
    };
    state.storage.create_alert_rule(rule.clone()).await?;
    Ok(Json(rule))
}

pub async fn list_rules(ctx: Ctx, State(state): State<Arc<AppState>>) -> AppResult<Json<Vec<AlertRule>>> {
    let rules = state.storage.list_alert_rules(&ctx.tenant_id).await?;
    Ok(Json(rules))
}

#[derive(Debug, Deserialize)]
pub struct UpdateRuleRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub condition: Option<ConditionConfig>,
    #[serde(default)]
    pub actions: Option<Vec<AlertAction>>,
    #[serde(default)]
    pub cooldown_seconds: Option<i64>,
    #[serde(default)]
    pub is_enabled: Option<bool>,
}

pub async fn update_rule(
    ctx: Ctx,
    State(state): State<Arc<AppState>>,
    Path(rule_id): Path<String>,
    Json(req): Json<UpdateRuleRequest>,
) -> AppResult<Json<AlertRule>> {
    require_role(&ctx, Role::Admin)?;
    let mut rule = state.storage.get_alert_rule(&ctx.tenant_id, &rule_id).await?;
    if let Some(name) = req.name {
        rule.name = name;
    }
    if let Some(condition) = req.condition {
        rule.condition = condition;
    }
    if let Some(actions) = req.actions {
        rule.actions = actions;
    }
    if let Some(cooldown) = req.cooldown_seconds {
        rule.cooldown_seconds = cooldown;
    }
    if let Some(enabled) = req.is_enabled {
        rule.is_enabled = enabled;
    }
    state.storage.update_alert_rule(rule.clone()).await?;
    Ok(Json(rule))
}

pub async fn delete_rule(
    ctx: Ctx,
    State(state): State<Arc<AppState>>,
    Path(rule_id): Path<String>,
) -> AppResult<Json<serde_json::Value>> {
    require_role(&ctx, Role::Admin)?;
    state.storage.delete_alert_rule(&ctx.tenant_id, &rule_id).await?;
    Ok(Json(serde_json::json!({ "deleted": true })))
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    #[serde(default)]
    pub rule_id: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
}

pub async fn list_history(
    ctx: Ctx,
    State(state): State<Arc<AppState>>,
    Query(query): Query<HistoryQuery>,
) -> AppResult<Json<Vec<AlertHistoryEntry>>> {
    let limit = query.limit.unwrap_or(100).min(500).max(1);
    let history = state
        .storage
        .list_alert_history(&ctx.tenant_id, query.rule_id.as_deref(), limit)
        .await?;
    Ok(Json(history))
}
