use std::sync::Arc;

use axum::extract::State;
use axum::Json;

use crate::domain::Role;
use crate::error::AppResult;
use crate::retention;
use crate::state::AppState;

use super::helpers::{require_role, Ctx};

/// `POST /v1/admin/retention/run` — manual trigger alongside the daily
/// background pass, for admin use. Scoped to the caller's own tenant; the
/// unscoped all-tenant sweep only ever runs from the daily background job.
pub async fn run_retention(ctx: Ctx, State(state): State<Arc<AppState>>) -> AppResult<Json<serde_json::Value>> {
    require_role(&ctx, Role::Owner)?;
    retention::run_once(&state.storage, &state.config, &ctx.tenant_id).await;
    Ok(Json(serde_json::json!({ "ran": true })))
}

/// `POST /v1/admin/aggregates/rebuild` — empties and replays this tenant's
/// hourly buckets from its surviving raw events. An admin-triggered
/// operation; it never runs automatically.
pub async fn rebuild_aggregates(ctx: Ctx, State(state): State<Arc<AppState>>) -> AppResult<Json<serde_json::Value>> {
    require_role(&ctx, Role::Owner)?;
    state.storage.rebuild_aggregates(&ctx.tenant_id).await?;
    Ok(Json(serde_json::json!({ "rebuilt": true })))
}
