use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{Project, Role};
use crate::error::{AppError, AppResult};
use crate::state::AppState;

use super::helpers::{require_role, slugify, Ctx};

#[derive(Debug, Deserialize)]
pub struct ListProjectsQuery {
    #[serde(default)]
    pub include_archived: bool,
}

pub async fn list_projects(
    ctx: Ctx,
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListProjectsQuery>,
) -> AppResult<Json<Vec<Project>>> {
    let projects = state
        .storage
        .list_projects(&ctx.tenant_id, query.include_archived)
        .await?;
    Ok(Json(projects))
}

#[derive(Debug, Deserialize)]
pub struct CreateProjectRequest {
    pub name: String,
    #[serde(default)]
    pub environment: Option<String>,
}

pub async fn create_project(
    ctx: Ctx,
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateProjectRequest>,
) -> AppResult<Json<Project>> {
    require_role(&ctx, Role::Member)?;

    let slug = slugify(&req.name);
    if slug.is_empty() {
        return Err(AppError::Validation("name must contain at least one alphanumeric character".into()));
    }
    if state.storage.get_project_by_slug(&ctx.tenant_id, &slug).await?.is_some() {
        return Err(AppError::Conflict("project_slug_exists".into()));
    }

    let project = Project {
        project_id: Uuid::new_v4().to_string(),
        tenant_id: ctx.tenant_id.clone(),
        name: req.name,
        slug,
        environment: req.environment,
        is_archived: false,
        created_at: chrono::Utc::now(),
    };
    state.storage.create_project(project.clone()).await?;
    Ok(Json(project))
}

pub async fn get_project(
    ctx: Ctx,
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<String>,
) -> AppResult<Json<Project>> {
    let project = state.storage.get_project(&ctx.tenant_id, &project_id).await?;
    Ok(Json(project))
}

#[derive(Debug, Deserialize)]
pub struct UpdateProjectRequest {
    pub name: String,
    #[serde(default)]
    pub environment: Option<String>,
}

pub async fn update_project(
    ctx: Ctx,
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<String>,
    Json(req): Json<UpdateProjectRequest>,
) -> AppResult<Json<Project>> {
    require_role(&ctx, Role::Member)?;
    let mut project = state.storage.get_project(&ctx.tenant_id, &project_id).await?;
    project.name = req.name;
    project.environment = req.environment;
    state.storage.update_project(project.clone()).await?;
    Ok(Json(project))
}

pub async fn archive_project(
    ctx: Ctx,
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<String>,
) -> AppResult<Json<serde_json::Value>> {
    require_role(&ctx, Role::Member)?;
    state.storage.set_project_archived(&ctx.tenant_id, &project_id, true).await?;
    Ok(Json(serde_json::json!({ "archived": true })))
}

pub async fn unarchive_project(
    ctx: Ctx,
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<String>,
) -> AppResult<Json<serde_json::Value>> {
    require_role(&ctx, Role::Member)?;
    state.storage.set_project_archived(&ctx.tenant_id, &project_id, false).await?;
    Ok(Json(serde_json::json!({ "archived": false })))
}

#[derive(Debug, Deserialize)]
pub struct DeleteProjectQuery {
    pub reassign_to: String,
}

/// `DELETE /v1/projects/{id}?reassign_to=<project_id>` — the default
/// project can never be the one deleted, but it's a valid
/// `reassign_to` target.
pub async fn delete_project(
    ctx: Ctx,
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<String>,
    Query(query): Query<DeleteProjectQuery>,
) -> AppResult<Json<serde_json::Value>> {
    require_role(&ctx, Role::Admin)?;

    let project = state.storage.get_project(&ctx.tenant_id, &project_id).await?;
    if project.is_default() {
        return Err(AppError::Validation("cannot delete the default project".into()));
    }
    if !state.storage.project_exists(&ctx.tenant_id, &query.reassign_to).await? {
        return Err(AppError::Validation("reassign_to project does not exist".into()));
    }

    state
        .storage
        .delete_project(&ctx.tenant_id, &project_id, &query.reassign_to)
        .await?;
    Ok(Json(serde_json::json!({ "deleted": true })))
}

#[derive(Debug, Deserialize)]
pub struct MergeProjectRequest {
    pub source_slug: String,
    pub target_slug: String,
}

pub async fn merge_project(
    ctx: Ctx,
    State(state): State<Arc<AppState>>,
    Json(req): Json<MergeProjectRequest>,
) -> AppResult<Json<serde_json::Value>> {
    require_role(&ctx, Role::Admin)?;
    if req.source_slug == req.target_slug {
        return Err(AppError::Validation("source and target must differ".into()));
    }
    state
        .storage
        .merge_project(&ctx.tenant_id, &req.source_slug, &req.target_slug)
        .await?;
    Ok(Json(serde_json::json!({ "merged": true })))
}
