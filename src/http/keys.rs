use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::apikey;
use crate::domain::{ApiKey, KeyType, Role};
use crate::error::AppResult;
use crate::state::AppState;

use super::helpers::{require_role, Ctx};

#[derive(Debug, Serialize)]
pub struct ApiKeySummary {
    pub key_id: String,
    pub key_prefix: String,
    pub key_type: KeyType,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
}

impl From<ApiKey> for ApiKeySummary {
    fn from(k: ApiKey) -> Self {
        Self {
            key_id: k.key_id,
            key_prefix: k.key_prefix,
            key_type: k.key_type,
            is_active: k.is_active,
            created_at: k.created_at,
            last_used_at: k.last_used_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateKeyRequest {
    #[serde(default)]
    pub key_type: Option<KeyType>,
}

#[derive(Debug, Serialize)]
pub struct CreateKeyResponse {
    pub key_id: String,
    pub api_key: String,
    pub key_type: KeyType,
}

/// `POST /v1/api-keys` — the raw credential is returned exactly once.
pub async fn create_key(
    ctx: Ctx,
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateKeyRequest>,
) -> AppResult<Json<CreateKeyResponse>> {
    require_role(&ctx, Role::Admin)?;

    let key_type = req.key_type.unwrap_or(KeyType::Live);
    let issued = apikey::issue(key_type);
    let key = ApiKey {
        key_id: Uuid::new_v4().to_string(),
        tenant_id: ctx.tenant_id.clone(),
        key_hash: issued.hash,
        key_prefix: issued.prefix,
        key_type,
        is_active: true,
        owning_user_id: match &ctx.principal {
            crate::auth::Principal::User { user_id, .. } => Some(user_id.clone()),
            crate::auth::Principal::ApiKey { .. } => None,
        },
        created_at: Utc::now(),
        last_used_at: None,
    };
    let key_id = key.key_id.clone();
    state.storage.create_api_key(key).await?;

    Ok(Json(CreateKeyResponse {
        key_id,
        api_key: issued.raw,
        key_type,
    }))
}

pub async fn list_keys(ctx: Ctx, State(state): State<Arc<AppState>>) -> AppResult<Json<Vec<ApiKeySummary>>> {
    require_role(&ctx, Role::Member)?;
    let keys = state.storage.list_api_keys(&ctx.tenant_id).await?;
    Ok(Json(keys.into_iter().map(ApiKeySummary::from).collect()))
}

pub async fn revoke_key(
    ctx: Ctx,
    State(state): State<Arc<AppState>>,
    Path(key_id): Path<String>,
) -> AppResult<Json<serde_json::Value>> {
    require_role(&ctx, Role::Admin)?;
    state.storage.revoke_api_key(&ctx.tenant_id, &key_id).await?;
    Ok(Json(serde_json::json!({ "revoked": true })))
}
