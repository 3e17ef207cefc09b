use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::{HeaderMap, Method};
use axum::middleware::Next;
use axum::response::Response;
use uuid::Uuid;

use crate::auth::context::{Principal, RequestContext};
use crate::auth::{apikey, jwt};
use crate::error::AppError;
use crate::state::AppState;

fn bearer_credential(headers: &HeaderMap) -> Result<&str, AppError> {
    let raw = headers
        .get(axum::http::header::AUTHORIZATION)
        .ok_or_else(|| AppError::Authentication("missing Authorization header".into()))?
        .to_str()
        .map_err(|_| AppError::Authentication("malformed Authorization header".into()))?;
    raw.strip_prefix("Bearer ")
        .ok_or_else(|| AppError::Authentication("expected a Bearer credential".into()))
}

/// Dispatches on the credential shape: `hb_`-prefixed strings are
/// API keys looked up by hash; everything else is tried as a JWT. Builds the
/// `RequestContext` and attaches it as a request extension for downstream
/// handlers and the rate-limit layer to read.
pub async fn authenticate(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let credential = bearer_credential(req.headers())?.to_string();

    let principal_ctx = if apikey::looks_like_api_key(&credential) {
        let hash = apikey::hash_key(&credential);
        let key = state
            .storage
            .authenticate(&hash)
            .await?
            .ok_or_else(|| AppError::Authentication("unknown or inactive API key".into()))?;

        if !req.method_is_safe() && !key_type_allows_mutation(key.key_type) {
            return Err(AppError::Authorization(
                "read-only API keys cannot perform mutating requests".into(),
            ));
        }

        let tenant_id = key.tenant_id.clone();
        let key_id = key.key_id.clone();
        let storage = state.storage.clone();
        tokio::spawn(async move {
            let _ = storage.touch_api_key(&key_id).await;
        });

        RequestContext {
            tenant_id,
            request_id: Uuid::new_v4(),
            principal: Principal::ApiKey {
                key_id: key.key_id,
                key_type: key.key_type,
            },
        }
    } else {
        let claims = jwt::verify(&credential, &state.config.jwt_secret)
            .map_err(|_| AppError::Authentication("invalid or expired session token".into()))?;
        RequestContext {
            tenant_id: claims.tenant_id,
            request_id: Uuid::new_v4(),
            principal: Principal::User {
                user_id: claims.sub,
                role: claims.role,
            },
        }
    };

    req.extensions_mut().insert(principal_ctx);
    Ok(next.run(req).await)
}

fn key_type_allows_mutation(key_type: crate::domain::KeyType) -> bool {
    !matches!(key_type, crate::domain::KeyType::Read)
}

trait MethodSafety {
    fn method_is_safe(&self) -> bool;
}

impl MethodSafety for Request {
    fn method_is_safe(&self) -> bool {
        matches!(*self.method(), Method::GET | Method::HEAD | Method::OPTIONS)
    }
}

/// Per-key rate limiting. Runs after `authenticate` so the
/// context extension is already present; `bucket` selects which of the two
/// independently budgeted limiters (ingest vs query) applies to this route.
pub async fn rate_limit(
    bucket: RateLimitBucket,
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let ctx = req
        .extensions()
        .get::<RequestContext>()
        .cloned()
        .ok_or_else(|| AppError::Internal("rate limiting ran before authentication".into()))?;

    let key = match &ctx.principal {
        Principal::ApiKey { key_id, .. } => key_id.clone(),
        Principal::User { user_id, .. } => user_id.clone(),
    };

    let limiter = match bucket {
        RateLimitBucket::Ingest => &state.rate_limiters.ingest,
        RateLimitBucket::Query => &state.rate_limiters.query,
    };

    if let Err(denied) = limiter.try_acquire(&key).await {
        return Err(AppError::RateLimited {
            retry_after_seconds: denied.retry_after_seconds,
        });
    }

    Ok(next.run(req).await)
}

#[derive(Debug, Clone, Copy)]
pub enum RateLimitBucket {
    Ingest,
    Query,
}

pub async fn rate_limit_ingest(
    state: State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    rate_limit(RateLimitBucket::Ingest, state, req, next).await
}

pub async fn rate_limit_query(
    state: State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    rate_limit(RateLimitBucket::Query, state, req, next).await
}
