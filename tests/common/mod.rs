use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use hiveboard::config::Config;
use hiveboard::state::AppState;
use serde_json::Value;
use tower::ServiceExt;

/// Builds a router against a disposable `InMemoryStorage` rooted in a fresh
/// tempdir, standing up a real `AppState` rather than mocking it. The
/// `TempDir` guard must outlive every call made against the returned router.
pub async fn test_app() -> (Router, tempfile::TempDir) {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = Config {
        bind_addr: "127.0.0.1:0".to_string(),
        data_dir: dir.path().to_path_buf(),
        jwt_secret: "test-secret".to_string(),
        rate_limit_ingest_rps: 10_000,
        rate_limit_query_rps: 10_000,
        heartbeat_compaction_hours: 24,
        aggregate_retention_days: 90,
        webhook_timeout: std::time::Duration::from_secs(5),
        allowed_origins: None,
    };
    let state = Arc::new(AppState::new(config).await);
    (hiveboard::http::router(state), dir)
}

pub struct TestResponse {
    pub status: StatusCode,
    pub json: Value,
}

/// One-shot JSON request against `app`. `bearer` is the raw credential
/// (no `Bearer ` prefix); `body` is serialized as the request's JSON.
pub async fn call(
    app: &Router,
    method: &str,
    uri: &str,
    bearer: Option<&str>,
    body: Option<Value>,
) -> TestResponse {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = bearer {
        builder = builder.header("Authorization", format!("Bearer {token}"));
    }
    let request = if let Some(body) = body {
        builder
            .header("Content-Type", "application/json")
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap()
    } else {
        builder.body(Body::empty()).unwrap()
    };

    let response = app.clone().oneshot(request).await.expect("request failed");
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    TestResponse { status, json }
}

/// Registers a fresh tenant + owner user, returning the issued live API key.
pub async fn register_tenant(app: &Router, tenant_name: &str, email: &str) -> String {
    let resp = call(
        app,
        "POST",
        "/v1/auth/register",
        None,
        Some(serde_json::json!({
            "email": email,
            "password": "correct-horse-battery-staple",
            "name": "Test Owner",
            "tenant_name": tenant_name,
        })),
    )
    .await;
    assert_eq!(resp.status, StatusCode::OK, "register failed: {:?}", resp.json);
    resp.json["api_key"].as_str().unwrap().to_string()
}
