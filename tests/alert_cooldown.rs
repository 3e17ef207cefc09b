mod common;

use axum::http::StatusCode;
use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use common::{call, register_tenant, test_app};

/// A `task_failed` rule fires on the first qualifying batch and is recorded
/// in history; a second qualifying batch inside the cooldown window does not
/// fire again.
#[tokio::test]
async fn repeated_failures_within_cooldown_only_fire_once() {
    let (app, _dir) = test_app().await;
    let key = register_tenant(&app, "Cooldown Labs", "owner@cooldown.test").await;

    let rule = call(
        &app,
        "POST",
        "/v1/alerts/rules",
        Some(&key),
        Some(json!({
            "name": "task failures page someone",
            "condition_kind": "task_failed",
            "threshold_count": 1,
            "window_seconds": 3600,
            "actions": [{ "type": "email", "to": "oncall@cooldown.test" }],
            "cooldown_seconds": 3600,
        })),
    )
    .await;
    assert_eq!(rule.status, StatusCode::OK, "rule creation failed: {:?}", rule.json);

    let send_failure = || {
        call(
            &app,
            "POST",
            "/v1/ingest",
            Some(&key),
            Some(json!({
                "envelope": { "agent_id": "agent-flaky" },
                "events": [
                    {
                        "event_id": Uuid::new_v4(),
                        "event_type": "task_failed",
                        "task_id": "task-flaky",
                        "timestamp": Utc::now(),
                    },
                ],
            })),
        )
    };

    let first = send_failure().await;
    assert_eq!(first.status, StatusCode::OK);

    let second = send_failure().await;
    assert_eq!(second.status, StatusCode::OK);

    let history = call(&app, "GET", "/v1/alerts/history", Some(&key), None).await;
    assert_eq!(history.status, StatusCode::OK);
    let entries = history.json.as_array().unwrap();
    assert_eq!(entries.len(), 1, "cooldown should suppress the second firing");
}
