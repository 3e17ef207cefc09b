mod common;

use axum::http::StatusCode;
use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use common::{call, register_tenant, test_app};

/// An event naming a `project_id` that doesn't exist in the tenant is
/// rejected individually; the rest of the batch still commits, and the
/// response is `207` with one error entry.
#[tokio::test]
async fn event_with_unknown_project_id_is_rejected_not_the_whole_batch() {
    let (app, _dir) = test_app().await;
    let key = register_tenant(&app, "Project Strict Co", "owner@strict.test").await;
    let now = Utc::now();

    let response = call(
        &app,
        "POST",
        "/v1/ingest",
        Some(&key),
        Some(json!({
            "envelope": { "agent_id": "agent-proj" },
            "events": [
                {
                    "event_id": Uuid::new_v4(),
                    "event_type": "heartbeat",
                    "timestamp": now,
                },
                {
                    "event_id": Uuid::new_v4(),
                    "event_type": "task_started",
                    "project_id": "does-not-exist",
                    "task_id": "task-1",
                    "timestamp": now,
                },
            ],
        })),
    )
    .await;

    assert_eq!(response.status, StatusCode::MULTI_STATUS);
    assert_eq!(response.json["accepted"], 1);
    assert_eq!(response.json["rejected"], 1);
    let errors = response.json["errors"].as_array().unwrap();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0]["error"], "invalid_project_id");
}
