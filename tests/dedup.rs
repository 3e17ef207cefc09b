mod common;

use axum::http::StatusCode;
use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use common::{call, register_tenant, test_app};

/// Re-ingesting the same `event_id` is accepted as a no-op duplicate, not
/// rejected and not double-counted — events are immutable and idempotent
/// on `event_id`.
#[tokio::test]
async fn resubmitting_the_same_event_id_does_not_double_count() {
    let (app, _dir) = test_app().await;
    let key = register_tenant(&app, "Retry Labs", "owner@retry.test").await;
    let event_id = Uuid::new_v4();
    let now = Utc::now();

    let body = json!({
        "envelope": { "agent_id": "agent-retry" },
        "events": [
            {
                "event_id": event_id,
                "event_type": "task_completed",
                "task_id": "task-dup",
                "timestamp": now,
            },
        ],
    });

    let first = call(&app, "POST", "/v1/ingest", Some(&key), Some(body.clone())).await;
    assert_eq!(first.status, StatusCode::OK);
    assert_eq!(first.json["accepted"], 1);

    let second = call(&app, "POST", "/v1/ingest", Some(&key), Some(body)).await;
    assert_eq!(second.status, StatusCode::OK);
    assert_eq!(second.json["accepted"], 0, "duplicate resubmission must not be re-accepted");
    assert_eq!(second.json["rejected"], 0, "a duplicate is a no-op, not a rejection");

    let metrics = call(&app, "GET", "/v1/metrics", Some(&key), None).await;
    assert_eq!(metrics.json["tasks_completed"], 1);
}
