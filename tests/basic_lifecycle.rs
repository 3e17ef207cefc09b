mod common;

use axum::http::StatusCode;
use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use common::{call, register_tenant, test_app};

/// Register -> heartbeat -> task started -> task completed, then read the
/// derived agent view back and confirm it reflects the batch.
#[tokio::test]
async fn agent_moves_from_idle_through_a_completed_task() {
    let (app, _dir) = test_app().await;
    let key = register_tenant(&app, "Acme Robotics", "owner@acme.test").await;

    let now = Utc::now();
    let task_id = Uuid::new_v4().to_string();

    let ingest = call(
        &app,
        "POST",
        "/v1/ingest",
        Some(&key),
        Some(json!({
            "envelope": { "agent_id": "agent-1", "agent_type": "worker" },
            "events": [
                {
                    "event_id": Uuid::new_v4(),
                    "event_type": "heartbeat",
                    "timestamp": now,
                },
                {
                    "event_id": Uuid::new_v4(),
                    "event_type": "task_started",
                    "task_id": task_id,
                    "timestamp": now,
                },
                {
                    "event_id": Uuid::new_v4(),
                    "event_type": "task_completed",
                    "task_id": task_id,
                    "duration_ms": 4200,
                    "timestamp": now,
                },
            ],
        })),
    )
    .await;
    assert_eq!(ingest.status, StatusCode::OK);
    assert_eq!(ingest.json["accepted"], 3);
    assert_eq!(ingest.json["rejected"], 0);

    let agent = call(&app, "GET", "/v1/agents/agent-1", Some(&key), None).await;
    assert_eq!(agent.status, StatusCode::OK);
    assert_eq!(agent.json["derived_status"], "idle");
    assert_eq!(agent.json["agent_type"], "worker");
    assert_eq!(agent.json["stats_1h"]["tasks_completed"], 1);

    let timeline = call(
        &app,
        "GET",
        &format!("/v1/tasks/{task_id}/timeline"),
        Some(&key),
        None,
    )
    .await;
    assert_eq!(timeline.status, StatusCode::OK);
    assert_eq!(timeline.json["events"].as_array().unwrap().len(), 2);
}
