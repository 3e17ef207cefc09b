mod common;

use axum::http::StatusCode;
use chrono::{Duration, Utc};
use serde_json::json;
use uuid::Uuid;

use common::{call, register_tenant, test_app};

/// An agent that last heartbeat well past its stuck threshold reads back as
/// `stuck`, purely from elapsed time against the stored heartbeat — no
/// second ingest call is needed to observe the transition.
#[tokio::test]
async fn agent_with_a_stale_heartbeat_is_derived_as_stuck() {
    let (app, _dir) = test_app().await;
    let key = register_tenant(&app, "Stale Agents Inc", "owner@stale.test").await;

    let stale_heartbeat = Utc::now() - Duration::minutes(10);
    let ingest = call(
        &app,
        "POST",
        "/v1/ingest",
        Some(&key),
        Some(json!({
            "envelope": { "agent_id": "agent-stale" },
            "events": [
                {
                    "event_id": Uuid::new_v4(),
                    "event_type": "heartbeat",
                    "timestamp": stale_heartbeat,
                },
            ],
        })),
    )
    .await;
    assert_eq!(ingest.status, StatusCode::OK);

    let agent = call(&app, "GET", "/v1/agents/agent-stale", Some(&key), None).await;
    assert_eq!(agent.status, StatusCode::OK);
    assert_eq!(agent.json["derived_status"], "stuck");
    assert!(agent.json["heartbeat_age_seconds"].as_i64().unwrap() >= 590);
}

/// An agent that has never heartbeat at all is conservatively `stuck` from
/// its very first observation, regardless of how recent its other events
/// are — no heartbeat on record means the agent cannot be proven alive.
#[tokio::test]
async fn agent_that_never_heartbeats_is_stuck_from_the_start() {
    let (app, _dir) = test_app().await;
    let key = register_tenant(&app, "No Heartbeat Co", "owner@noheartbeat.test").await;

    let ingest = call(
        &app,
        "POST",
        "/v1/ingest",
        Some(&key),
        Some(json!({
            "envelope": { "agent_id": "agent-silent" },
            "events": [
                {
                    "event_id": Uuid::new_v4(),
                    "event_type": "task_started",
                    "task_id": "task-1",
                    "timestamp": Utc::now(),
                },
            ],
        })),
    )
    .await;
    assert_eq!(ingest.status, StatusCode::OK);

    let agent = call(&app, "GET", "/v1/agents/agent-silent", Some(&key), None).await;
    assert_eq!(agent.status, StatusCode::OK);
    assert_eq!(agent.json["derived_status"], "stuck");
}
