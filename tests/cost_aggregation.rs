mod common;

use axum::http::StatusCode;
use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use common::{call, register_tenant, test_app};

/// Two `llm_call` events for the same agent roll up into one hourly bucket;
/// `GET /v1/metrics` and `GET /v1/cost` both read that rollup back.
#[tokio::test]
async fn llm_call_costs_roll_up_into_metrics_and_cost_summary() {
    let (app, _dir) = test_app().await;
    let key = register_tenant(&app, "Cost Co", "owner@cost.test").await;
    let now = Utc::now();

    let ingest = call(
        &app,
        "POST",
        "/v1/ingest",
        Some(&key),
        Some(json!({
            "envelope": { "agent_id": "agent-llm" },
            "events": [
                {
                    "event_id": Uuid::new_v4(),
                    "event_type": "custom",
                    "timestamp": now,
                    "payload": {
                        "kind": "llm_call",
                        "data": { "name": "summarize", "model": "gpt-4o", "tokens_in": 100, "tokens_out": 40, "cost": 0.03 }
                    }
                },
                {
                    "event_id": Uuid::new_v4(),
                    "event_type": "custom",
                    "timestamp": now,
                    "payload": {
                        "kind": "llm_call",
                        "data": { "name": "summarize", "model": "gpt-4o", "tokens_in": 80, "tokens_out": 20, "cost": 0.02 }
                    }
                },
            ],
        })),
    )
    .await;
    assert_eq!(ingest.status, StatusCode::OK);
    assert_eq!(ingest.json["accepted"], 2);

    let metrics = call(&app, "GET", "/v1/metrics", Some(&key), None).await;
    assert_eq!(metrics.status, StatusCode::OK);
    assert_eq!(metrics.json["llm_calls"], 2);
    let cost = metrics.json["llm_cost_usd"].as_f64().unwrap();
    assert!((cost - 0.05).abs() < 1e-9, "expected 0.05, got {cost}");

    let cost_summary = call(&app, "GET", "/v1/cost?group_by=agent", Some(&key), None).await;
    assert_eq!(cost_summary.status, StatusCode::OK);
    let rows = cost_summary.json.as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["key"], "agent-llm");
    assert_eq!(rows[0]["calls"], 2);
}
