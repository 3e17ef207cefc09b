use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;

use crate::alerts;
use crate::domain::IngestBatch;
use crate::error::AppError;
use crate::ingest;
use crate::state::AppState;
use crate::ws::{Channel, ServerMessage};

use super::helpers::Ctx;

/// `POST /v1/ingest`. Storage commit is atomic;
/// WS fan-out and alert evaluation happen afterward, best-effort, and never
/// turn a successful commit into a failed response.
pub async fn ingest(
    ctx: Ctx,
    State(state): State<Arc<AppState>>,
    Json(batch): Json<IngestBatch>,
) -> Result<impl IntoResponse, AppError> {
    if !ctx.principal.can_mutate() {
        return Err(AppError::Authorization("read-only key cannot ingest events".into()));
    }

    let run = ingest::run_batch(&state.storage, &ctx.tenant_id, batch).await?;
    let now = Utc::now();

    for event in &run.commit.inserted {
        state
            .ws_registry
            .broadcast(&ctx.tenant_id, Channel::Events, ServerMessage::EventNew { event: event.clone() })
            .await;
    }

    for agent in &run.commit.touched_agents {
        state.status_tracker.check_and_emit(&state.ws_registry, agent, now).await;
    }

    alerts::evaluate_batch(
        &state.storage,
        &state.http_client,
        state.config.webhook_timeout,
        &ctx.tenant_id,
        &run.commit.inserted,
        now,
    )
    .await;

    let status = if run.response.rejected == 0 {
        StatusCode::OK
    } else {
        StatusCode::MULTI_STATUS
    };
    Ok((status, Json(run.response)))
}
