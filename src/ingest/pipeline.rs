use std::sync::Arc;

use serde::Serialize;

use crate::domain::{AgentUpsert, Event, IngestBatch};
use crate::error::AppError;
use crate::storage::{AcceptedEvent, BatchCommitResult, StorageBackend};

use super::validate::{self, RejectedEvent, MAX_BATCH_EVENTS};

/// The `/v1/ingest` response body. `200` when `rejected == 0`,
/// `207` otherwise; the handler picks the status from this shape.
#[derive(Debug, Serialize)]
pub struct IngestResponse {
    pub accepted: usize,
    pub rejected: usize,
    pub warnings: Vec<String>,
    pub errors: Vec<RejectedEvent>,
}

/// Everything the caller needs after a batch commits: the response body plus
/// the raw commit result for the WS fan-out and alert engine to consume,
/// best-effort, without re-deriving it.
pub struct IngestRun {
    pub response: IngestResponse,
    pub commit: BatchCommitResult,
}

/// Runs the core ingest stages as one call: envelope validation,
/// per-event validation/expansion, project referential check, and the
/// atomic storage commit. Broadcast and alert evaluation are the caller's
/// responsibility — they're best-effort and must never fail the request.
pub async fn run_batch(
    storage: &Arc<dyn StorageBackend>,
    tenant_id: &str,
    batch: IngestBatch,
) -> Result<IngestRun, AppError> {
    validate::validate_envelope(&batch.envelope).map_err(AppError::Validation)?;

    if batch.events.len() > MAX_BATCH_EVENTS {
        return Err(AppError::Validation(format!(
            "batch exceeds the {MAX_BATCH_EVENTS}-event limit"
        )));
    }

    let mut warnings = Vec::new();
    let mut errors = Vec::new();
    let mut accepted_events: Vec<Event> = Vec::new();

    for raw in batch.events {
        let event = match validate::validate_and_expand(raw, &batch.envelope, tenant_id) {
            Ok(event) => event,
            Err(rejected) => {
                errors.push(rejected);
                continue;
            }
        };

        if let Some(project_id) = &event.project_id {
            match storage.project_exists(tenant_id, project_id).await {
                Ok(true) => {}
                Ok(false) => {
                    errors.push(RejectedEvent {
                        event_id: Some(event.event_id),
                        error: "invalid_project_id",
                        message: format!("project '{project_id}' does not exist"),
                    });
                    continue;
                }
                Err(e) => return Err(e.into()),
            }
        }

        warnings.extend(validate::payload_warnings(event.event_id, &event.payload));
        accepted_events.push(event);
    }

    // Events stay in request order here: storage commit, WS broadcast, and
    // alert evaluation all consume this order directly, and a subscriber
    // must see events in the order they were committed. `AgentCache::apply`
    // resolves the chronologically-latest-wins fields itself via a
    // running max-by-timestamp comparison, so it doesn't need this vector
    // pre-sorted.
    let accepted: Vec<AcceptedEvent> = accepted_events
        .into_iter()
        .map(|event| {
            let agent_upsert = upsert_from_event(&event, &batch.envelope);
            AcceptedEvent { event, agent_upsert }
        })
        .collect();

    let accepted_count_pre_dedup = accepted.len();
    let commit = storage.commit_batch(tenant_id, accepted).await?;
    let duplicate_count = commit.duplicate_ids.len();
    let accepted_count = accepted_count_pre_dedup - duplicate_count;

    let response = IngestResponse {
        accepted: accepted_count,
        rejected: errors.len(),
        warnings,
        errors,
    };

    Ok(IngestRun { response, commit })
}

fn upsert_from_event(event: &Event, envelope: &crate::domain::Envelope) -> AgentUpsert {
    use crate::domain::event::TypedPayload;
    use crate::domain::EventType;

    let is_heartbeat = event.event_type == EventType::Heartbeat;
    let heartbeat_payload = if is_heartbeat && !event.payload.data.is_null() {
        Some(event.payload.data.clone())
    } else {
        None
    };
    let queue_state = match event.payload.typed() {
        TypedPayload::QueueSnapshot(data) => {
            data.depth.map(|d| serde_json::json!({ "depth": d }))
        }
        _ => None,
    };

    AgentUpsert {
        agent_type: envelope.agent_type.clone(),
        // No wire field carries agent_version today; left for a future
        // envelope revision.
        agent_version: None,
        framework: envelope.framework.clone(),
        runtime: envelope.runtime.clone(),
        sdk_version: envelope.sdk_version.clone(),
        environment: event.environment.clone(),
        group: event.group.clone(),
        seen_at: event.timestamp,
        is_heartbeat,
        event_type: event.event_type,
        task_id: event.task_id.clone(),
        project_id: event.project_id.clone(),
        heartbeat_payload,
        queue_state,
    }
}
