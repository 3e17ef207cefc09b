use chrono::Utc;
use uuid::Uuid;

use crate::domain::event::TypedPayload;
use crate::domain::{Envelope, Event, EventType, Payload, RawEvent, Severity};

pub const MAX_BATCH_EVENTS: usize = 500;
pub const MAX_BATCH_BYTES: usize = 1024 * 1024;
const MAX_ID_LEN: usize = 256;
const MAX_ENVIRONMENT_LEN: usize = 64;
const MAX_GROUP_LEN: usize = 128;

/// One rejected event in a 207 response.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RejectedEvent {
    pub event_id: Option<Uuid>,
    pub error: &'static str,
    pub message: String,
}

/// An advisory payload-convention shortfall — never
/// rejects the event, only surfaces as a warning string in the response.
pub fn payload_warnings(event_id: Uuid, payload: &Payload) -> Vec<String> {
    let Some(kind) = payload.kind.as_deref() else {
        return Vec::new();
    };
    let missing = match payload.typed() {
        TypedPayload::LlmCall(data) => data.missing_fields(),
        TypedPayload::QueueSnapshot(data) => data.missing_fields(),
        TypedPayload::PlanCreated(data) => data.missing_fields(),
        TypedPayload::PlanStep(data) => data.missing_fields(),
        TypedPayload::Issue(data) => data.missing_fields(),
        TypedPayload::Todo(_) | TypedPayload::Scheduled(_) | TypedPayload::Other => Vec::new(),
    };
    if missing.is_empty() {
        Vec::new()
    } else {
        vec![format!(
            "event {event_id}: payload.kind '{kind}' is missing recommended field(s): {}",
            missing.join(", ")
        )]
    }
}

/// Envelope-level structural validation — failures here
/// reject the whole batch with 400, before any per-event work happens.
pub fn validate_envelope(envelope: &Envelope) -> Result<(), String> {
    if envelope.agent_id.trim().is_empty() {
        return Err("envelope.agent_id is required".to_string());
    }
    if envelope.agent_id.len() > MAX_ID_LEN {
        return Err(format!("envelope.agent_id exceeds {MAX_ID_LEN} characters"));
    }
    Ok(())
}

/// Per-event validation + envelope expansion.
/// Returns the fully expanded `Event` on success or a `RejectedEvent` that
/// the caller folds into the batch's `errors` array.
pub fn validate_and_expand(
    raw: RawEvent,
    envelope: &Envelope,
    tenant_id: &str,
) -> Result<Event, RejectedEvent> {
    let event_id = raw.event_id.ok_or_else(|| RejectedEvent {
        event_id: None,
        error: "missing_field",
        message: "event_id is required".to_string(),
    })?;

    let timestamp = raw.timestamp.ok_or_else(|| RejectedEvent {
        event_id: Some(event_id),
        error: "missing_field",
        message: "timestamp is required".to_string(),
    })?;

    let event_type = raw.event_type.ok_or_else(|| RejectedEvent {
        event_id: Some(event_id),
        error: "missing_field",
        message: "event_type is required".to_string(),
    })?;

    let agent_id = raw
        .agent_id
        .clone()
        .unwrap_or_else(|| envelope.agent_id.clone());
    if agent_id.is_empty() {
        return Err(RejectedEvent {
            event_id: Some(event_id),
            error: "missing_field",
            message: "agent_id is required".to_string(),
        });
    }
    if agent_id.len() > MAX_ID_LEN {
        return Err(RejectedEvent {
            event_id: Some(event_id),
            error: "field_too_long",
            message: format!("agent_id exceeds {MAX_ID_LEN} characters"),
        });
    }

    if let Some(task_id) = &raw.task_id {
        if task_id.len() > MAX_ID_LEN {
            return Err(RejectedEvent {
                event_id: Some(event_id),
                error: "field_too_long",
                message: format!("task_id exceeds {MAX_ID_LEN} characters"),
            });
        }
    }

    let environment = raw.environment.clone().or_else(|| envelope.environment.clone());
    if let Some(env) = &environment {
        if env.len() > MAX_ENVIRONMENT_LEN {
            return Err(RejectedEvent {
                event_id: Some(event_id),
                error: "field_too_long",
                message: format!("environment exceeds {MAX_ENVIRONMENT_LEN} characters"),
            });
        }
    }

    let group = raw.group.clone().or_else(|| envelope.group.clone());
    if let Some(g) = &group {
        if g.len() > MAX_GROUP_LEN {
            return Err(RejectedEvent {
                event_id: Some(event_id),
                error: "field_too_long",
                message: format!("group exceeds {MAX_GROUP_LEN} characters"),
            });
        }
    }

    if raw.payload.byte_len() > Payload::MAX_BYTES {
        return Err(RejectedEvent {
            event_id: Some(event_id),
            error: "payload_too_large",
            message: format!("payload exceeds {} bytes", Payload::MAX_BYTES),
        });
    }

    let severity = raw.severity.unwrap_or_else(|| default_severity(event_type, &raw.payload));

    Ok(Event {
        event_id,
        tenant_id: tenant_id.to_string(),
        agent_id,
        task_id: raw.task_id,
        action_id: raw.action_id,
        parent_action_id: raw.parent_action_id,
        parent_event_id: raw.parent_event_id,
        project_id: raw.project_id,
        environment,
        group,
        event_type,
        severity,
        status: raw.status,
        duration_ms: raw.duration_ms,
        error_type: raw.error_type,
        error_message: raw.error_message,
        timestamp,
        received_at: Utc::now(),
        payload: raw.payload,
    })
}

/// Severity defaulting: the `issue` payload kind overrides the
/// event-type default with a severity mapped from `payload.data.severity`.
fn default_severity(event_type: EventType, payload: &Payload) -> Severity {
    if payload.kind.as_deref() == Some("issue") {
        if let TypedPayload::Issue(data) = payload.typed() {
            return data.mapped_severity();
        }
    }
    event_type.default_severity()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn envelope() -> Envelope {
        Envelope {
            agent_id: "agent-1".to_string(),
            agent_type: None,
            environment: None,
            group: None,
            runtime: None,
            sdk_version: None,
            framework: None,
        }
    }

    #[test]
    fn rejects_missing_event_id() {
        let raw = RawEvent {
            event_id: None,
            agent_id: None,
            task_id: None,
            action_id: None,
            parent_action_id: None,
            parent_event_id: None,
            project_id: None,
            environment: None,
            group: None,
            event_type: Some(EventType::Heartbeat),
            severity: None,
            status: None,
            duration_ms: None,
            error_type: None,
            error_message: None,
            timestamp: Some(Utc::now()),
            payload: Payload::default(),
        };
        let err = validate_and_expand(raw, &envelope(), "t1").unwrap_err();
        assert_eq!(err.error, "missing_field");
    }

    #[test]
    fn issue_payload_overrides_default_severity() {
        let raw = RawEvent {
            event_id: Some(Uuid::new_v4()),
            agent_id: None,
            task_id: None,
            action_id: None,
            parent_action_id: None,
            parent_event_id: None,
            project_id: None,
            environment: None,
            group: None,
            event_type: Some(EventType::Custom),
            severity: None,
            status: None,
            duration_ms: None,
            error_type: None,
            error_message: None,
            timestamp: Some(Utc::now()),
            payload: Payload {
                kind: Some("issue".to_string()),
                summary: None,
                data: json!({"severity": "critical", "action": "reported"}),
                tags: None,
            },
        };
        let event = validate_and_expand(raw, &envelope(), "t1").unwrap();
        assert_eq!(event.severity, Severity::Error);
    }
}
