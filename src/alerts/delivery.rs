use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::{AlertAction, ConditionConfig};

/// The webhook POST body.
#[derive(Debug, Serialize)]
struct WebhookBody<'a> {
    rule_id: &'a str,
    rule_name: &'a str,
    condition_snapshot: &'a ConditionConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    related_agent_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    related_task_id: Option<&'a str>,
    fired_at: DateTime<Utc>,
}

const MAX_ATTEMPTS: u32 = 3;
const BASE_BACKOFF: std::time::Duration = std::time::Duration::from_millis(250);

/// Delivers one action, best-effort — failures here never block the
/// ingest pipeline. POST JSON, check status, surface the body on failure,
/// with up to `MAX_ATTEMPTS` tries and a doubling backoff between them.
pub async fn deliver(
    client: &reqwest::Client,
    timeout: std::time::Duration,
    action: &AlertAction,
    rule_id: &str,
    rule_name: &str,
    condition: &ConditionConfig,
    related_agent_id: Option<&str>,
    related_task_id: Option<&str>,
    fired_at: DateTime<Utc>,
) -> Result<(), String> {
    match action {
        AlertAction::Webhook { url } => {
            let body = WebhookBody {
                rule_id,
                rule_name,
                condition_snapshot: condition,
                related_agent_id,
                related_task_id,
                fired_at,
            };

            let mut last_err = String::new();
            for attempt in 0..MAX_ATTEMPTS {
                if attempt > 0 {
                    tokio::time::sleep(BASE_BACKOFF * 2u32.pow(attempt - 1)).await;
                }
                match client.post(url).timeout(timeout).json(&body).send().await {
                    Ok(response) if response.status().is_success() => return Ok(()),
                    Ok(response) => {
                        let status = response.status();
                        let text = response.text().await.unwrap_or_default();
                        last_err = format!("webhook returned {status}: {text}");
                    }
                    Err(e) => last_err = e.to_string(),
                }
            }
            Err(last_err)
        }
        // Out of scope: email delivery is an external collaborator.
        // Recording in history as queued is this core's whole responsibility.
        AlertAction::Email { .. } => Ok(()),
    }
}
