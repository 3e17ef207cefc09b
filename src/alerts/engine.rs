use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::domain::{ActionDelivery, AlertHistoryEntry, DeliveryStatus, Event};
use crate::storage::StorageBackend;

use super::{delivery, evaluator};

/// Runs stage 12 of ingest: evaluates every enabled rule for `tenant_id`
/// against the events that just committed, enforcing cooldown and
/// delivering actions. Failures here are logged and otherwise
/// swallowed — they must never fail the ingest request.
pub async fn evaluate_batch(
    storage: &Arc<dyn StorageBackend>,
    http_client: &reqwest::Client,
    webhook_timeout: StdDuration,
    tenant_id: &str,
    accepted: &[Event],
    now: DateTime<Utc>,
) {
    let rules = match storage.list_enabled_alert_rules(tenant_id).await {
        Ok(r) => r,
        Err(e) => {
            tracing::error!(error = %e, tenant_id, "failed to list alert rules");
            return;
        }
    };

    for rule in rules {
        if let Err(e) = evaluate_rule(storage, http_client, webhook_timeout, tenant_id, &rule, accepted, now).await
        {
            tracing::error!(error = %e, rule_id = %rule.rule_id, "alert rule evaluation failed");
        }
    }
}

async fn evaluate_rule(
    storage: &Arc<dyn StorageBackend>,
    http_client: &reqwest::Client,
    webhook_timeout: StdDuration,
    tenant_id: &str,
    rule: &crate::domain::AlertRule,
    accepted: &[Event],
    now: DateTime<Utc>,
) -> Result<(), crate::storage::StorageError> {
    let result = evaluator::evaluate(storage.as_ref(), tenant_id, &rule.condition, accepted, now).await?;
    if !result.fired {
        return Ok(());
    }

    if let Some(last) = storage.get_last_alert_for_rule(tenant_id, &rule.rule_id).await? {
        if now - last.fired_at < Duration::seconds(rule.cooldown_seconds) {
            return Ok(());
        }
    }

    let mut deliveries = Vec::with_capacity(rule.actions.len());
    for action in &rule.actions {
        let outcome = delivery::deliver(
            http_client,
            webhook_timeout,
            action,
            &rule.rule_id,
            &rule.name,
            &rule.condition,
            result.related_agent_id.as_deref(),
            result.related_task_id.as_deref(),
            now,
        )
        .await;

        deliveries.push(match outcome {
            Ok(()) => ActionDelivery {
                action: action.clone(),
                status: DeliveryStatus::Delivered,
                detail: None,
            },
            Err(detail) => ActionDelivery {
                action: action.clone(),
                status: DeliveryStatus::Failed,
                detail: Some(detail),
            },
        });
    }

    storage
        .insert_alert(AlertHistoryEntry {
            alert_id: Uuid::new_v4().to_string(),
            rule_id: rule.rule_id.clone(),
            tenant_id: tenant_id.to_string(),
            fired_at: now,
            condition_snapshot: rule.condition.clone(),
            related_agent_id: result.related_agent_id,
            related_task_id: result.related_task_id,
            deliveries,
        })
        .await?;

    Ok(())
}
