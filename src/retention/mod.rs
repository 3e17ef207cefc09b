use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{Duration, Utc};

use crate::config::Config;
use crate::storage::StorageBackend;

/// One retention pass scoped to a single tenant: heartbeat compaction, raw
/// event pruning, and aggregate pruning, all restricted to `tenant_id`. Used
/// both per-tenant from `run_all_tenants`'s daily sweep and directly from the
/// admin-triggered manual run, which must never reach past its own caller's
/// tenant.
pub async fn run_once(storage: &Arc<dyn StorageBackend>, config: &Config, tenant_id: &str) {
    let tenant = match storage.get_tenant(tenant_id).await {
        Ok(t) => t,
        Err(e) => {
            tracing::error!(error = %e, tenant_id, "retention: failed to load tenant");
            return;
        }
    };

    let now = Utc::now();
    let heartbeat_cutoff = now - Duration::hours(config.heartbeat_compaction_hours);
    let aggregate_cutoff = now - Duration::days(config.aggregate_retention_days);

    match storage.compact_heartbeats(tenant_id, heartbeat_cutoff).await {
        Ok(removed) => {
            if removed > 0 {
                tracing::info!(tenant_id, removed, "compacted heartbeats");
            }
        }
        Err(e) => tracing::error!(error = %e, tenant_id, "heartbeat compaction failed"),
    }

    let event_cutoff = now - Duration::days(tenant.retention_tier.retention_days());
    match storage.prune_events(tenant_id, event_cutoff).await {
        Ok(removed) => {
            if removed > 0 {
                tracing::info!(tenant_id, removed, "pruned events past retention window");
            }
        }
        Err(e) => tracing::error!(error = %e, tenant_id, "event retention failed"),
    }

    match storage.prune_aggregates(tenant_id, aggregate_cutoff).await {
        Ok(removed) => {
            if removed > 0 {
                tracing::info!(tenant_id, removed, "pruned hourly aggregates past retention window");
            }
        }
        Err(e) => tracing::error!(error = %e, tenant_id, "aggregate pruning failed"),
    }
}

/// One retention pass across every known tenant. Only reachable from the
/// daily background loop — failures for one tenant don't stop the others.
pub async fn run_all_tenants(storage: &Arc<dyn StorageBackend>, config: &Config) {
    let tenants = match storage.list_tenants().await {
        Ok(t) => t,
        Err(e) => {
            tracing::error!(error = %e, "retention: failed to list tenants");
            return;
        }
    };

    for tenant in tenants {
        run_once(storage, config, &tenant.tenant_id).await;
    }
}

/// Spawned once from `main`: runs `run_all_tenants` daily. A manual trigger
/// (the `POST /v1/admin/retention/run` handler) calls `run_once` directly,
/// scoped to the caller's own tenant, instead of waiting for the next tick.
pub fn spawn_daily(storage: Arc<dyn StorageBackend>, config: Arc<Config>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(StdDuration::from_secs(24 * 60 * 60));
        loop {
            interval.tick().await;
            run_all_tenants(&storage, &config).await;
        }
    });
}
