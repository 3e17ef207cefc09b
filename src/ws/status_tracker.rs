use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::domain::agent::{derive_status, AgentCache, DerivedStatus};

use super::filter::Channel;
use super::messages::ServerMessage;
use super::registry::Registry;

/// Tracks the last-observed derived status per `(tenant_id, agent_id)` so a
/// transition is broadcast exactly once per derived-status change, and
/// exactly once per stuck episode. Deliberately not persisted — a restart
/// re-observes the current status on the next check with no previous
/// state, so at most one spurious `status_changed` is possible right after
/// a restart.
#[derive(Default)]
pub struct StatusTracker {
    last_known: DashMap<(String, String), DerivedStatus>,
}

impl StatusTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Re-derives `cache`'s status against `now` and broadcasts a transition
    /// if one occurred. Called after ingest for touched agents, and from the
    /// periodic sweep for agents whose status can change purely from elapsed
    /// time (going stuck with no new event).
    pub async fn check_and_emit(&self, registry: &Arc<Registry>, cache: &AgentCache, now: DateTime<Utc>) {
        let new_status = derive_status(cache, now);
        let key = (cache.tenant_id.clone(), cache.agent_id.clone());
        let previous = self.last_known.insert(key, new_status);

        let Some(previous) = previous else {
            // First observation: nothing to compare against, so no
            // transition message, but a freshly-observed stuck agent still
            // counts as entering its stuck episode.
            if new_status == DerivedStatus::Stuck {
                registry
                    .broadcast(
                        &cache.tenant_id,
                        Channel::Agents,
                        ServerMessage::stuck(cache, now),
                    )
                    .await;
            }
            return;
        };

        if previous == new_status {
            return;
        }

        registry
            .broadcast(
                &cache.tenant_id,
                Channel::Agents,
                ServerMessage::status_changed(cache, previous, new_status, now),
            )
            .await;

        if new_status == DerivedStatus::Stuck && previous != DerivedStatus::Stuck {
            registry
                .broadcast(
                    &cache.tenant_id,
                    Channel::Agents,
                    ServerMessage::stuck(cache, now),
                )
                .await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn cache_at(last_heartbeat: Option<DateTime<Utc>>, now: DateTime<Utc>) -> AgentCache {
        let mut c = AgentCache::new("t1".into(), "a1".into(), now);
        c.last_heartbeat = last_heartbeat;
        c.stuck_threshold_seconds = 60;
        c
    }

    #[tokio::test]
    async fn first_observation_of_stuck_agent_emits_stuck_only() {
        let registry = Arc::new(Registry::new());
        let tracker = StatusTracker::new();
        let now = Utc::now();
        let cache = cache_at(None, now);
        tracker.check_and_emit(&registry, &cache, now).await;
        assert_eq!(
            tracker.last_known.get(&("t1".to_string(), "a1".to_string())).map(|v| *v),
            Some(DerivedStatus::Stuck)
        );
    }

    #[tokio::test]
    async fn repeated_same_status_does_not_reinsert_transition() {
        let registry = Arc::new(Registry::new());
        let tracker = StatusTracker::new();
        let now = Utc::now();
        let cache = cache_at(Some(now), now);
        tracker.check_and_emit(&registry, &cache, now).await;
        let later = now + Duration::seconds(10);
        tracker.check_and_emit(&registry, &cache, later).await;
        assert_eq!(
            tracker.last_known.get(&("t1".to_string(), "a1".to_string())).map(|v| *v),
            Some(DerivedStatus::Idle)
        );
    }
}
