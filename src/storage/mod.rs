pub mod error;
pub mod memory;
pub mod persist;

pub use error::{StorageError, StorageResult};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{
    AgentCache, AgentUpsert, AlertHistoryEntry, AlertRule, ApiKey, Event, EventType, HourlyAgentBucket,
    HourlyModelBucket, Invite, Project, ProjectAgentLink, Severity, Tenant, User,
};

#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub project_id: Option<String>,
    pub agent_id: Option<String>,
    pub task_id: Option<String>,
    pub event_types: Option<Vec<EventType>>,
    pub min_severity: Option<Severity>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default)]
pub struct AgentFilter {
    pub project_id: Option<String>,
    pub environment: Option<String>,
    pub group: Option<String>,
}

/// Result of committing the accepted events as one unit: inserted events,
/// the surviving duplicate ids, and a post-commit snapshot of every agent
/// the batch touched, which the caller uses to detect derived-status
/// transitions for fan-out.
#[derive(Debug, Clone)]
pub struct BatchCommitResult {
    pub inserted: Vec<Event>,
    pub duplicate_ids: Vec<Uuid>,
    pub touched_agents: Vec<AgentCache>,
}

/// One accepted event plus the agent-cache/junction/bucket deltas that
/// insertion implies — everything `commit_batch` needs to apply atomically.
#[derive(Debug, Clone)]
pub struct AcceptedEvent {
    pub event: Event,
    pub agent_upsert: AgentUpsert,
}

/// Abstract contract. Every method is single-purpose and async;
/// `InMemoryStorage` is the reference implementation, but a SQL-backed one
/// can implement the same trait and share every call site unchanged.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    // -- Tenant / user / invite / key ------------------------------------
    async fn create_tenant(&self, tenant: Tenant) -> StorageResult<()>;
    async fn get_tenant(&self, tenant_id: &str) -> StorageResult<Tenant>;
    async fn slug_exists(&self, slug: &str) -> StorageResult<bool>;

    async fn create_user(&self, user: User) -> StorageResult<()>;
    async fn get_user_by_email(&self, email: &str) -> StorageResult<Option<User>>;
    async fn get_user(&self, tenant_id: &str, user_id: &str) -> StorageResult<User>;
    async fn email_exists(&self, email: &str) -> StorageResult<bool>;

    async fn create_invite(&self, invite: Invite) -> StorageResult<()>;
    async fn get_invite_by_token_hash(&self, token_hash: &str) -> StorageResult<Option<Invite>>;
    async fn list_invites(&self, tenant_id: &str) -> StorageResult<Vec<Invite>>;
    async fn delete_invite(&self, tenant_id: &str, invite_id: &str) -> StorageResult<()>;
    async fn invite_pending_for_email(&self, email: &str) -> StorageResult<bool>;

    async fn create_api_key(&self, key: ApiKey) -> StorageResult<()>;
    async fn authenticate(&self, key_hash: &str) -> StorageResult<Option<ApiKey>>;
    async fn touch_api_key(&self, key_id: &str) -> StorageResult<()>;
    async fn list_api_keys(&self, tenant_id: &str) -> StorageResult<Vec<ApiKey>>;
    async fn revoke_api_key(&self, tenant_id: &str, key_id: &str) -> StorageResult<()>;
    async fn get_api_key(&self, tenant_id: &str, key_id: &str) -> StorageResult<ApiKey>;

    // -- Project ----------------------------------------------------------
    async fn create_project(&self, project: Project) -> StorageResult<()>;
    async fn get_project(&self, tenant_id: &str, project_id: &str) -> StorageResult<Project>;
    async fn get_project_by_slug(&self, tenant_id: &str, slug: &str) -> StorageResult<Option<Project>>;
    async fn project_exists(&self, tenant_id: &str, project_id: &str) -> StorageResult<bool>;
    async fn list_projects(&self, tenant_id: &str, include_archived: bool) -> StorageResult<Vec<Project>>;
    async fn update_project(&self, project: Project) -> StorageResult<()>;
    async fn set_project_archived(
        &self,
        tenant_id: &str,
        project_id: &str,
        archived: bool,
    ) -> StorageResult<()>;
    /// Deletes `project_id`, reassigning its events and agent links to
    /// `reassign_to` first. Ordering left to the implementer — this reference
    /// impl reassigns events, then project-agent links, then deletes the
    /// project row, all under one write lock.
    async fn delete_project(
        &self,
        tenant_id: &str,
        project_id: &str,
        reassign_to: &str,
    ) -> StorageResult<()>;
    /// Moves `source`'s events and agent links onto `target`, then archives
    /// `source`.
    async fn merge_project(&self, tenant_id: &str, source_slug: &str, target_slug: &str) -> StorageResult<()>;

    // -- Agent --------------------------------------------------------------
    async fn get_agent(&self, tenant_id: &str, agent_id: &str) -> StorageResult<AgentCache>;
    async fn list_agents(&self, tenant_id: &str, filter: AgentFilter) -> StorageResult<Vec<AgentCache>>;
    async fn list_project_agents(&self, tenant_id: &str, project_id: &str) -> StorageResult<Vec<String>>;

    // -- Event / ingest -------------------------------------------------
    async fn event_exists(&self, tenant_id: &str, event_id: Uuid) -> StorageResult<bool>;
    async fn get_event(&self, tenant_id: &str, event_id: Uuid) -> StorageResult<Event>;
    async fn get_events(
        &self,
        tenant_id: &str,
        filter: EventFilter,
        cursor: Option<String>,
        limit: usize,
    ) -> StorageResult<(Vec<Event>, Option<String>)>;
    async fn get_task_events(&self, tenant_id: &str, task_id: &str) -> StorageResult<Vec<Event>>;
    async fn list_all_task_ids(&self, tenant_id: &str, filter: EventFilter) -> StorageResult<Vec<String>>;

    /// Stages 7-10 of ingest, committed as one unit: dedup-insert, agent
    /// cache upsert (COALESCE semantics), project-agent junction upsert,
    /// and hourly bucket increments, all under a fixed table-lock order so a
    /// mid-batch failure can't leave partial state.
    async fn commit_batch(
        &self,
        tenant_id: &str,
        accepted: Vec<AcceptedEvent>,
    ) -> StorageResult<BatchCommitResult>;

    // -- Rollups --------------------------------------------------------
    async fn list_agent_buckets(
        &self,
        tenant_id: &str,
        agent_id: Option<&str>,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> StorageResult<Vec<HourlyAgentBucket>>;
    async fn list_model_buckets(
        &self,
        tenant_id: &str,
        model: Option<&str>,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> StorageResult<Vec<HourlyModelBucket>>;
    /// Admin-triggered only — empties and replays every event
    /// currently in the store through the same update path ingest uses.
    async fn rebuild_aggregates(&self, tenant_id: &str) -> StorageResult<()>;
    async fn prune_aggregates(&self, tenant_id: &str, older_than: DateTime<Utc>) -> StorageResult<usize>;

    // -- Retention --------------------------------------------------------
    async fn list_tenants(&self) -> StorageResult<Vec<Tenant>>;
    async fn prune_events(&self, tenant_id: &str, older_than: DateTime<Utc>) -> StorageResult<usize>;
    async fn compact_heartbeats(&self, tenant_id: &str, older_than: DateTime<Utc>) -> StorageResult<usize>;

    // -- Alerts -----------------------------------------------------------
    async fn create_alert_rule(&self, rule: AlertRule) -> StorageResult<()>;
    async fn list_alert_rules(&self, tenant_id: &str) -> StorageResult<Vec<AlertRule>>;
    async fn list_enabled_alert_rules(&self, tenant_id: &str) -> StorageResult<Vec<AlertRule>>;
    async fn get_alert_rule(&self, tenant_id: &str, rule_id: &str) -> StorageResult<AlertRule>;
    async fn update_alert_rule(&self, rule: AlertRule) -> StorageResult<()>;
    async fn delete_alert_rule(&self, tenant_id: &str, rule_id: &str) -> StorageResult<()>;
    async fn insert_alert(&self, entry: AlertHistoryEntry) -> StorageResult<()>;
    async fn list_alert_history(
        &self,
        tenant_id: &str,
        rule_id: Option<&str>,
        limit: usize,
    ) -> StorageResult<Vec<AlertHistoryEntry>>;
    async fn get_last_alert_for_rule(
        &self,
        tenant_id: &str,
        rule_id: &str,
    ) -> StorageResult<Option<AlertHistoryEntry>>;
}
