use std::collections::{HashMap, HashSet};
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::{
    AgentCache, AgentUpsert, AlertHistoryEntry, AlertRule, ApiKey, Event, Invite, Project,
    ProjectAgentLink, Tenant, User,
};
use crate::domain::bucket::{HourlyAgentBucket, HourlyModelBucket};

use super::persist::TableFile;
use super::{AcceptedEvent, AgentFilter, BatchCommitResult, EventFilter, StorageBackend, StorageError, StorageResult};

/// In-memory reference storage backend: one `RwLock<HashMap<..>>` per
/// logical table, each write-through persisted to its own JSON file. Reads
/// don't block reads; writes on the same table serialize.
pub struct InMemoryStorage {
    data_dir: std::path::PathBuf,

    tenants: RwLock<HashMap<String, Tenant>>,
    tenant_slugs: RwLock<HashMap<String, String>>,

    users: RwLock<HashMap<String, User>>,
    user_emails: RwLock<HashMap<String, String>>,

    invites: RwLock<HashMap<String, Invite>>,
    invite_tokens: RwLock<HashMap<String, String>>,

    api_keys: RwLock<HashMap<String, ApiKey>>,
    api_key_hashes: RwLock<HashMap<String, String>>,

    projects: RwLock<HashMap<String, Project>>,
    project_slugs: RwLock<HashMap<(String, String), String>>,

    agents: RwLock<HashMap<(String, String), AgentCache>>,
    project_agents: RwLock<HashSet<ProjectAgentLink>>,

    events: RwLock<HashMap<(String, Uuid), Event>>,

    agent_buckets: RwLock<HashMap<(String, String, DateTime<Utc>), HourlyAgentBucket>>,
    model_buckets: RwLock<HashMap<(String, String, DateTime<Utc>), HourlyModelBucket>>,

    alert_rules: RwLock<HashMap<String, AlertRule>>,
    alert_history: RwLock<Vec<AlertHistoryEntry>>,
}

impl InMemoryStorage {
    pub async fn load(data_dir: &Path) -> Self {
        let tenants_vec: Vec<Tenant> = TableFile::new(data_dir, "tenants").load().await;
        let tenant_slugs = tenants_vec
            .iter()
            .map(|t| (t.slug.clone(), t.tenant_id.clone()))
            .collect();
        let tenants = tenants_vec
            .into_iter()
            .map(|t| (t.tenant_id.clone(), t))
            .collect();

        let users_vec: Vec<User> = TableFile::new(data_dir, "users").load().await;
        let user_emails = users_vec
            .iter()
            .map(|u| (u.email.clone(), u.user_id.clone()))
            .collect();
        let users = users_vec
            .into_iter()
            .map(|u| (u.user_id.clone(), u))
            .collect();

        let invites_vec: Vec<Invite> = TableFile::new(data_dir, "invites").load().await;
        let invite_tokens = invites_vec
            .iter()
            .map(|i| (i.invite_token_hash.clone(), i.invite_id.clone()))
            .collect();
        let invites = invites_vec
            .into_iter()
            .map(|i| (i.invite_id.clone(), i))
            .collect();

        let api_keys_vec: Vec<ApiKey> = TableFile::new(data_dir, "api_keys").load().await;
        let api_key_hashes = api_keys_vec
            .iter()
            .map(|k| (k.key_hash.clone(), k.key_id.clone()))
            .collect();
        let api_keys = api_keys_vec
            .into_iter()
            .map(|k| (k.key_id.clone(), k))
            .collect();

        let projects_vec: Vec<Project> = TableFile::new(data_dir, "projects").load().await;
        let project_slugs = projects_vec
            .iter()
            .map(|p| ((p.tenant_id.clone(), p.slug.clone()), p.project_id.clone()))
            .collect();
        let projects = projects_vec
            .into_iter()
            .map(|p| (p.project_id.clone(), p))
            .collect();

        let agents_vec: Vec<AgentCache> = TableFile::new(data_dir, "agents").load().await;
        let agents = agents_vec
            .into_iter()
            .map(|a| ((a.tenant_id.clone(), a.agent_id.clone()), a))
            .collect();

        let project_agents_vec: Vec<ProjectAgentLink> =
            TableFile::new(data_dir, "project_agents").load().await;
        let project_agents = project_agents_vec.into_iter().collect();

        let events_vec: Vec<Event> = TableFile::new(data_dir, "events").load().await;
        let events = events_vec
            .into_iter()
            .map(|e| ((e.tenant_id.clone(), e.event_id), e))
            .collect();

        let agent_buckets_vec: Vec<HourlyAgentBucket> =
            TableFile::new(data_dir, "agent_buckets").load().await;
        let agent_buckets = agent_buckets_vec
            .into_iter()
            .map(|b| ((b.tenant_id.clone(), b.agent_id.clone(), b.hour), b))
            .collect();

        let model_buckets_vec: Vec<HourlyModelBucket> =
            TableFile::new(data_dir, "model_buckets").load().await;
        let model_buckets = model_buckets_vec
            .into_iter()
            .map(|b| ((b.tenant_id.clone(), b.model.clone(), b.hour), b))
            .collect();

        let alert_rules_vec: Vec<AlertRule> = TableFile::new(data_dir, "alert_rules").load().await;
        let alert_rules = alert_rules_vec
            .into_iter()
            .map(|r| (r.rule_id.clone(), r))
            .collect();

        let alert_history: Vec<AlertHistoryEntry> =
            TableFile::new(data_dir, "alert_history").load().await;

        Self {
            data_dir: data_dir.to_path_buf(),
            tenants: RwLock::new(tenants),
            tenant_slugs: RwLock::new(tenant_slugs),
            users: RwLock::new(users),
            user_emails: RwLock::new(user_emails),
            invites: RwLock::new(invites),
            invite_tokens: RwLock::new(invite_tokens),
            api_keys: RwLock::new(api_keys),
            api_key_hashes: RwLock::new(api_key_hashes),
            projects: RwLock::new(projects),
            project_slugs: RwLock::new(project_slugs),
            agents: RwLock::new(agents),
            project_agents: RwLock::new(project_agents),
            events: RwLock::new(events),
            agent_buckets: RwLock::new(agent_buckets),
            model_buckets: RwLock::new(model_buckets),
            alert_rules: RwLock::new(alert_rules),
            alert_history: RwLock::new(alert_history),
        }
    }

    async fn persist_tenants(&self) {
        let snapshot: Vec<Tenant> = self.tenants.read().await.values().cloned().collect();
        if let Err(e) = TableFile::new(&self.data_dir, "tenants").save(&snapshot).await {
            tracing::error!(error = %e, "failed to persist tenants table");
        }
    }

    async fn persist_users(&self) {
        let snapshot: Vec<User> = self.users.read().await.values().cloned().collect();
        if let Err(e) = TableFile::new(&self.data_dir, "users").save(&snapshot).await {
            tracing::error!(error = %e, "failed to persist users table");
        }
    }

    async fn persist_invites(&self) {
        let snapshot: Vec<Invite> = self.invites.read().await.values().cloned().collect();
        if let Err(e) = TableFile::new(&self.data_dir, "invites").save(&snapshot).await {
            tracing::error!(error = %e, "failed to persist invites table");
        }
    }

    async fn persist_api_keys(&self) {
        let snapshot: Vec<ApiKey> = self.api_keys.read().await.values().cloned().collect();
        if let Err(e) = TableFile::new(&self.data_dir, "api_keys").save(&snapshot).await {
            tracing::error!(error = %e, "failed to persist api_keys table");
        }
    }

    async fn persist_projects(&self) {
        let snapshot: Vec<Project> = self.projects.read().await.values().cloned().collect();
        if let Err(e) = TableFile::new(&self.data_dir, "projects").save(&snapshot).await {
            tracing::error!(error = %e, "failed to persist projects table");
        }
    }

    async fn persist_agents(&self) {
        let snapshot: Vec<AgentCache> = self.agents.read().await.values().cloned().collect();
        if let Err(e) = TableFile::new(&self.data_dir, "agents").save(&snapshot).await {
            tracing::error!(error = %e, "failed to persist agents table");
        }
    }

    async fn persist_project_agents(&self) {
        let snapshot: Vec<ProjectAgentLink> =
            self.project_agents.read().await.iter().cloned().collect();
        if let Err(e) = TableFile::new(&self.data_dir, "project_agents")
            .save(&snapshot)
            .await
        {
            tracing::error!(error = %e, "failed to persist project_agents table");
        }
    }

    async fn persist_events(&self) {
        let snapshot: Vec<Event> = self.events.read().await.values().cloned().collect();
        if let Err(e) = TableFile::new(&self.data_dir, "events").save(&snapshot).await {
            tracing::error!(error = %e, "failed to persist events table");
        }
    }

    async fn persist_buckets(&self) {
        let agent_snapshot: Vec<HourlyAgentBucket> =
            self.agent_buckets.read().await.values().cloned().collect();
        if let Err(e) = TableFile::new(&self.data_dir, "agent_buckets")
            .save(&agent_snapshot)
            .await
        {
            tracing::error!(error = %e, "failed to persist agent_buckets table");
        }
        let model_snapshot: Vec<HourlyModelBucket> =
            self.model_buckets.read().await.values().cloned().collect();
        if let Err(e) = TableFile::new(&self.data_dir, "model_buckets")
            .save(&model_snapshot)
            .await
        {
            tracing::error!(error = %e, "failed to persist model_buckets table");
        }
    }

    async fn persist_alert_rules(&self) {
        let snapshot: Vec<AlertRule> = self.alert_rules.read().await.values().cloned().collect();
        if let Err(e) = TableFile::new(&self.data_dir, "alert_rules")
            .save(&snapshot)
            .await
        {
            tracing::error!(error = %e, "failed to persist alert_rules table");
        }
    }

    async fn persist_alert_history(&self) {
        let snapshot = self.alert_history.read().await.clone();
        if let Err(e) = TableFile::new(&self.data_dir, "alert_history")
            .save(&snapshot)
            .await
        {
            tracing::error!(error = %e, "failed to persist alert_history table");
        }
    }

    /// Applies one accepted event's bucket increments. Shared between
    /// `commit_batch` and `rebuild_aggregates` so both paths produce
    /// byte-identical buckets.
    fn apply_rollup(
        agent_bucket: &mut HourlyAgentBucket,
        model_bucket: &mut Option<&mut HourlyModelBucket>,
        event: &Event,
    ) {
        use crate::domain::event::TypedPayload;
        use crate::domain::EventType;

        match event.event_type {
            EventType::TaskStarted => agent_bucket.tasks_started += 1,
            EventType::TaskCompleted => {
                agent_bucket.tasks_completed += 1;
                agent_bucket.task_duration_sum_ms += event.duration_ms.unwrap_or(0);
            }
            EventType::TaskFailed => {
                agent_bucket.tasks_failed += 1;
                if let Some(et) = &event.error_type {
                    *agent_bucket.errors_by_type.entry(et.clone()).or_insert(0) += 1;
                }
            }
            EventType::ActionStarted => {
                agent_bucket.actions_started += 1;
                if let Some(action_id) = &event.action_id {
                    *agent_bucket
                        .actions_by_name
                        .entry(action_id.clone())
                        .or_insert(0) += 1;
                }
            }
            EventType::ActionCompleted => agent_bucket.actions_completed += 1,
            EventType::ActionFailed => {
                agent_bucket.actions_failed += 1;
                if let Some(et) = &event.error_type {
                    *agent_bucket.errors_by_type.entry(et.clone()).or_insert(0) += 1;
                }
            }
            EventType::RetryStarted => agent_bucket.retries += 1,
            EventType::Escalated => agent_bucket.escalations += 1,
            EventType::ApprovalRequested => agent_bucket.approvals_requested += 1,
            EventType::ApprovalReceived => agent_bucket.approvals_received += 1,
            _ => {}
        }

        match event.payload.typed() {
            TypedPayload::LlmCall(data) => {
                let model = data.model.clone().unwrap_or_else(|| "unknown".to_string());
                agent_bucket.record_llm_call(
                    &model,
                    data.name.as_deref(),
                    data.tokens_in,
                    data.tokens_out,
                    data.cost,
                    data.prompt_preview.as_deref(),
                    event.timestamp,
                );
                if let Some(mb) = model_bucket.as_deref_mut() {
                    mb.record_call(
                        &event.agent_id,
                        data.name.as_deref(),
                        data.tokens_in,
                        data.tokens_out,
                        data.cost,
                        data.duration_ms,
                        data.prompt_preview.as_deref(),
                        event.timestamp,
                    );
                }
            }
            TypedPayload::Issue(data) => {
                match data.action.as_deref() {
                    Some("resolved") => agent_bucket.issues_resolved += 1,
                    _ => agent_bucket.issues_reported += 1,
                }
                let category = data.severity.clone().unwrap_or_else(|| "unknown".to_string());
                *agent_bucket.errors_by_category.entry(category).or_insert(0) += 1;
            }
            _ => {}
        }

        agent_bucket.last_updated = Utc::now();
    }
}

fn cursor_encode(ts: DateTime<Utc>, id: Uuid) -> String {
    use base64::Engine;
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(format!("{}|{}", ts.to_rfc3339(), id))
}

fn cursor_decode(cursor: &str) -> Option<(DateTime<Utc>, Uuid)> {
    use base64::Engine;
    let raw = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(cursor)
        .ok()?;
    let s = String::from_utf8(raw).ok()?;
    let (ts_str, id_str) = s.split_once('|')?;
    let ts = DateTime::parse_from_rfc3339(ts_str).ok()?.with_timezone(&Utc);
    let id = Uuid::parse_str(id_str).ok()?;
    Some((ts, id))
}

#[async_trait]
impl StorageBackend for InMemoryStorage {
    async fn create_tenant(&self, tenant: Tenant) -> StorageResult<()> {
        {
            let mut slugs = self.tenant_slugs.write().await;
            if slugs.contains_key(&tenant.slug) {
                return Err(StorageError::Conflict(format!(
                    "slug '{}' already exists",
                    tenant.slug
                )));
            }
            slugs.insert(tenant.slug.clone(), tenant.tenant_id.clone());
        }
        self.tenants
            .write()
            .await
            .insert(tenant.tenant_id.clone(), tenant);
        self.persist_tenants().await;
        Ok(())
    }

    async fn get_tenant(&self, tenant_id: &str) -> StorageResult<Tenant> {
        self.tenants
            .read()
            .await
            .get(tenant_id)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(format!("tenant '{tenant_id}' not found")))
    }

    async fn slug_exists(&self, slug: &str) -> StorageResult<bool> {
        Ok(self.tenant_slugs.read().await.contains_key(slug))
    }

    async fn create_user(&self, user: User) -> StorageResult<()> {
        {
            let mut emails = self.user_emails.write().await;
            if emails.contains_key(&user.email) {
                return Err(StorageError::Conflict(format!(
                    "email '{}' already registered",
                    user.email
                )));
            }
            emails.insert(user.email.clone(), user.user_id.clone());
        }
        self.users.write().await.insert(user.user_id.clone(), user);
        self.persist_users().await;
        Ok(())
    }

    async fn get_user_by_email(&self, email: &str) -> StorageResult<Option<User>> {
        let user_id = self.user_emails.read().await.get(email).cloned();
        match user_id {
            Some(id) => Ok(self.users.read().await.get(&id).cloned()),
            None => Ok(None),
        }
    }

    async fn get_user(&self, tenant_id: &str, user_id: &str) -> StorageResult<User> {
        self.users
            .read()
            .await
            .get(user_id)
            .filter(|u| u.tenant_id == tenant_id)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(format!("user '{user_id}' not found")))
    }

    async fn email_exists(&self, email: &str) -> StorageResult<bool> {
        Ok(self.user_emails.read().await.contains_key(email))
    }

    async fn create_invite(&self, invite: Invite) -> StorageResult<()> {
        self.invite_tokens
            .write()
            .await
            .insert(invite.invite_token_hash.clone(), invite.invite_id.clone());
        self.invites
            .write()
            .await
            .insert(invite.invite_id.clone(), invite);
        self.persist_invites().await;
        Ok(())
    }

    async fn get_invite_by_token_hash(&self, token_hash: &str) -> StorageResult<Option<Invite>> {
        let invite_id = self.invite_tokens.read().await.get(token_hash).cloned();
        match invite_id {
            Some(id) => Ok(self.invites.read().await.get(&id).cloned()),
            None => Ok(None),
        }
    }

    async fn list_invites(&self, tenant_id: &str) -> StorageResult<Vec<Invite>> {
        Ok(self
            .invites
            .read()
            .await
            .values()
            .filter(|i| i.tenant_id == tenant_id)
            .cloned()
            .collect())
    }

    async fn delete_invite(&self, tenant_id: &str, invite_id: &str) -> StorageResult<()> {
        let mut invites = self.invites.write().await;
        let removed = invites
            .get(invite_id)
            .filter(|i| i.tenant_id == tenant_id)
            .cloned();
        match removed {
            Some(invite) => {
                invites.remove(invite_id);
                drop(invites);
                self.invite_tokens.write().await.remove(&invite.invite_token_hash);
                self.persist_invites().await;
                Ok(())
            }
            None => Err(StorageError::NotFound(format!("invite '{invite_id}' not found"))),
        }
    }

    async fn invite_pending_for_email(&self, email: &str) -> StorageResult<bool> {
        let now = Utc::now();
        Ok(self
            .invites
            .read()
            .await
            .values()
            .any(|i| i.email == email && i.expires_at > now))
    }

    async fn create_api_key(&self, key: ApiKey) -> StorageResult<()> {
        self.api_key_hashes
            .write()
            .await
            .insert(key.key_hash.clone(), key.key_id.clone());
        self.api_keys.write().await.insert(key.key_id.clone(), key);
        self.persist_api_keys().await;
        Ok(())
    }

    async fn authenticate(&self, key_hash: &str) -> StorageResult<Option<ApiKey>> {
        let key_id = self.api_key_hashes.read().await.get(key_hash).cloned();
        match key_id {
            Some(id) => Ok(self
                .api_keys
                .read()
                .await
                .get(&id)
                .filter(|k| k.is_active)
                .cloned()),
            None => Ok(None),
        }
    }

    async fn touch_api_key(&self, key_id: &str) -> StorageResult<()> {
        if let Some(key) = self.api_keys.write().await.get_mut(key_id) {
            key.last_used_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn list_api_keys(&self, tenant_id: &str) -> StorageResult<Vec<ApiKey>> {
        Ok(self
            .api_keys
            .read()
            .await
            .values()
            .filter(|k| k.tenant_id == tenant_id)
            .cloned()
            .collect())
    }

    async fn revoke_api_key(&self, tenant_id: &str, key_id: &str) -> StorageResult<()> {
        let mut keys = self.api_keys.write().await;
        match keys.get_mut(key_id).filter(|k| k.tenant_id == tenant_id) {
            Some(key) => {
                key.is_active = false;
                drop(keys);
                self.persist_api_keys().await;
                Ok(())
            }
            None => Err(StorageError::NotFound(format!("api key '{key_id}' not found"))),
        }
    }

    async fn get_api_key(&self, tenant_id: &str, key_id: &str) -> StorageResult<ApiKey> {
        self.api_keys
            .read()
            .await
            .get(key_id)
            .filter(|k| k.tenant_id == tenant_id)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(format!("api key '{key_id}' not found")))
    }

    async fn create_project(&self, project: Project) -> StorageResult<()> {
        {
            let mut slugs = self.project_slugs.write().await;
            let key = (project.tenant_id.clone(), project.slug.clone());
            if slugs.contains_key(&key) {
                return Err(StorageError::Conflict(format!(
                    "project slug '{}' already exists",
                    project.slug
                )));
            }
            slugs.insert(key, project.project_id.clone());
        }
        self.projects
            .write()
            .await
            .insert(project.project_id.clone(), project);
        self.persist_projects().await;
        Ok(())
    }

    async fn get_project(&self, tenant_id: &str, project_id: &str) -> StorageResult<Project> {
        self.projects
            .read()
            .await
            .get(project_id)
            .filter(|p| p.tenant_id == tenant_id)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(format!("project '{project_id}' not found")))
    }

    async fn get_project_by_slug(&self, tenant_id: &str, slug: &str) -> StorageResult<Option<Project>> {
        let project_id = self
            .project_slugs
            .read()
            .await
            .get(&(tenant_id.to_string(), slug.to_string()))
            .cloned();
        match project_id {
            Some(id) => Ok(self.projects.read().await.get(&id).cloned()),
            None => Ok(None),
        }
    }

    async fn project_exists(&self, tenant_id: &str, project_id: &str) -> StorageResult<bool> {
        Ok(self
            .projects
            .read()
            .await
            .get(project_id)
            .map(|p| p.tenant_id == tenant_id)
            .unwrap_or(false))
    }

    async fn list_projects(&self, tenant_id: &str, include_archived: bool) -> StorageResult<Vec<Project>> {
        Ok(self
            .projects
            .read()
            .await
            .values()
            .filter(|p| p.tenant_id == tenant_id && (include_archived || !p.is_archived))
            .cloned()
            .collect())
    }

    async fn update_project(&self, project: Project) -> StorageResult<()> {
        let mut projects = self.projects.write().await;
        if !projects.contains_key(&project.project_id) {
            return Err(StorageError::NotFound(format!(
                "project '{}' not found",
                project.project_id
            )));
        }
        projects.insert(project.project_id.clone(), project);
        drop(projects);
        self.persist_projects().await;
        Ok(())
    }

    async fn set_project_archived(
        &self,
        tenant_id: &str,
        project_id: &str,
        archived: bool,
    ) -> StorageResult<()> {
        let mut projects = self.projects.write().await;
        match projects
            .get_mut(project_id)
            .filter(|p| p.tenant_id == tenant_id)
        {
            Some(p) => {
                p.is_archived = archived;
                drop(projects);
                self.persist_projects().await;
                Ok(())
            }
            None => Err(StorageError::NotFound(format!("project '{project_id}' not found"))),
        }
    }

    async fn delete_project(
        &self,
        tenant_id: &str,
        project_id: &str,
        reassign_to: &str,
    ) -> StorageResult<()> {
        {
            let mut events = self.events.write().await;
            for event in events.values_mut() {
                if event.tenant_id == tenant_id && event.project_id.as_deref() == Some(project_id) {
                    event.project_id = Some(reassign_to.to_string());
                }
            }
        }
        {
            let mut links = self.project_agents.write().await;
            let moved: Vec<ProjectAgentLink> = links
                .iter()
                .filter(|l| l.tenant_id == tenant_id && l.project_id == project_id)
                .cloned()
                .collect();
            for link in moved {
                links.remove(&link);
                links.insert(ProjectAgentLink {
                    tenant_id: tenant_id.to_string(),
                    project_id: reassign_to.to_string(),
                    agent_id: link.agent_id,
                });
            }
        }
        {
            let mut projects = self.projects.write().await;
            if projects
                .get(project_id)
                .filter(|p| p.tenant_id == tenant_id)
                .is_none()
            {
                return Err(StorageError::NotFound(format!("project '{project_id}' not found")));
            }
            let removed = projects.remove(project_id);
            if let Some(p) = removed {
                self.project_slugs
                    .write()
                    .await
                    .remove(&(tenant_id.to_string(), p.slug));
            }
        }
        self.persist_events().await;
        self.persist_project_agents().await;
        self.persist_projects().await;
        Ok(())
    }

    async fn merge_project(&self, tenant_id: &str, source_slug: &str, target_slug: &str) -> StorageResult<()> {
        let source = self
            .get_project_by_slug(tenant_id, source_slug)
            .await?
            .ok_or_else(|| StorageError::NotFound(format!("project '{source_slug}' not found")))?;
        let target = self
            .get_project_by_slug(tenant_id, target_slug)
            .await?
            .ok_or_else(|| StorageError::NotFound(format!("project '{target_slug}' not found")))?;

        {
            let mut events = self.events.write().await;
            for event in events.values_mut() {
                if event.tenant_id == tenant_id
                    && event.project_id.as_deref() == Some(source.project_id.as_str())
                {
                    event.project_id = Some(target.project_id.clone());
                }
            }
        }
        {
            let mut links = self.project_agents.write().await;
            let moved: Vec<ProjectAgentLink> = links
                .iter()
                .filter(|l| l.tenant_id == tenant_id && l.project_id == source.project_id)
                .cloned()
                .collect();
            for link in moved {
                links.remove(&link);
                links.insert(ProjectAgentLink {
                    tenant_id: tenant_id.to_string(),
                    project_id: target.project_id.clone(),
                    agent_id: link.agent_id,
                });
            }
        }
        self.set_project_archived(tenant_id, &source.project_id, true).await?;
        self.persist_events().await;
        self.persist_project_agents().await;
        Ok(())
    }

    async fn get_agent(&self, tenant_id: &str, agent_id: &str) -> StorageResult<AgentCache> {
        self.agents
            .read()
            .await
            .get(&(tenant_id.to_string(), agent_id.to_string()))
            .cloned()
            .ok_or_else(|| StorageError::NotFound(format!("agent '{agent_id}' not found")))
    }

    async fn list_agents(&self, tenant_id: &str, filter: AgentFilter) -> StorageResult<Vec<AgentCache>> {
        let project_members: Option<HashSet<String>> = if let Some(pid) = &filter.project_id {
            Some(
                self.project_agents
                    .read()
                    .await
                    .iter()
                    .filter(|l| l.tenant_id == tenant_id && &l.project_id == pid)
                    .map(|l| l.agent_id.clone())
                    .collect(),
            )
        } else {
            None
        };
        Ok(self
            .agents
            .read()
            .await
            .values()
            .filter(|a| a.tenant_id == tenant_id)
            .filter(|a| {
                project_members
                    .as_ref()
                    .map(|members| members.contains(&a.agent_id))
                    .unwrap_or(true)
            })
            .filter(|a| {
                filter
                    .environment
                    .as_ref()
                    .map(|e| a.environment.as_deref() == Some(e.as_str()))
                    .unwrap_or(true)
            })
            .filter(|a| {
                filter
                    .group
                    .as_ref()
                    .map(|g| a.group.as_deref() == Some(g.as_str()))
                    .unwrap_or(true)
            })
            .cloned()
            .collect())
    }

    async fn list_project_agents(&self, tenant_id: &str, project_id: &str) -> StorageResult<Vec<String>> {
        Ok(self
            .project_agents
            .read()
            .await
            .iter()
            .filter(|l| l.tenant_id == tenant_id && l.project_id == project_id)
            .map(|l| l.agent_id.clone())
            .collect())
    }

    async fn event_exists(&self, tenant_id: &str, event_id: Uuid) -> StorageResult<bool> {
        Ok(self
            .events
            .read()
            .await
            .contains_key(&(tenant_id.to_string(), event_id)))
    }

    async fn get_event(&self, tenant_id: &str, event_id: Uuid) -> StorageResult<Event> {
        self.events
            .read()
            .await
            .get(&(tenant_id.to_string(), event_id))
            .cloned()
            .ok_or_else(|| StorageError::NotFound(format!("event '{event_id}' not found")))
    }

    async fn get_events(
        &self,
        tenant_id: &str,
        filter: EventFilter,
        cursor: Option<String>,
        limit: usize,
    ) -> StorageResult<(Vec<Event>, Option<String>)> {
        let after = cursor.as_deref().and_then(cursor_decode);
        let events = self.events.read().await;
        let mut matched: Vec<&Event> = events
            .values()
            .filter(|e| e.tenant_id == tenant_id)
            .filter(|e| filter.project_id.as_ref().map(|p| e.project_id.as_deref() == Some(p.as_str())).unwrap_or(true))
            .filter(|e| filter.agent_id.as_ref().map(|a| &e.agent_id == a).unwrap_or(true))
            .filter(|e| filter.task_id.as_ref().map(|t| e.task_id.as_deref() == Some(t.as_str())).unwrap_or(true))
            .filter(|e| filter.event_types.as_ref().map(|ts| ts.contains(&e.event_type)).unwrap_or(true))
            .filter(|e| filter.min_severity.map(|s| e.severity >= s).unwrap_or(true))
            .filter(|e| filter.since.map(|s| e.timestamp >= s).unwrap_or(true))
            .filter(|e| filter.until.map(|u| e.timestamp <= u).unwrap_or(true))
            .filter(|e| match after {
                Some((ts, id)) => (e.timestamp, e.event_id) > (ts, id),
                None => true,
            })
            .collect();
        matched.sort_by_key(|e| (e.timestamp, e.event_id));
        let has_more = matched.len() > limit;
        matched.truncate(limit);
        let next_cursor = if has_more {
            matched.last().map(|e| cursor_encode(e.timestamp, e.event_id))
        } else {
            None
        };
        Ok((matched.into_iter().cloned().collect(), next_cursor))
    }

    async fn get_task_events(&self, tenant_id: &str, task_id: &str) -> StorageResult<Vec<Event>> {
        let events = self.events.read().await;
        let mut matched: Vec<Event> = events
            .values()
            .filter(|e| e.tenant_id == tenant_id && e.task_id.as_deref() == Some(task_id))
            .cloned()
            .collect();
        matched.sort_by_key(|e| e.timestamp);
        Ok(matched)
    }

    async fn list_all_task_ids(&self, tenant_id: &str, filter: EventFilter) -> StorageResult<Vec<String>> {
        let events = self.events.read().await;
        let mut ids: Vec<String> = events
            .values()
            .filter(|e| e.tenant_id == tenant_id && e.task_id.is_some())
            .filter(|e| filter.project_id.as_ref().map(|p| e.project_id.as_deref() == Some(p.as_str())).unwrap_or(true))
            .filter(|e| filter.agent_id.as_ref().map(|a| &e.agent_id == a).unwrap_or(true))
            .filter_map(|e| e.task_id.clone())
            .collect();
        ids.sort();
        ids.dedup();
        Ok(ids)
    }

    async fn commit_batch(
        &self,
        tenant_id: &str,
        accepted: Vec<AcceptedEvent>,
    ) -> StorageResult<BatchCommitResult> {
        // Fixed lock order (events -> agents -> project_agents -> agent
        // buckets -> model buckets) so concurrent batches never deadlock
        //.
        let mut events = self.events.write().await;
        let mut agents = self.agents.write().await;
        let mut project_agents = self.project_agents.write().await;
        let mut agent_buckets = self.agent_buckets.write().await;
        let mut model_buckets = self.model_buckets.write().await;

        let mut inserted = Vec::with_capacity(accepted.len());
        let mut duplicate_ids = Vec::new();
        let mut touched_agent_keys: HashSet<(String, String)> = HashSet::new();

        for item in accepted {
            let AcceptedEvent { event, agent_upsert } = item;
            let key = (tenant_id.to_string(), event.event_id);
            if events.contains_key(&key) {
                duplicate_ids.push(event.event_id);
                continue;
            }

            let agent_key = (tenant_id.to_string(), event.agent_id.clone());
            let cache = agents
                .entry(agent_key.clone())
                .or_insert_with(|| AgentCache::new(tenant_id.to_string(), event.agent_id.clone(), event.timestamp));
            cache.apply(&agent_upsert);
            touched_agent_keys.insert(agent_key);

            if let Some(project_id) = &event.project_id {
                project_agents.insert(ProjectAgentLink {
                    tenant_id: tenant_id.to_string(),
                    project_id: project_id.clone(),
                    agent_id: event.agent_id.clone(),
                });
            }

            let hour = event.bucket_hour();
            let agent_bucket = agent_buckets
                .entry((tenant_id.to_string(), event.agent_id.clone(), hour))
                .or_insert_with(|| {
                    HourlyAgentBucket::new(tenant_id.to_string(), event.agent_id.clone(), hour)
                });

            let model_key = match event.payload.typed() {
                crate::domain::event::TypedPayload::LlmCall(data) => {
                    data.model.clone().map(|m| (tenant_id.to_string(), m, hour))
                }
                _ => None,
            };
            if let Some(mk) = model_key {
                let model_bucket = model_buckets
                    .entry(mk.clone())
                    .or_insert_with(|| HourlyModelBucket::new(mk.0.clone(), mk.1.clone(), mk.2));
                Self::apply_rollup(agent_bucket, &mut Some(model_bucket), &event);
            } else {
                Self::apply_rollup(agent_bucket, &mut None, &event);
            }

            events.insert(key, event.clone());
            inserted.push(event);
        }

        let touched_agents: Vec<AgentCache> = touched_agent_keys
            .into_iter()
            .filter_map(|k| agents.get(&k).cloned())
            .collect();

        drop(events);
        drop(agents);
        drop(project_agents);
        drop(agent_buckets);
        drop(model_buckets);

        self.persist_events().await;
        self.persist_agents().await;
        self.persist_project_agents().await;
        self.persist_buckets().await;

        Ok(BatchCommitResult {
            inserted,
            duplicate_ids,
            touched_agents,
        })
    }

    async fn list_agent_buckets(
        &self,
        tenant_id: &str,
        agent_id: Option<&str>,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> StorageResult<Vec<HourlyAgentBucket>> {
        Ok(self
            .agent_buckets
            .read()
            .await
            .values()
            .filter(|b| b.tenant_id == tenant_id)
            .filter(|b| agent_id.map(|a| b.agent_id == a).unwrap_or(true))
            .filter(|b| b.hour >= since && b.hour <= until)
            .cloned()
            .collect())
    }

    async fn list_model_buckets(
        &self,
        tenant_id: &str,
        model: Option<&str>,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> StorageResult<Vec<HourlyModelBucket>> {
        Ok(self
            .model_buckets
            .read()
            .await
            .values()
            .filter(|b| b.tenant_id == tenant_id)
            .filter(|b| model.map(|m| b.model == m).unwrap_or(true))
            .filter(|b| b.hour >= since && b.hour <= until)
            .cloned()
            .collect())
    }

    async fn rebuild_aggregates(&self, tenant_id: &str) -> StorageResult<()> {
        {
            let mut agent_buckets = self.agent_buckets.write().await;
            agent_buckets.retain(|k, _| k.0 != tenant_id);
            let mut model_buckets = self.model_buckets.write().await;
            model_buckets.retain(|k, _| k.0 != tenant_id);

            let mut events: Vec<Event> = self
                .events
                .read()
                .await
                .values()
                .filter(|e| e.tenant_id == tenant_id)
                .cloned()
                .collect();
            events.sort_by_key(|e| e.timestamp);

            for event in &events {
                let hour = event.bucket_hour();
                let agent_bucket = agent_buckets
                    .entry((tenant_id.to_string(), event.agent_id.clone(), hour))
                    .or_insert_with(|| {
                        HourlyAgentBucket::new(tenant_id.to_string(), event.agent_id.clone(), hour)
                    });
                let model_key = match event.payload.typed() {
                    crate::domain::event::TypedPayload::LlmCall(data) => {
                        data.model.clone().map(|m| (tenant_id.to_string(), m, hour))
                    }
                    _ => None,
                };
                if let Some(mk) = model_key {
                    let model_bucket = model_buckets
                        .entry(mk.clone())
                        .or_insert_with(|| HourlyModelBucket::new(mk.0.clone(), mk.1.clone(), mk.2));
                    Self::apply_rollup(agent_bucket, &mut Some(model_bucket), event);
                } else {
                    Self::apply_rollup(agent_bucket, &mut None, event);
                }
            }
        }
        self.persist_buckets().await;
        Ok(())
    }

    async fn prune_aggregates(&self, tenant_id: &str, older_than: DateTime<Utc>) -> StorageResult<usize> {
        let mut removed = 0;
        {
            let mut agent_buckets = self.agent_buckets.write().await;
            let before = agent_buckets.len();
            agent_buckets.retain(|k, _| k.0 != tenant_id || k.2 >= older_than);
            removed += before - agent_buckets.len();
        }
        {
            let mut model_buckets = self.model_buckets.write().await;
            let before = model_buckets.len();
            model_buckets.retain(|k, _| k.0 != tenant_id || k.2 >= older_than);
            removed += before - model_buckets.len();
        }
        self.persist_buckets().await;
        Ok(removed)
    }

    async fn list_tenants(&self) -> StorageResult<Vec<Tenant>> {
        Ok(self.tenants.read().await.values().cloned().collect())
    }

    async fn prune_events(&self, tenant_id: &str, older_than: DateTime<Utc>) -> StorageResult<usize> {
        let mut events = self.events.write().await;
        let before = events.len();
        events.retain(|k, e| k.0 != tenant_id || e.timestamp >= older_than);
        let removed = before - events.len();
        drop(events);
        if removed > 0 {
            self.persist_events().await;
        }
        Ok(removed)
    }

    async fn compact_heartbeats(&self, tenant_id: &str, older_than: DateTime<Utc>) -> StorageResult<usize> {
        use crate::domain::EventType;
        let mut events = self.events.write().await;

        // Group old heartbeats by (agent_id, hour), keep one per group,
        // preferring one with a non-empty payload.
        let mut keep: HashMap<(String, DateTime<Utc>), Uuid> = HashMap::new();
        let mut candidates: Vec<(Uuid, String, DateTime<Utc>, bool)> = Vec::new();
        for ((tid, eid), e) in events.iter() {
            if tid != tenant_id || e.event_type != EventType::Heartbeat || e.timestamp >= older_than {
                continue;
            }
            let hour_key = e.bucket_hour();
            let has_payload = !e.payload.data.is_null();
            candidates.push((*eid, e.agent_id.clone(), hour_key, has_payload));
        }
        // Prefer entries with a payload; within ties keep the first seen.
        candidates.sort_by_key(|(_, _, _, has_payload)| !*has_payload);
        for (eid, agent_id, hour, _) in &candidates {
            keep.entry((agent_id.clone(), *hour)).or_insert(*eid);
        }
        let keep_ids: HashSet<Uuid> = keep.into_values().collect();
        let before = events.len();
        events.retain(|(tid, eid), e| {
            tid != tenant_id || e.event_type != EventType::Heartbeat || e.timestamp >= older_than || keep_ids.contains(eid)
        });
        let removed = before - events.len();
        drop(events);
        if removed > 0 {
            self.persist_events().await;
        }
        Ok(removed)
    }

    async fn create_alert_rule(&self, rule: AlertRule) -> StorageResult<()> {
        self.alert_rules.write().await.insert(rule.rule_id.clone(), rule);
        self.persist_alert_rules().await;
        Ok(())
    }

    async fn list_alert_rules(&self, tenant_id: &str) -> StorageResult<Vec<AlertRule>> {
        Ok(self
            .alert_rules
            .read()
            .await
            .values()
            .filter(|r| r.tenant_id == tenant_id)
            .cloned()
            .collect())
    }

    async fn list_enabled_alert_rules(&self, tenant_id: &str) -> StorageResult<Vec<AlertRule>> {
        Ok(self
            .alert_rules
            .read()
            .await
            .values()
            .filter(|r| r.tenant_id == tenant_id && r.is_enabled)
            .cloned()
            .collect())
    }

    async fn get_alert_rule(&self, tenant_id: &str, rule_id: &str) -> StorageResult<AlertRule> {
        self.alert_rules
            .read()
            .await
            .get(rule_id)
            .filter(|r| r.tenant_id == tenant_id)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(format!("alert rule '{rule_id}' not found")))
    }

    async fn update_alert_rule(&self, rule: AlertRule) -> StorageResult<()> {
        let mut rules = self.alert_rules.write().await;
        if !rules.contains_key(&rule.rule_id) {
            return Err(StorageError::NotFound(format!("alert rule '{}' not found", rule.rule_id)));
        }
        rules.insert(rule.rule_id.clone(), rule);
        drop(rules);
        self.persist_alert_rules().await;
        Ok(())
    }

    async fn delete_alert_rule(&self, tenant_id: &str, rule_id: &str) -> StorageResult<()> {
        let mut rules = self.alert_rules.write().await;
        if rules.get(rule_id).filter(|r| r.tenant_id == tenant_id).is_none() {
            return Err(StorageError::NotFound(format!("alert rule '{rule_id}' not found")));
        }
        rules.remove(rule_id);
        drop(rules);
        self.persist_alert_rules().await;
        Ok(())
    }

    async fn insert_alert(&self, entry: AlertHistoryEntry) -> StorageResult<()> {
        self.alert_history.write().await.push(entry);
        self.persist_alert_history().await;
        Ok(())
    }

    async fn list_alert_history(
        &self,
        tenant_id: &str,
        rule_id: Option<&str>,
        limit: usize,
    ) -> StorageResult<Vec<AlertHistoryEntry>> {
        let history = self.alert_history.read().await;
        let mut matched: Vec<AlertHistoryEntry> = history
            .iter()
            .filter(|a| a.tenant_id == tenant_id)
            .filter(|a| rule_id.map(|r| a.rule_id == r).unwrap_or(true))
            .cloned()
            .collect();
        matched.sort_by_key(|a| std::cmp::Reverse(a.fired_at));
        matched.truncate(limit);
        Ok(matched)
    }

    async fn get_last_alert_for_rule(
        &self,
        tenant_id: &str,
        rule_id: &str,
    ) -> StorageResult<Option<AlertHistoryEntry>> {
        Ok(self
            .alert_history
            .read()
            .await
            .iter()
            .filter(|a| a.tenant_id == tenant_id && a.rule_id == rule_id)
            .max_by_key(|a| a.fired_at)
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Event, EventType, Payload};
    use tempfile::tempdir;

    fn sample_event(tenant: &str, agent: &str, event_type: EventType, ts: DateTime<Utc>) -> Event {
        Event {
            event_id: Uuid::new_v4(),
            tenant_id: tenant.to_string(),
            agent_id: agent.to_string(),
            task_id: None,
            action_id: None,
            parent_action_id: None,
            parent_event_id: None,
            project_id: None,
            environment: None,
            group: None,
            event_type,
            severity: event_type.default_severity(),
            status: None,
            duration_ms: None,
            error_type: None,
            error_message: None,
            timestamp: ts,
            received_at: ts,
            payload: Payload::default(),
        }
    }

    #[tokio::test]
    async fn dedup_drops_replayed_event() {
        let dir = tempdir().unwrap();
        let storage = InMemoryStorage::load(dir.path()).await;
        let now = Utc::now();
        let event = sample_event("t1", "agent-1", EventType::Heartbeat, now);

        let accepted = vec![AcceptedEvent {
            event: event.clone(),
            agent_upsert: AgentUpsert {
                seen_at: now,
                is_heartbeat: true,
                event_type: EventType::Heartbeat,
                ..Default::default()
            },
        }];
        let first = storage.commit_batch("t1", accepted.clone()).await.unwrap();
        assert_eq!(first.inserted.len(), 1);
        assert_eq!(first.duplicate_ids.len(), 0);

        let second = storage.commit_batch("t1", accepted).await.unwrap();
        assert_eq!(second.inserted.len(), 0);
        assert_eq!(second.duplicate_ids, vec![event.event_id]);
    }

    #[tokio::test]
    async fn agent_upsert_is_idempotent_and_coalesces() {
        let dir = tempdir().unwrap();
        let storage = InMemoryStorage::load(dir.path()).await;
        let t0 = Utc::now();

        let e1 = sample_event("t1", "agent-1", EventType::AgentRegistered, t0);
        storage
            .commit_batch(
                "t1",
                vec![AcceptedEvent {
                    event: e1,
                    agent_upsert: AgentUpsert {
                        agent_type: Some("worker".into()),
                        seen_at: t0,
                        event_type: EventType::AgentRegistered,
                        ..Default::default()
                    },
                }],
            )
            .await
            .unwrap();

        let e2 = sample_event("t1", "agent-1", EventType::Heartbeat, t0 + chrono::Duration::seconds(5));
        storage
            .commit_batch(
                "t1",
                vec![AcceptedEvent {
                    event: e2,
                    agent_upsert: AgentUpsert {
                        agent_type: None,
                        seen_at: t0 + chrono::Duration::seconds(5),
                        is_heartbeat: true,
                        event_type: EventType::Heartbeat,
                        ..Default::default()
                    },
                }],
            )
            .await
            .unwrap();

        let cache = storage.get_agent("t1", "agent-1").await.unwrap();
        // `agent_type` from the first upsert survives a later upsert with a
        // null value for that field (COALESCE semantics).
        assert_eq!(cache.agent_type.as_deref(), Some("worker"));
        assert!(cache.last_heartbeat.is_some());
    }

    #[tokio::test]
    async fn events_paginate_in_chronological_order() {
        let dir = tempdir().unwrap();
        let storage = InMemoryStorage::load(dir.path()).await;
        let base = Utc::now();
        let mut accepted = Vec::new();
        for i in 0..5 {
            let ts = base + chrono::Duration::seconds(i);
            let event = sample_event("t1", "agent-1", EventType::Custom, ts);
            accepted.push(AcceptedEvent {
                event,
                agent_upsert: AgentUpsert {
                    seen_at: ts,
                    event_type: EventType::Custom,
                    ..Default::default()
                },
            });
        }
        storage.commit_batch("t1", accepted).await.unwrap();

        let (first_page, cursor) = storage
            .get_events("t1", EventFilter::default(), None, 2)
            .await
            .unwrap();
        assert_eq!(first_page.len(), 2);
        assert!(cursor.is_some());

        let (second_page, _) = storage
            .get_events("t1", EventFilter::default(), cursor, 10)
            .await
            .unwrap();
        assert_eq!(second_page.len(), 3);
        assert!(first_page[1].timestamp < second_page[0].timestamp);
    }
}
