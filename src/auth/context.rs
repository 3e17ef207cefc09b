use uuid::Uuid;

use crate::domain::{KeyType, Role};

/// Who is making the request, independent of how they authenticated. An
/// API key never carries a `Role`; a JWT-authenticated user never carries a
/// `KeyType`. Handlers that need role gating match on this.
#[derive(Debug, Clone)]
pub enum Principal {
    ApiKey { key_id: String, key_type: KeyType },
    User { user_id: String, role: Role },
}

impl Principal {
    /// True if this principal is allowed to perform a state-mutating request.
    /// `read` keys reject mutations with 403; JWT users are gated by role at
    /// the handler, not here.
    pub fn can_mutate(&self) -> bool {
        match self {
            Principal::ApiKey { key_type, .. } => !matches!(key_type, KeyType::Read),
            Principal::User { .. } => true,
        }
    }

    pub fn role(&self) -> Option<Role> {
        match self {
            Principal::User { role, .. } => Some(*role),
            Principal::ApiKey { .. } => None,
        }
    }
}

/// `(tenant_id, role, key_type, request_id)` threaded explicitly through every
/// handler and into the storage layer — no thread-local state, so a SQL
/// backend may parallelize across connections.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub tenant_id: String,
    pub request_id: Uuid,
    pub principal: Principal,
}

impl RequestContext {
    pub fn require_role(&self, minimum: Role) -> bool {
        match &self.principal {
            Principal::User { role, .. } => *role >= minimum,
            // API keys act with full tenant authority over the endpoints
            // they're allowed to call at all; role gating only applies to
            // JWT-authenticated dashboard users.
            Principal::ApiKey { .. } => true,
        }
    }
}
