use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// `free`/`pro`/`enterprise` raw-event retention windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetentionTier {
    Free,
    Pro,
    Enterprise,
}

impl RetentionTier {
    pub fn retention_days(self) -> i64 {
        match self {
            RetentionTier::Free => 7,
            RetentionTier::Pro => 30,
            RetentionTier::Enterprise => 90,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tenant {
    pub tenant_id: String,
    pub name: String,
    pub slug: String,
    pub retention_tier: RetentionTier,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Viewer,
    Member,
    Admin,
    Owner,
}

impl Role {
    /// True if `self` outranks `other` strictly — used for the admin
    /// "cannot invite owners/admins" escalation check.
    pub fn outranks(self, other: Role) -> bool {
        self > other
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub user_id: String,
    pub tenant_id: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub name: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invite {
    pub invite_id: String,
    pub tenant_id: String,
    pub email: String,
    pub role: Role,
    pub name: Option<String>,
    pub invite_token_hash: String,
    pub invited_by: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}
