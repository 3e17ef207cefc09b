use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyType {
    Live,
    Test,
    Read,
}

impl KeyType {
    pub fn as_prefix_tag(self) -> &'static str {
        match self {
            KeyType::Live => "live",
            KeyType::Test => "test",
            KeyType::Read => "read",
        }
    }
}

/// An issued credential. `key_hash` is the SHA-256 of the raw key and is the
/// only thing ever looked up against; the raw key is returned exactly once,
/// at issuance, and never stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKey {
    pub key_id: String,
    pub tenant_id: String,
    #[serde(skip_serializing)]
    pub key_hash: String,
    pub key_prefix: String,
    pub key_type: KeyType,
    pub is_active: bool,
    pub owning_user_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
}
