use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_PROJECT_SLUG: &str = "default";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub project_id: String,
    pub tenant_id: String,
    pub name: String,
    pub slug: String,
    pub environment: Option<String>,
    pub is_archived: bool,
    pub created_at: DateTime<Utc>,
}

impl Project {
    pub fn is_default(&self) -> bool {
        self.slug == DEFAULT_PROJECT_SLUG
    }
}
