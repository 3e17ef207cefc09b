pub mod agent;
pub mod alert;
pub mod apikey;
pub mod bucket;
pub mod event;
pub mod project;
pub mod tenant;

pub use agent::{derive_status, AgentCache, AgentUpsert, DerivedStatus, ProjectAgentLink};
pub use alert::{AlertAction, AlertHistoryEntry, AlertRule, ConditionConfig, CostScope};
pub use apikey::{ApiKey, KeyType};
pub use bucket::{HourlyAgentBucket, HourlyModelBucket};
pub use event::{Envelope, Event, EventType, IngestBatch, Payload, RawEvent, Severity, TypedPayload};
pub use project::Project;
pub use tenant::{Invite, RetentionTier, Role, Tenant, User};
