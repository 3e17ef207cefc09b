use serde::Deserialize;

use crate::domain::{Event, EventType, Severity};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Events,
    Agents,
}

/// `filters` from the client's `subscribe` message. Every field
/// is optional and additive (AND semantics): an event must match every
/// populated predicate to pass.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubscriptionFilter {
    pub project_id: Option<String>,
    pub environment: Option<String>,
    pub group: Option<String>,
    pub agent_id: Option<String>,
    pub event_types: Option<Vec<EventType>>,
    pub min_severity: Option<Severity>,
}

impl SubscriptionFilter {
    pub fn matches(&self, event: &Event) -> bool {
        if let Some(p) = &self.project_id {
            if event.project_id.as_deref() != Some(p.as_str()) {
                return false;
            }
        }
        if let Some(e) = &self.environment {
            if event.environment.as_deref() != Some(e.as_str()) {
                return false;
            }
        }
        if let Some(g) = &self.group {
            if event.group.as_deref() != Some(g.as_str()) {
                return false;
            }
        }
        if let Some(a) = &self.agent_id {
            if &event.agent_id != a {
                return false;
            }
        }
        if let Some(types) = &self.event_types {
            if !types.contains(&event.event_type) {
                return false;
            }
        }
        if let Some(min) = self.min_severity {
            if event.severity < min {
                return false;
            }
        }
        true
    }
}

/// A connection's live subscription state. A new `subscribe` message
/// replaces the prior filter entirely, rather than merging into it.
#[derive(Debug, Clone, Default)]
pub struct Subscription {
    pub channels: std::collections::HashSet<Channel>,
    pub filter: SubscriptionFilter,
}

impl Subscription {
    pub fn wants(&self, channel: Channel) -> bool {
        self.channels.contains(&channel)
    }
}
