use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::{AgentCache, DerivedStatus, Event};

use super::filter::{Channel, SubscriptionFilter};

/// Inbound protocol. `{action: "subscribe"|"unsubscribe"|"ping"}`
/// with the matching payload fields.
#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ClientMessage {
    Subscribe {
        channels: Vec<Channel>,
        #[serde(default)]
        filters: SubscriptionFilter,
    },
    Unsubscribe {
        channels: Vec<Channel>,
    },
    Ping,
}

/// Outbound protocol. Tagged on a `type` discriminator.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Subscribed,
    Pong {
        server_time: DateTime<Utc>,
    },
    Ping,
    EventNew {
        event: Event,
    },
    AgentStatusChanged {
        agent_id: String,
        previous_status: DerivedStatus,
        new_status: DerivedStatus,
        timestamp: DateTime<Utc>,
        #[serde(skip_serializing_if = "Option::is_none")]
        current_task_id: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        heartbeat_age_seconds: Option<i64>,
    },
    AgentStuck {
        agent_id: String,
        timestamp: DateTime<Utc>,
        #[serde(skip_serializing_if = "Option::is_none")]
        current_task_id: Option<String>,
    },
    Error {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        details: Option<Value>,
    },
}

impl ServerMessage {
    pub fn status_changed(
        cache: &AgentCache,
        previous: DerivedStatus,
        new: DerivedStatus,
        now: DateTime<Utc>,
    ) -> Self {
        ServerMessage::AgentStatusChanged {
            agent_id: cache.agent_id.clone(),
            previous_status: previous,
            new_status: new,
            timestamp: now,
            current_task_id: cache.last_task_id.clone(),
            heartbeat_age_seconds: crate::domain::agent::heartbeat_age_seconds(cache, now),
        }
    }

    pub fn stuck(cache: &AgentCache, now: DateTime<Utc>) -> Self {
        ServerMessage::AgentStuck {
            agent_id: cache.agent_id.clone(),
            timestamp: now,
            current_task_id: cache.last_task_id.clone(),
        }
    }
}
