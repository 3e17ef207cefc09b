use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

use super::filter::{Channel, Subscription};
use super::messages::ServerMessage;

/// Bounded outbox capacity. Chosen
/// generously enough that a brief client stall doesn't trip it under normal
/// ingest rates.
pub const OUTBOX_CAPACITY: usize = 256;

/// Max concurrent sockets per `(tenant_id, key_id)`.
pub const MAX_SOCKETS_PER_KEY: usize = 5;

pub struct Connection {
    pub connection_id: Uuid,
    pub key_id: String,
    pub outbox: mpsc::Sender<ServerMessage>,
    pub subscription: Arc<RwLock<Subscription>>,
    pub missed_pings: Arc<std::sync::atomic::AtomicU32>,
}

/// Per-tenant registry of connections with their filter predicates.
/// Dispatch across connections is concurrent; each connection's outbox is
/// FIFO.
#[derive(Default)]
pub struct Registry {
    tenants: DashMap<String, DashMap<Uuid, Connection>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new connection, enforcing the per-key socket cap. Returns
    /// `None` if the key is already at capacity (caller closes with 4002).
    pub fn register(
        &self,
        tenant_id: &str,
        key_id: &str,
    ) -> Option<(Uuid, mpsc::Receiver<ServerMessage>, Arc<RwLock<Subscription>>)> {
        let tenant_conns = self.tenants.entry(tenant_id.to_string()).or_default();
        let active_for_key = tenant_conns.iter().filter(|c| c.key_id == key_id).count();
        if active_for_key >= MAX_SOCKETS_PER_KEY {
            return None;
        }

        let connection_id = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(OUTBOX_CAPACITY);
        let subscription = Arc::new(RwLock::new(Subscription::default()));
        tenant_conns.insert(
            connection_id,
            Connection {
                connection_id,
                key_id: key_id.to_string(),
                outbox: tx,
                subscription: subscription.clone(),
                missed_pings: Arc::new(std::sync::atomic::AtomicU32::new(0)),
            },
        );
        Some((connection_id, rx, subscription))
    }

    pub fn remove(&self, tenant_id: &str, connection_id: Uuid) {
        if let Some(conns) = self.tenants.get(tenant_id) {
            conns.remove(&connection_id);
        }
    }

    /// Sends `message` to every connection in `tenant_id` whose subscription
    /// wants `channel` and whose filter matches. A full outbox drops the
    /// connection rather than blocking the broadcaster — ingest must never
    /// block on broadcast.
    pub async fn broadcast(&self, tenant_id: &str, channel: Channel, message: ServerMessage) {
        let Some(conns) = self.tenants.get(tenant_id) else {
            return;
        };
        let mut to_drop = Vec::new();
        for entry in conns.iter() {
            let conn = entry.value();
            let subscription = conn.subscription.read().await;
            if !subscription.wants(channel) {
                continue;
            }
            let message_matches = match (&message, channel) {
                (ServerMessage::EventNew { event }, Channel::Events) => {
                    subscription.filter.matches(event)
                }
                _ => true,
            };
            drop(subscription);
            if !message_matches {
                continue;
            }
            if conn.outbox.try_send(message.clone()).is_err() {
                to_drop.push(conn.connection_id);
            }
        }
        drop(conns);
        for id in to_drop {
            self.remove(tenant_id, id);
        }
    }

    pub fn connection_count(&self, tenant_id: &str) -> usize {
        self.tenants.get(tenant_id).map(|c| c.len()).unwrap_or(0)
    }

    /// All (tenant_id, connection_id) pairs, for the keep-alive sweep.
    pub fn all_connections(&self) -> Vec<(String, Uuid, Arc<std::sync::atomic::AtomicU32>, mpsc::Sender<ServerMessage>)> {
        let mut out = Vec::new();
        for tenant_entry in self.tenants.iter() {
            for conn_entry in tenant_entry.value().iter() {
                out.push((
                    tenant_entry.key().clone(),
                    *conn_entry.key(),
                    conn_entry.value().missed_pings.clone(),
                    conn_entry.value().outbox.clone(),
                ));
            }
        }
        out
    }
}
