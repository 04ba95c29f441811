use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use uuid::Uuid;

use crate::metrics;
use crate::models::UserId;

pub mod message_types;
pub mod relay;
pub mod session;

pub use message_types::{Intent, OutboundEvent};
pub use relay::{deliver, Emission, Relay, Session};

/// Unique identifier for a live WebSocket connection
///
/// Each connection gets one when it joins the registry and keeps it until it
/// leaves, so a single device can be removed without touching the user's
/// other sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Subscriber entry with ID and outbound channel
struct Subscriber {
    id: ConnectionId,
    sender: UnboundedSender<String>,
}

#[derive(Default)]
struct RegistryInner {
    // user_id -> every live connection of that user (the user's "room")
    rooms: DashMap<UserId, Vec<Subscriber>>,
    // connection_id -> owning user, for leave/send_to by connection
    connections: DashMap<ConnectionId, UserId>,
}

/// Session registry: live connections grouped into per-user rooms.
///
/// One instance per process, cloned into every worker. All operations are
/// synchronous and never suspend; no lock is held across an `.await`.
#[derive(Default, Clone)]
pub struct SessionRegistry {
    inner: Arc<RegistryInner>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Join `user_id`'s room.
    ///
    /// Returns the connection's id and the receiver that yields every event
    /// serialized for this connection. Dropping the receiver makes the
    /// connection look dead; it is pruned on the next broadcast.
    pub fn join(&self, user_id: UserId) -> (ConnectionId, UnboundedReceiver<String>) {
        let (tx, rx) = unbounded_channel();
        let connection_id = ConnectionId::new();

        self.inner
            .connections
            .insert(connection_id, user_id.clone());

        let room_size = {
            let mut room = self.inner.rooms.entry(user_id.clone()).or_default();
            room.push(Subscriber {
                id: connection_id,
                sender: tx,
            });
            room.len()
        };

        metrics::CONNECTIONS_ACTIVE.inc();
        tracing::debug!(
            user_id = %user_id,
            connection_id = %connection_id,
            room_size,
            "connection joined room"
        );

        (connection_id, rx)
    }

    /// Remove a connection from its room. Idempotent; returns whether the
    /// connection was still registered.
    pub fn leave(&self, connection_id: ConnectionId) -> bool {
        let Some((_, user_id)) = self.inner.connections.remove(&connection_id) else {
            return false;
        };

        if let Some(mut room) = self.inner.rooms.get_mut(&user_id) {
            room.retain(|s| s.id != connection_id);
        }
        // Clean up empty rooms
        self.inner.rooms.remove_if(&user_id, |_, room| room.is_empty());

        metrics::CONNECTIONS_ACTIVE.dec();
        tracing::debug!(
            user_id = %user_id,
            connection_id = %connection_id,
            "connection left room"
        );
        true
    }

    /// Deliver `event` to every connection in `user_id`'s room.
    ///
    /// A no-op when the user has no live connection. Dead senders are
    /// cleaned up. Returns how many connections received the event.
    pub fn broadcast(&self, user_id: &UserId, event: &OutboundEvent) -> usize {
        let Some(payload) = encode(event) else {
            return 0;
        };

        let (delivered, dead) = match self.inner.rooms.get_mut(user_id) {
            Some(mut room) => {
                let mut dead = Vec::new();
                room.retain(|subscriber| {
                    let alive = subscriber.sender.send(payload.clone()).is_ok();
                    if !alive {
                        dead.push(subscriber.id);
                    }
                    alive
                });
                (room.len(), dead)
            }
            None => (0, Vec::new()),
        };

        if !dead.is_empty() {
            for id in &dead {
                if self.inner.connections.remove(id).is_some() {
                    metrics::CONNECTIONS_ACTIVE.dec();
                }
            }
            self.inner.rooms.remove_if(user_id, |_, room| room.is_empty());
            tracing::debug!(
                user_id = %user_id,
                cleaned = dead.len(),
                active = delivered,
                "dead senders cleaned up during broadcast"
            );
        }

        metrics::EVENTS_DELIVERED_TOTAL.inc_by(delivered as u64);
        delivered
    }

    /// Deliver `event` to a single connection. Returns false if the
    /// connection is gone.
    pub fn send_to(&self, connection_id: ConnectionId, event: &OutboundEvent) -> bool {
        let Some(user_id) = self
            .inner
            .connections
            .get(&connection_id)
            .map(|entry| entry.value().clone())
        else {
            return false;
        };
        let Some(payload) = encode(event) else {
            return false;
        };

        let sent = self
            .inner
            .rooms
            .get(&user_id)
            .and_then(|room| {
                room.iter()
                    .find(|s| s.id == connection_id)
                    .map(|s| s.sender.send(payload).is_ok())
            })
            .unwrap_or(false);

        if sent {
            metrics::EVENTS_DELIVERED_TOTAL.inc();
        }
        sent
    }

    /// Number of live connections joined under `user_id`
    pub fn connection_count(&self, user_id: &UserId) -> usize {
        self.inner
            .rooms
            .get(user_id)
            .map(|room| room.len())
            .unwrap_or(0)
    }

    pub fn total_connections(&self) -> usize {
        self.inner.connections.len()
    }

    pub fn is_connected(&self, connection_id: ConnectionId) -> bool {
        self.inner.connections.contains_key(&connection_id)
    }

    /// Drop every room. Each session sees its outbound channel close and
    /// shuts its socket down.
    pub fn shutdown(&self) {
        let closed = self.inner.connections.len();
        self.inner.rooms.clear();
        self.inner.connections.clear();
        metrics::CONNECTIONS_ACTIVE.sub(closed as i64);
        tracing::info!(closed, "session registry shut down");
    }
}

fn encode(event: &OutboundEvent) -> Option<String> {
    match serde_json::to_string(event) {
        Ok(json) => Some(json),
        Err(e) => {
            tracing::warn!(error = %e, "failed to serialize outbound event");
            None
        }
    }
}
