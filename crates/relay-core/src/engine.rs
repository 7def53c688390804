//! The relay engine.
//!
//! `RelayEngine` is the composition root owning the connection registry and
//! the room membership table. The embedding server constructs one engine
//! and drives it from its transport tasks: `connect` on a successful
//! handshake, `handle_event` for every inbound client event, `disconnect`
//! when the transport closes. The engine is injectable so tests can drive
//! it with plain channels instead of sockets.
//!
//! A connection is live exactly while its registry entry exists: a
//! rejected handshake never creates one, disconnect removal is terminal,
//! and events arriving outside that window are silent no-ops.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, instrument};

use crate::events::{ClientEvent, ServerEvent};
use crate::presence::PresenceNotifier;
use crate::registry::{
    ConnectionRegistry, ConnectionSnapshot, OUTBOUND_CHANNEL_CAPACITY,
};
use crate::rooms::RoomTable;
use crate::routing::MessageRouter;
use crate::types::{now_millis, ConnectionId, Identity};

/// Point-in-time projection of the registry and room table.
///
/// Serves the read-only administrative stats endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct RegistrySnapshot {
    #[serde(rename = "totalConnections")]
    pub total_connections: usize,
    pub connections: Vec<ConnectionSnapshot>,
}

pub struct RelayEngine {
    registry: Arc<ConnectionRegistry>,
    rooms: Arc<RoomTable>,
    router: MessageRouter,
    presence: PresenceNotifier,
}

impl RelayEngine {
    pub fn new() -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        let rooms = Arc::new(RoomTable::new());
        let router = MessageRouter::new(Arc::clone(&registry), Arc::clone(&rooms));
        let presence = PresenceNotifier::new(Arc::clone(&registry), Arc::clone(&rooms));
        Self {
            registry,
            rooms,
            router,
            presence,
        }
    }

    /// Register a freshly-handshaken connection.
    ///
    /// Identity verification has already happened by this point; a rejected
    /// handshake never reaches the engine and creates no state. Returns the
    /// assigned id and the receiving end of the connection's outbound
    /// channel, which the transport task pumps to the client.
    pub fn connect(
        &self,
        identity: Option<Identity>,
    ) -> (ConnectionId, mpsc::Receiver<ServerEvent>) {
        let (tx, rx) = mpsc::channel(OUTBOUND_CHANNEL_CAPACITY);
        let id = self.registry.register(tx, identity);
        self.presence
            .connected(&id, self.registry.identity_of(&id).as_ref());
        (id, rx)
    }

    /// Tear down a connection: unregister, purge every room membership, and
    /// broadcast `userDisconnected` to all remaining connections.
    ///
    /// Idempotent; the transport-close path and explicit cleanup may race.
    #[instrument(skip(self), fields(id = %id, reason = reason))]
    pub async fn disconnect(&self, id: &ConnectionId, reason: &str) {
        let Some(entry) = self.registry.unregister(id) else {
            debug!("Disconnect of already-removed connection, ignoring");
            return;
        };
        // Membership cleanup is synchronous with unregistration; no zombie
        // memberships survive the cascade.
        self.rooms.purge(id).await;
        self.presence
            .disconnected(id, entry.identity.as_ref(), reason);
    }

    /// Dispatch one inbound client event.
    ///
    /// Direct replies (acks, pong, socketInfo) go back through the
    /// connection's own outbound channel. Events from a connection that is
    /// no longer registered are silently dropped: races with disconnect are
    /// expected, not errors.
    pub async fn handle_event(&self, id: &ConnectionId, event: ClientEvent) {
        if !self.registry.is_connected(id) {
            debug!(id = %id, "Event from closed connection, ignoring");
            return;
        }

        match event {
            ClientEvent::JoinRoom { room } => {
                debug!(id = %id, room = %room, "joinRoom");
                self.rooms.join(id, &room).await;
                // Every join attempt is observable, re-joins included.
                self.presence.joined(id, &room).await;
                self.registry.send_to(id, ServerEvent::Ack { ok: true });
            }
            ClientEvent::LeaveRoom { room } => {
                debug!(id = %id, room = %room, "leaveRoom");
                self.rooms.leave(id, &room).await;
                self.presence.left(id, &room).await;
                self.registry.send_to(id, ServerEvent::Ack { ok: true });
            }
            ClientEvent::Msg(body) => {
                debug!(
                    id = %id,
                    room = body.room.as_deref().unwrap_or("(global)"),
                    text = %body.text_preview(),
                    "msg"
                );
                let receipt = self.router.route_message(id, body).await;
                self.registry.send_to(id, ServerEvent::Ack { ok: receipt.ok });
            }
            ClientEvent::Announce { text } => {
                debug!(id = %id, "announce");
                let receipt = self.router.announce(id, text).await;
                self.registry.send_to(id, ServerEvent::Ack { ok: receipt.ok });
            }
            ClientEvent::GetInfo => {
                let info = ServerEvent::SocketInfo {
                    id: id.clone(),
                    user_id: self.registry.identity_of(id).map(|i| i.subject),
                    rooms: self.rooms.rooms_of(id).await,
                    connected: true,
                };
                self.registry.send_to(id, info);
            }
            ClientEvent::Ping => {
                debug!(id = %id, "ping");
                self.registry.send_to(
                    id,
                    ServerEvent::Pong {
                        timestamp: now_millis(),
                    },
                );
            }
        }
    }

    /// Tear down every connection whose outbound channel has closed
    /// without an explicit disconnect.
    ///
    /// Each stale connection goes through the full disconnect cascade, so
    /// its room memberships are purged and peers are notified just as on a
    /// normal transport close. Returns the number removed.
    pub async fn cleanup_stale(&self) -> usize {
        let stale = self.registry.stale_ids();
        let count = stale.len();
        for id in stale {
            self.disconnect(&id, "transport vanished").await;
        }
        count
    }

    /// Point-in-time projection for the stats endpoint.
    pub async fn snapshot(&self) -> RegistrySnapshot {
        let entries = self.registry.entries();
        // One guard on the room table so every entry's room set reflects
        // the same instant.
        let mut memberships = self.rooms.joined_map().await;
        let connections = entries
            .into_iter()
            .map(|(id, identity)| {
                let rooms = memberships.remove(&id).unwrap_or_default();
                ConnectionSnapshot {
                    id,
                    user_id: identity.map(|i| i.subject),
                    rooms,
                    connected: true,
                }
            })
            .collect::<Vec<_>>();
        RegistrySnapshot {
            total_connections: connections.len(),
            connections,
        }
    }

    /// Number of live connections.
    pub fn connection_count(&self) -> usize {
        self.registry.connection_count()
    }
}

impl Default for RelayEngine {
    fn default() -> Self {
        Self::new()
    }
}
