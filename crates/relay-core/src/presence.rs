//! Presence notifications.
//!
//! Emits join/leave/connect/disconnect events synchronously with the
//! membership or lifecycle change that triggered them. Join and leave
//! notifications go to the *other* current members of the room (the actor
//! is excluded from its own notification); disconnects are broadcast to
//! every remaining connection, not just shared rooms.

use std::sync::Arc;

use tracing::{info, instrument, warn};

use crate::events::ServerEvent;
use crate::registry::ConnectionRegistry;
use crate::rooms::RoomTable;
use crate::types::{now_millis, ConnectionId, Identity};

pub struct PresenceNotifier {
    registry: Arc<ConnectionRegistry>,
    rooms: Arc<RoomTable>,
}

impl PresenceNotifier {
    pub fn new(registry: Arc<ConnectionRegistry>, rooms: Arc<RoomTable>) -> Self {
        Self { registry, rooms }
    }

    /// Record a successful connection.
    ///
    /// Observed server-side only; peers learn about a connection when it
    /// joins a room or sends a message.
    pub fn connected(&self, id: &ConnectionId, identity: Option<&Identity>) {
        info!(
            id = %id,
            user = identity.map(|i| i.subject.as_str()).unwrap_or("anonymous"),
            "Client connected"
        );
    }

    /// Notify a room's other members that `id` joined.
    ///
    /// Emitted on every join attempt, including re-joins of a room already
    /// joined: each attempt is observable.
    #[instrument(skip(self), fields(id = %id, room = room))]
    pub async fn joined(&self, id: &ConnectionId, room: &str) {
        let event = ServerEvent::UserJoined {
            socket_id: id.clone(),
            user_id: self.registry.identity_of(id).map(|i| i.subject),
            room: room.to_string(),
            timestamp: now_millis(),
        };
        self.notify_room_peers(id, room, event).await;
    }

    /// Notify a room's other members that `id` left.
    #[instrument(skip(self), fields(id = %id, room = room))]
    pub async fn left(&self, id: &ConnectionId, room: &str) {
        let event = ServerEvent::UserLeft {
            socket_id: id.clone(),
            user_id: self.registry.identity_of(id).map(|i| i.subject),
            room: room.to_string(),
            timestamp: now_millis(),
        };
        self.notify_room_peers(id, room, event).await;
    }

    /// Broadcast a disconnect to all remaining connections.
    ///
    /// The identity is passed in because the registry entry is already gone
    /// by the time this runs.
    #[instrument(skip(self, identity), fields(id = %id, reason = reason))]
    pub fn disconnected(&self, id: &ConnectionId, identity: Option<&Identity>, reason: &str) {
        info!(
            user = identity.map(|i| i.subject.as_str()).unwrap_or("anonymous"),
            "Client disconnected"
        );
        let event = ServerEvent::UserDisconnected {
            socket_id: id.clone(),
            user_id: identity.map(|i| i.subject.clone()),
            reason: reason.to_string(),
            timestamp: now_millis(),
        };
        let (_, failed) = self.registry.broadcast(&event);
        if failed > 0 {
            warn!(failed, "Some peers missed the disconnect notification");
        }
    }

    async fn notify_room_peers(&self, actor: &ConnectionId, room: &str, event: ServerEvent) {
        let members = self.rooms.members_of(room).await;
        let peers: Vec<&ConnectionId> = members.iter().filter(|m| *m != actor).collect();
        let (_, failed) = self.registry.send_to_many(peers, &event);
        if failed > 0 {
            warn!(failed, "Some room peers missed a presence event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn fixture() -> (Arc<ConnectionRegistry>, Arc<RoomTable>, PresenceNotifier) {
        let registry = Arc::new(ConnectionRegistry::new());
        let rooms = Arc::new(RoomTable::new());
        let notifier = PresenceNotifier::new(Arc::clone(&registry), Arc::clone(&rooms));
        (registry, rooms, notifier)
    }

    fn connect(
        registry: &ConnectionRegistry,
        subject: Option<&str>,
    ) -> (ConnectionId, mpsc::Receiver<ServerEvent>) {
        let (tx, rx) = mpsc::channel(16);
        let id = registry.register(tx, subject.map(Identity::new));
        (id, rx)
    }

    #[tokio::test]
    async fn test_joined_excludes_the_actor() {
        let (registry, rooms, notifier) = fixture();
        let (a, mut rx_a) = connect(&registry, Some("alice"));
        let (b, mut rx_b) = connect(&registry, None);

        rooms.join(&b, "lobby").await;
        rooms.join(&a, "lobby").await;
        notifier.joined(&a, "lobby").await;

        let event = rx_b.recv().await.unwrap();
        let ServerEvent::UserJoined {
            socket_id,
            user_id,
            room,
            ..
        } = event
        else {
            panic!("expected userJoined");
        };
        assert_eq!(socket_id, a);
        assert_eq!(user_id.as_deref(), Some("alice"));
        assert_eq!(room, "lobby");

        // The actor does not get its own join notification.
        assert!(rx_a.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_left_notifies_remaining_members() {
        let (registry, rooms, notifier) = fixture();
        let (a, _rx_a) = connect(&registry, None);
        let (b, mut rx_b) = connect(&registry, None);

        rooms.join(&a, "lobby").await;
        rooms.join(&b, "lobby").await;
        rooms.leave(&a, "lobby").await;
        notifier.left(&a, "lobby").await;

        let event = rx_b.recv().await.unwrap();
        assert!(matches!(event, ServerEvent::UserLeft { socket_id, .. } if socket_id == a));
    }

    #[tokio::test]
    async fn test_disconnected_broadcasts_to_everyone() {
        let (registry, rooms, notifier) = fixture();
        let (a, _rx_a) = connect(&registry, Some("alice"));
        let (_b, mut rx_b) = connect(&registry, None);
        let (_c, mut rx_c) = connect(&registry, None);

        // c shares no room with a but still hears about the disconnect.
        rooms.join(&a, "lobby").await;

        let identity = registry.identity_of(&a);
        registry.unregister(&a);
        rooms.purge(&a).await;
        notifier.disconnected(&a, identity.as_ref(), "transport closed");

        for rx in [&mut rx_b, &mut rx_c] {
            let event = rx.recv().await.unwrap();
            let ServerEvent::UserDisconnected {
                socket_id,
                user_id,
                reason,
                ..
            } = event
            else {
                panic!("expected userDisconnected");
            };
            assert_eq!(socket_id, a);
            assert_eq!(user_id.as_deref(), Some("alice"));
            assert_eq!(reason, "transport closed");
        }
    }
}
