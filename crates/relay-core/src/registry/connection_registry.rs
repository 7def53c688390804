//! Connection Registry implementation.
//!
//! The authoritative set of currently-open connections, keyed by
//! [`ConnectionId`], used by the router and presence notifier for delivery.

use std::fmt;

use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, instrument, warn};

use crate::events::ServerEvent;
use crate::types::{ConnectionId, Identity};

/// Default capacity of a connection's outbound channel.
pub const OUTBOUND_CHANNEL_CAPACITY: usize = 256;

/// Registry entry for one live connection.
#[derive(Debug)]
pub struct ConnectionEntry {
    /// Channel to the connection's transport pump
    pub sender: mpsc::Sender<ServerEvent>,
    /// Verified identity, if the handshake presented a credential
    pub identity: Option<Identity>,
}

impl ConnectionEntry {
    pub fn new(sender: mpsc::Sender<ServerEvent>, identity: Option<Identity>) -> Self {
        Self { sender, identity }
    }
}

/// Result of attempting to deliver an event to a connection.
///
/// Anything but `Sent` is a contained, per-recipient failure: it is logged
/// by the caller and never aborts delivery to the remaining recipients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendResult {
    /// Event was queued for delivery
    Sent,
    /// The recipient is not currently registered
    NotConnected,
    /// The recipient's outbound channel is full (slow consumer); dropped
    ChannelFull,
    /// The recipient's outbound channel is closed; entry removed
    ChannelClosed,
}

impl SendResult {
    pub fn is_sent(&self) -> bool {
        matches!(self, Self::Sent)
    }
}

/// Read-only projection of one registry entry, for the stats endpoint.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ConnectionSnapshot {
    pub id: ConnectionId,
    #[serde(rename = "userId", skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub rooms: Vec<String>,
    pub connected: bool,
}

/// Registry of currently-open connections.
///
/// Thread-safe; uses DashMap for concurrent access without explicit
/// locking. Exclusively owned by the engine: external components only see
/// the projections it hands out.
pub struct ConnectionRegistry {
    connections: DashMap<ConnectionId, ConnectionEntry>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
        }
    }

    /// Register a connection and assign it a fresh identifier.
    ///
    /// The entry starts with an empty room set (rooms are tracked by the
    /// membership table, not here).
    #[instrument(skip(self, sender, identity))]
    pub fn register(
        &self,
        sender: mpsc::Sender<ServerEvent>,
        identity: Option<Identity>,
    ) -> ConnectionId {
        let id = ConnectionId::generate();
        self.connections
            .insert(id.clone(), ConnectionEntry::new(sender, identity));
        debug!(id = %id, "Registered connection");
        id
    }

    /// Unregister a connection.
    ///
    /// Idempotent: a second call on an already-removed identifier is a
    /// no-op, because disconnect notifications can race with explicit
    /// cleanup. Returns the entry if one was removed.
    #[instrument(skip(self), fields(id = %id))]
    pub fn unregister(&self, id: &ConnectionId) -> Option<ConnectionEntry> {
        let removed = self.connections.remove(id);
        if removed.is_some() {
            debug!("Unregistered connection");
        } else {
            debug!("Connection was not registered");
        }
        removed.map(|(_, entry)| entry)
    }

    /// Check whether a connection is currently registered.
    pub fn is_connected(&self, id: &ConnectionId) -> bool {
        self.connections.contains_key(id)
    }

    /// Verified identity of a connection, if registered and authenticated.
    pub fn identity_of(&self, id: &ConnectionId) -> Option<Identity> {
        self.connections
            .get(id)
            .and_then(|entry| entry.value().identity.clone())
    }

    /// Number of live connections.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Identifiers of all live connections.
    pub fn list_ids(&self) -> Vec<ConnectionId> {
        self.connections.iter().map(|r| r.key().clone()).collect()
    }

    /// Deliver an event to one connection.
    ///
    /// Non-blocking: a full channel drops the event for that recipient
    /// rather than stalling the caller on a slow consumer. A closed channel
    /// removes the stale entry synchronously.
    pub fn send_to(&self, id: &ConnectionId, event: ServerEvent) -> SendResult {
        let sender = match self.connections.get(id) {
            Some(entry) => entry.value().sender.clone(),
            None => {
                debug!(id = %id, "Recipient not connected");
                return SendResult::NotConnected;
            }
        };

        match sender.try_send(event) {
            Ok(()) => SendResult::Sent,
            Err(mpsc::error::TrySendError::Full(event)) => {
                warn!(id = %id, event = event.name(), "Outbound channel full, event dropped");
                SendResult::ChannelFull
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!(id = %id, "Outbound channel closed, removing stale entry");
                self.connections.remove(id);
                SendResult::ChannelClosed
            }
        }
    }

    /// Deliver an event to every registered connection.
    ///
    /// Per-recipient failures are isolated; returns (delivered, failed)
    /// counts.
    pub fn broadcast(&self, event: &ServerEvent) -> (usize, usize) {
        let ids = self.list_ids();
        let mut delivered = 0;
        let mut failed = 0;
        for id in &ids {
            if self.send_to(id, event.clone()).is_sent() {
                delivered += 1;
            } else {
                failed += 1;
            }
        }
        (delivered, failed)
    }

    /// Deliver an event to each of the given recipients.
    pub fn send_to_many<'a, I>(&self, recipients: I, event: &ServerEvent) -> (usize, usize)
    where
        I: IntoIterator<Item = &'a ConnectionId>,
    {
        let mut delivered = 0;
        let mut failed = 0;
        for id in recipients {
            if self.send_to(id, event.clone()).is_sent() {
                delivered += 1;
            } else {
                failed += 1;
            }
        }
        (delivered, failed)
    }

    /// Snapshot every entry as `(id, identity)` pairs.
    ///
    /// Room sets are joined in by the engine, which owns the membership
    /// table.
    pub fn entries(&self) -> Vec<(ConnectionId, Option<Identity>)> {
        self.connections
            .iter()
            .map(|r| (r.key().clone(), r.value().identity.clone()))
            .collect()
    }

    /// Ids of entries whose channels have closed without an unregister.
    ///
    /// Reporting only; removal runs through the engine's disconnect
    /// cascade so room memberships and peers are cleaned up too.
    pub fn stale_ids(&self) -> Vec<ConnectionId> {
        self.connections
            .iter()
            .filter(|entry| entry.value().sender.is_closed())
            .map(|entry| entry.key().clone())
            .collect()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("connection_count", &self.connections.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn register_one(
        registry: &ConnectionRegistry,
        subject: Option<&str>,
    ) -> (ConnectionId, mpsc::Receiver<ServerEvent>) {
        let (tx, rx) = mpsc::channel(16);
        let id = registry.register(tx, subject.map(Identity::new));
        (id, rx)
    }

    #[test]
    fn test_register_assigns_fresh_ids() {
        let registry = ConnectionRegistry::new();
        let (a, _rx_a) = register_one(&registry, Some("alice"));
        let (b, _rx_b) = register_one(&registry, None);

        assert_ne!(a, b);
        assert!(registry.is_connected(&a));
        assert!(registry.is_connected(&b));
        assert_eq!(registry.connection_count(), 2);
        assert_eq!(registry.identity_of(&a), Some(Identity::new("alice")));
        assert_eq!(registry.identity_of(&b), None);
    }

    #[test]
    fn test_unregister_is_idempotent() {
        let registry = ConnectionRegistry::new();
        let (id, _rx) = register_one(&registry, None);

        assert!(registry.unregister(&id).is_some());
        assert!(registry.unregister(&id).is_none());
        assert!(!registry.is_connected(&id));
        assert_eq!(registry.connection_count(), 0);
    }

    #[tokio::test]
    async fn test_send_to_connected() {
        let registry = ConnectionRegistry::new();
        let (id, mut rx) = register_one(&registry, None);

        let result = registry.send_to(&id, ServerEvent::Pong { timestamp: 1 });
        assert_eq!(result, SendResult::Sent);

        let received = rx.recv().await.unwrap();
        assert_eq!(received, ServerEvent::Pong { timestamp: 1 });
    }

    #[test]
    fn test_send_to_unknown_connection() {
        let registry = ConnectionRegistry::new();
        let result = registry.send_to(
            &ConnectionId::from("ghost"),
            ServerEvent::Pong { timestamp: 1 },
        );
        assert_eq!(result, SendResult::NotConnected);
    }

    #[test]
    fn test_send_to_closed_channel_removes_entry() {
        let registry = ConnectionRegistry::new();
        let (id, rx) = register_one(&registry, None);
        drop(rx);

        let result = registry.send_to(&id, ServerEvent::Pong { timestamp: 1 });
        assert_eq!(result, SendResult::ChannelClosed);
        assert!(!registry.is_connected(&id));
    }

    #[test]
    fn test_send_to_full_channel_drops_event() {
        let registry = ConnectionRegistry::new();
        let (tx, _rx) = mpsc::channel(1);
        let id = registry.register(tx, None);

        assert_eq!(
            registry.send_to(&id, ServerEvent::Pong { timestamp: 1 }),
            SendResult::Sent
        );
        // Second send hits the slow consumer and is dropped, not blocked on.
        assert_eq!(
            registry.send_to(&id, ServerEvent::Pong { timestamp: 2 }),
            SendResult::ChannelFull
        );
        // Connection remains registered.
        assert!(registry.is_connected(&id));
    }

    #[tokio::test]
    async fn test_broadcast_isolates_failures() {
        let registry = ConnectionRegistry::new();
        let (a, mut rx_a) = register_one(&registry, None);
        let (_b, rx_b) = register_one(&registry, None);
        drop(rx_b); // b's transport is dead

        let (delivered, failed) = registry.broadcast(&ServerEvent::Pong { timestamp: 3 });
        assert_eq!(delivered, 1);
        assert_eq!(failed, 1);

        assert!(rx_a.recv().await.is_some());
        assert!(registry.is_connected(&a));
        assert_eq!(registry.connection_count(), 1);
    }

    #[test]
    fn test_stale_ids_reports_closed_channels() {
        let registry = ConnectionRegistry::new();
        let (a, rx_a) = register_one(&registry, None);
        let (_b, _rx_b) = register_one(&registry, None);
        drop(rx_a);

        assert_eq!(registry.stale_ids(), vec![a]);
        // Reporting does not remove entries.
        assert_eq!(registry.connection_count(), 2);
    }

    #[test]
    fn test_entries_snapshot() {
        let registry = ConnectionRegistry::new();
        let (a, _rx_a) = register_one(&registry, Some("alice"));
        let (b, _rx_b) = register_one(&registry, None);

        let mut entries = registry.entries();
        entries.sort_by(|x, y| x.0.as_str().cmp(y.0.as_str()));
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().any(|(id, identity)| {
            *id == a && *identity == Some(Identity::new("alice"))
        }));
        assert!(entries.iter().any(|(id, identity)| *id == b && identity.is_none()));
    }
}
