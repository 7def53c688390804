//! Room membership table.
//!
//! Rooms exist iff they have members: a room is created implicitly on first
//! join and its entry dropped when the last member leaves. `members_of` on
//! an unknown room returns an empty set rather than erroring.

use std::collections::{HashMap, HashSet};

use tokio::sync::RwLock;
use tracing::debug;

use crate::types::ConnectionId;

/// Both directions of the membership mapping.
///
/// Kept behind one lock so the room's member set and the connection's room
/// set are always updated as a single unit.
#[derive(Debug, Default)]
struct RoomState {
    /// room name -> member set
    rooms: HashMap<String, HashSet<ConnectionId>>,
    /// connection -> rooms joined
    joined: HashMap<ConnectionId, HashSet<String>>,
}

/// Table of room memberships for live connections.
///
/// Mutations serialize on a single `RwLock`; at the expected scale this is
/// the simplest discipline that keeps the two maps consistent under
/// concurrent joins, leaves and disconnect purges.
#[derive(Debug, Default)]
pub struct RoomTable {
    state: RwLock<RoomState>,
}

impl RoomTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Join a connection to a room.
    ///
    /// Idempotent: joining a room already joined is a success that changes
    /// nothing. Returns `true` when the membership was newly added.
    pub async fn join(&self, id: &ConnectionId, room: &str) -> bool {
        let mut state = self.state.write().await;
        let added = state
            .rooms
            .entry(room.to_string())
            .or_default()
            .insert(id.clone());
        state
            .joined
            .entry(id.clone())
            .or_default()
            .insert(room.to_string());
        if added {
            debug!(id = %id, room = room, "Joined room");
        }
        added
    }

    /// Remove a connection from a room.
    ///
    /// Leaving a room not joined is a no-op success. Returns `true` when a
    /// membership was actually removed. An emptied room entry is dropped.
    pub async fn leave(&self, id: &ConnectionId, room: &str) -> bool {
        let mut state = self.state.write().await;
        let removed = match state.rooms.get_mut(room) {
            Some(members) => {
                let removed = members.remove(id);
                if members.is_empty() {
                    state.rooms.remove(room);
                }
                removed
            }
            None => false,
        };
        if let Some(rooms) = state.joined.get_mut(id) {
            rooms.remove(room);
            if rooms.is_empty() {
                state.joined.remove(id);
            }
        }
        if removed {
            debug!(id = %id, room = room, "Left room");
        }
        removed
    }

    /// Members of a room. Empty for a room that does not exist.
    pub async fn members_of(&self, room: &str) -> HashSet<ConnectionId> {
        self.state
            .read()
            .await
            .rooms
            .get(room)
            .cloned()
            .unwrap_or_default()
    }

    /// Rooms a connection has joined, sorted for stable output.
    pub async fn rooms_of(&self, id: &ConnectionId) -> Vec<String> {
        let state = self.state.read().await;
        let mut rooms: Vec<String> = state
            .joined
            .get(id)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();
        rooms.sort();
        rooms
    }

    /// All memberships as `connection -> sorted rooms`.
    ///
    /// Read under a single guard so the whole projection reflects one
    /// instant, for use in registry snapshots.
    pub async fn joined_map(&self) -> HashMap<ConnectionId, Vec<String>> {
        let state = self.state.read().await;
        state
            .joined
            .iter()
            .map(|(id, set)| {
                let mut rooms: Vec<String> = set.iter().cloned().collect();
                rooms.sort();
                (id.clone(), rooms)
            })
            .collect()
    }

    /// Remove a connection from every room it joined.
    ///
    /// The disconnect cascade: runs synchronously with unregistration so no
    /// stale membership survives. Returns the rooms the connection was in.
    pub async fn purge(&self, id: &ConnectionId) -> Vec<String> {
        let mut state = self.state.write().await;
        let rooms: Vec<String> = state
            .joined
            .remove(id)
            .map(|set| set.into_iter().collect())
            .unwrap_or_default();
        for room in &rooms {
            if let Some(members) = state.rooms.get_mut(room) {
                members.remove(id);
                if members.is_empty() {
                    state.rooms.remove(room);
                }
            }
        }
        if !rooms.is_empty() {
            debug!(id = %id, count = rooms.len(), "Purged room memberships");
        }
        rooms
    }

    /// Number of rooms that currently have members.
    pub async fn room_count(&self) -> usize {
        self.state.read().await.rooms.len()
    }
}
