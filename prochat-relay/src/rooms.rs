//! Room membership table.
//!
//! A room is a named set of connections: a chat conversation or a meeting.
//! Rooms are created on first join and removed as soon as their last member
//! leaves, so the table only ever holds non-empty rooms. Membership is per
//! connection, never per user: a second tab of the same user joins on its
//! own.
//!
//! The table itself is not synchronised; it lives inside the
//! [`ConnectionRegistry`](crate::registry::ConnectionRegistry) lock so that a
//! disconnect purges rooms and identities in one step.

use std::collections::{HashMap, HashSet};

use prochat_proto::ids::ConnectionId;

/// Room id to member connections.
#[derive(Debug, Default)]
pub struct RoomTable {
    rooms: HashMap<String, HashSet<ConnectionId>>,
}

impl RoomTable {
    /// Creates a new, empty room table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a connection to a room, creating the room if needed.
    ///
    /// Returns `true` if the connection was not already a member.
    pub fn join(&mut self, conn: ConnectionId, room_id: &str) -> bool {
        self.rooms
            .entry(room_id.to_string())
            .or_default()
            .insert(conn)
    }

    /// Removes a connection from a room, dropping the room once empty.
    ///
    /// Returns `true` if the connection was a member. Unknown rooms are a
    /// no-op.
    pub fn leave(&mut self, conn: ConnectionId, room_id: &str) -> bool {
        let Some(members) = self.rooms.get_mut(room_id) else {
            return false;
        };
        let removed = members.remove(&conn);
        if members.is_empty() {
            self.rooms.remove(room_id);
        }
        removed
    }

    /// Removes a connection from each of the given rooms.
    pub fn purge<'a>(
        &mut self,
        conn: ConnectionId,
        room_ids: impl IntoIterator<Item = &'a String>,
    ) {
        for room_id in room_ids {
            self.leave(conn, room_id);
        }
    }

    /// Returns the members of a room (empty for unknown rooms).
    #[must_use]
    pub fn members_of(&self, room_id: &str) -> HashSet<ConnectionId> {
        self.rooms.get(room_id).cloned().unwrap_or_default()
    }

    /// Returns whether a connection is a member of a room.
    #[must_use]
    pub fn contains(&self, room_id: &str, conn: ConnectionId) -> bool {
        self.rooms
            .get(room_id)
            .is_some_and(|members| members.contains(&conn))
    }

    /// Number of non-empty rooms.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    /// Returns `true` if no room has any member.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }
}
