//! Connection registry: live connections, their identities, and their rooms.
//!
//! The registry is the only mutable shared state of the relay. One
//! [`RwLock`] guards three structures that must change together:
//!
//! - the connection table (outbox, identity, joined rooms per connection),
//! - the identity index (user id to its live connections),
//! - the [`RoomTable`].
//!
//! Because a disconnect purges all three under a single write lock, a lookup
//! that starts after the purge never sees the departed connection. Pushes
//! clone the relevant outboxes under the lock and send after releasing it,
//! so no network work ever happens while the lock is held.

use std::collections::{HashMap, HashSet};

use parking_lot::RwLock;
use prochat_proto::event::ServerEvent;
use prochat_proto::ids::ConnectionId;
use tokio::sync::mpsc;

use crate::rooms::RoomTable;

/// Default maximum number of rooms a single connection may be in.
pub const DEFAULT_MAX_ROOMS_PER_CONNECTION: usize = 256;

/// Sending half of a connection's outbound event queue.
pub type Outbox = mpsc::UnboundedSender<ServerEvent>;

/// Errors that can occur during registry operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// The connection is not (or no longer) registered.
    #[error("unknown connection {0}")]
    UnknownConnection(ConnectionId),
    /// The connection is already in the maximum number of rooms.
    #[error("connection is already in {limit} rooms")]
    RoomLimitReached {
        /// Configured per-connection room cap.
        limit: usize,
    },
}

/// What a connection left behind when it disconnected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Departed {
    /// The identity the connection had announced, if any.
    pub user: Option<String>,
    /// Rooms the connection was removed from.
    pub rooms: HashSet<String>,
    /// `true` if this was the user's last live connection.
    pub user_offline: bool,
}

#[derive(Debug)]
struct ConnectionEntry {
    outbox: Outbox,
    user: Option<String>,
    rooms: HashSet<String>,
}

#[derive(Debug, Default)]
struct Directory {
    connections: HashMap<ConnectionId, ConnectionEntry>,
    identities: HashMap<String, HashSet<ConnectionId>>,
    rooms: RoomTable,
}

impl Directory {
    /// Drops `conn` from `user`'s identity entry, removing the entry once
    /// empty. Returns `true` if the user has no live connection left.
    fn unlink_identity(&mut self, user: &str, conn: ConnectionId) -> bool {
        let Some(conns) = self.identities.get_mut(user) else {
            return true;
        };
        conns.remove(&conn);
        if conns.is_empty() {
            self.identities.remove(user);
            true
        } else {
            false
        }
    }

    fn outboxes<'a>(&self, conns: impl IntoIterator<Item = &'a ConnectionId>) -> Vec<Outbox> {
        conns
            .into_iter()
            .filter_map(|c| self.connections.get(c))
            .map(|entry| entry.outbox.clone())
            .collect()
    }
}

/// Live mapping between connections, user identities, and rooms.
pub struct ConnectionRegistry {
    directory: RwLock<Directory>,
    max_rooms_per_connection: usize,
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionRegistry {
    /// Creates an empty registry with the default room cap.
    #[must_use]
    pub fn new() -> Self {
        Self::with_room_limit(DEFAULT_MAX_ROOMS_PER_CONNECTION)
    }

    /// Creates an empty registry with a custom per-connection room cap.
    #[must_use]
    pub fn with_room_limit(max_rooms_per_connection: usize) -> Self {
        Self {
            directory: RwLock::new(Directory::default()),
            max_rooms_per_connection,
        }
    }

    /// Records a new connection and returns its id. The connection has no
    /// identity until [`on_setup`](Self::on_setup).
    pub fn on_connect(&self, outbox: Outbox) -> ConnectionId {
        let conn = ConnectionId::new();
        self.directory.write().connections.insert(
            conn,
            ConnectionEntry {
                outbox,
                user: None,
                rooms: HashSet::new(),
            },
        );
        conn
    }

    /// Associates a user identity with a connection.
    ///
    /// A connection has at most one identity: announcing a different one
    /// first removes the old association. Returns the previous identity.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::UnknownConnection`] if the connection has
    /// already disconnected.
    pub fn on_setup(
        &self,
        conn: ConnectionId,
        user_id: &str,
    ) -> Result<Option<String>, RegistryError> {
        let mut dir = self.directory.write();
        let entry = dir
            .connections
            .get_mut(&conn)
            .ok_or(RegistryError::UnknownConnection(conn))?;
        let previous = entry.user.replace(user_id.to_string());

        if let Some(old) = previous.as_deref()
            && old != user_id
        {
            dir.unlink_identity(old, conn);
        }
        dir.identities
            .entry(user_id.to_string())
            .or_default()
            .insert(conn);
        drop(dir);

        Ok(previous)
    }

    /// Returns every live connection of a user (empty if none).
    #[must_use]
    pub fn resolve(&self, user_id: &str) -> HashSet<ConnectionId> {
        self.directory
            .read()
            .identities
            .get(user_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Returns the identity announced by a connection, if any.
    #[must_use]
    pub fn identity_of(&self, conn: ConnectionId) -> Option<String> {
        self.directory
            .read()
            .connections
            .get(&conn)
            .and_then(|entry| entry.user.clone())
    }

    /// Returns whether a connection is currently registered.
    #[must_use]
    pub fn is_live(&self, conn: ConnectionId) -> bool {
        self.directory.read().connections.contains_key(&conn)
    }

    /// Removes a connection from every room and from the identity index.
    ///
    /// Returns what the connection left behind the first time it is called
    /// and `None` on any later call for the same id.
    pub fn on_disconnect(&self, conn: ConnectionId) -> Option<Departed> {
        let mut dir = self.directory.write();
        let entry = dir.connections.remove(&conn)?;
        dir.rooms.purge(conn, &entry.rooms);
        let user_offline = entry
            .user
            .as_deref()
            .is_some_and(|user| dir.unlink_identity(user, conn));
        drop(dir);

        Some(Departed {
            user: entry.user,
            rooms: entry.rooms,
            user_offline,
        })
    }

    /// Adds a connection to a room. Returns `true` if it was not yet a member.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::UnknownConnection`] for a departed connection
    /// or [`RegistryError::RoomLimitReached`] if the connection is already in
    /// the maximum number of rooms.
    pub fn join(&self, conn: ConnectionId, room_id: &str) -> Result<bool, RegistryError> {
        let mut dir = self.directory.write();
        let entry = dir
            .connections
            .get_mut(&conn)
            .ok_or(RegistryError::UnknownConnection(conn))?;
        if entry.rooms.contains(room_id) {
            return Ok(false);
        }
        if entry.rooms.len() >= self.max_rooms_per_connection {
            return Err(RegistryError::RoomLimitReached {
                limit: self.max_rooms_per_connection,
            });
        }
        entry.rooms.insert(room_id.to_string());
        Ok(dir.rooms.join(conn, room_id))
    }

    /// Removes a connection from a room. Unknown rooms or connections are a
    /// no-op and return `false`.
    pub fn leave(&self, conn: ConnectionId, room_id: &str) -> bool {
        let mut dir = self.directory.write();
        if let Some(entry) = dir.connections.get_mut(&conn) {
            entry.rooms.remove(room_id);
        }
        dir.rooms.leave(conn, room_id)
    }

    /// Returns the member connections of a room.
    #[must_use]
    pub fn members_of(&self, room_id: &str) -> HashSet<ConnectionId> {
        self.directory.read().rooms.members_of(room_id)
    }

    /// Pushes an event to one connection. Returns `false` if the connection
    /// is gone or its writer has shut down.
    pub fn push(&self, conn: ConnectionId, event: ServerEvent) -> bool {
        let outbox = self
            .directory
            .read()
            .connections
            .get(&conn)
            .map(|entry| entry.outbox.clone());
        outbox.is_some_and(|outbox| outbox.send(event).is_ok())
    }

    /// Pushes an event to every live connection of a user, skipping
    /// `except`. Returns the number of connections reached.
    pub fn push_user(
        &self,
        user_id: &str,
        except: Option<ConnectionId>,
        event: &ServerEvent,
    ) -> usize {
        let outboxes = {
            let dir = self.directory.read();
            match dir.identities.get(user_id) {
                Some(conns) => dir.outboxes(conns.iter().filter(|c| Some(**c) != except)),
                None => Vec::new(),
            }
        };
        send_all(outboxes, event)
    }

    /// Pushes an event to every member of a room, skipping `except`.
    /// Returns the number of connections reached.
    pub fn push_room(
        &self,
        room_id: &str,
        except: Option<ConnectionId>,
        event: &ServerEvent,
    ) -> usize {
        let outboxes = {
            let dir = self.directory.read();
            let members = dir.rooms.members_of(room_id);
            dir.outboxes(members.iter().filter(|c| Some(**c) != except))
        };
        send_all(outboxes, event)
    }

    /// Number of live connections.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.directory.read().connections.len()
    }

    /// Number of non-empty rooms.
    #[must_use]
    pub fn room_count(&self) -> usize {
        self.directory.read().rooms.len()
    }
}

/// Sends a clone of `event` to each outbox independently; a closed outbox
/// does not stop the others.
fn send_all(outboxes: Vec<Outbox>, event: &ServerEvent) -> usize {
    outboxes
        .into_iter()
        .filter(|outbox| outbox.send(event.clone()).is_ok())
        .count()
}
