//! Typing indicator broadcast.
//!
//! Stateless: the relay forwards `typing` / `stop typing` to the other
//! members of a room and keeps no timers. Clients debounce locally and send
//! `stop typing` themselves once input goes quiet. A lost indicator only
//! degrades the UI, so delivery is best effort.

use prochat_proto::event::ServerEvent;
use prochat_proto::ids::ConnectionId;

use crate::registry::ConnectionRegistry;

/// Tells every other member of `room_id` that `origin` started typing.
/// Returns the number of connections reached.
pub fn notify_typing(registry: &ConnectionRegistry, room_id: &str, origin: ConnectionId) -> usize {
    broadcast(registry, room_id, origin, ServerEvent::Typing(room_id.to_string()))
}

/// Tells every other member of `room_id` that `origin` stopped typing.
/// Returns the number of connections reached.
pub fn notify_stop_typing(
    registry: &ConnectionRegistry,
    room_id: &str,
    origin: ConnectionId,
) -> usize {
    broadcast(registry, room_id, origin, ServerEvent::StopTyping(room_id.to_string()))
}

fn broadcast(
    registry: &ConnectionRegistry,
    room_id: &str,
    origin: ConnectionId,
    event: ServerEvent,
) -> usize {
    let reached = registry.push_room(room_id, Some(origin), &event);
    tracing::trace!(conn = %origin, room_id = %room_id, reached, "typing indicator");
    reached
}
