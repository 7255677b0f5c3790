//! Peer signaling inside a meeting room.
//!
//! Once a call is accepted both parties open the meeting and `join meeting`.
//! Existing members hear `user-joined` with the newcomer's connection id, so
//! one side knows to start the peer offer. Offers (`call-user`) and answers
//! (`answer-call`) are then relayed verbatim to the addressed peer; the
//! relay never looks inside the signal.

use prochat_proto::event::{AnswerCall, CallUser, ServerEvent, SignalOffer};
use prochat_proto::ids::ConnectionId;

use crate::registry::{ConnectionRegistry, RegistryError};

/// Joins `conn` to a meeting room and announces it to the members already
/// there. Returns the number of members notified; re-joining a meeting the
/// connection is already in notifies nobody.
///
/// # Errors
///
/// Returns [`RegistryError`] if the connection is gone or at its room cap.
pub fn join_meeting(
    registry: &ConnectionRegistry,
    conn: ConnectionId,
    meeting_id: &str,
) -> Result<usize, RegistryError> {
    if !registry.join(conn, meeting_id)? {
        return Ok(0);
    }
    let notified = registry.push_room(meeting_id, Some(conn), &ServerEvent::UserJoined(conn));
    tracing::info!(conn = %conn, meeting_id = %meeting_id, notified, "joined meeting");
    Ok(notified)
}

/// Relays an offer to its target as `call-user`. The outbound `from` is
/// always the originating connection id, whatever the client claimed.
/// Returns the number of connections reached.
pub fn relay_offer(registry: &ConnectionRegistry, origin: ConnectionId, offer: CallUser) -> usize {
    let from = origin.to_string();
    if let Some(claimed) = offer.from.as_deref()
        && claimed != from
    {
        tracing::debug!(conn = %origin, claimed = %claimed, "overriding claimed offer sender");
    }
    let event = ServerEvent::CallUser(SignalOffer {
        signal: offer.signal_data,
        from,
        name: offer.name,
    });
    let reached = push_to_target(registry, &offer.user_to_call, event);
    tracing::debug!(conn = %origin, target = %offer.user_to_call, reached, "offer relayed");
    reached
}

/// Relays an answer to its target as `call-accepted-signal`. Returns the
/// number of connections reached.
pub fn relay_answer(
    registry: &ConnectionRegistry,
    origin: ConnectionId,
    answer: AnswerCall,
) -> usize {
    let event = ServerEvent::CallAcceptedSignal(answer.signal);
    let reached = push_to_target(registry, &answer.to, event);
    tracing::debug!(conn = %origin, target = %answer.to, reached, "answer relayed");
    reached
}

/// Targets are connection ids (what `user-joined` hands out); anything that
/// is not a live connection id is treated as a user identity.
fn push_to_target(registry: &ConnectionRegistry, target: &str, event: ServerEvent) -> usize {
    if let Ok(conn) = target.parse::<ConnectionId>()
        && registry.push(conn, event.clone())
    {
        return 1;
    }
    registry.push_user(target, None, &event)
}
