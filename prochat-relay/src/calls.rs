//! Call signaling broker: ringing, accept, and reject between two users.
//!
//! A call attempt moves through
//! `Initiated -> Ringing -> Accepted | Rejected`, or straight to
//! `Unreachable` when the callee has no live connection. The broker keeps
//! the ringing attempts in a table keyed by meeting id; terminal attempts
//! are removed. No timer runs on the relay: a caller that gives up simply
//! closes its dialog, and a late answer is still forwarded.
//!
//! Accept and reject are addressed by the caller's user id, as clients send
//! them. The table is consulted for bookkeeping only; a reply with no
//! matching ringing attempt is forwarded all the same.

use std::collections::HashMap;

use parking_lot::Mutex;
use prochat_proto::event::{
    AcceptCall, CallAccepted, CallError, CallerInfo, DirectCall, IncomingCall, RejectCall,
    ServerEvent,
};
use prochat_proto::ids::ConnectionId;

use crate::registry::ConnectionRegistry;

/// Message sent with `call-error` when the callee is offline.
pub const UNREACHABLE_MESSAGE: &str = "User is offline";

/// State of one call attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    /// Invitation received, callee not yet resolved.
    Initiated,
    /// `incoming-call` delivered to at least one callee connection.
    Ringing,
    /// Callee accepted; the caller was told.
    Accepted,
    /// Callee declined; the caller was told.
    Rejected,
    /// Callee had no live connection; the caller got `call-error`.
    Unreachable,
    /// The calling connection was already gone; nothing was sent.
    Dropped,
}

impl CallState {
    /// Returns `true` for states after which the attempt is discarded.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Accepted | Self::Rejected | Self::Unreachable | Self::Dropped
        )
    }
}

/// One in-flight call attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSession {
    /// Calling user.
    pub caller: String,
    /// Called user.
    pub callee: String,
    /// Meeting the call will continue in.
    pub meeting_id: String,
    /// Current state.
    pub state: CallState,
}

/// Brokers call setup between users who only share the relay.
#[derive(Debug, Default)]
pub struct CallBroker {
    sessions: Mutex<HashMap<String, CallSession>>,
}

impl CallBroker {
    /// Creates a broker with no pending calls.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rings the callee of `call` on every live connection.
    ///
    /// The caller is the identity registered on `origin` when there is one,
    /// otherwise the claimed `fromUser._id`. If the callee has no live
    /// connection, `origin` alone receives `call-error` and the attempt ends
    /// as [`CallState::Unreachable`]. An `origin` that has already
    /// disconnected rings nobody and ends as [`CallState::Dropped`].
    pub fn initiate(
        &self,
        registry: &ConnectionRegistry,
        origin: ConnectionId,
        call: DirectCall,
    ) -> CallState {
        if !registry.is_live(origin) {
            tracing::debug!(
                conn = %origin,
                meeting_id = %call.meeting_id,
                "direct-call from departed connection"
            );
            return CallState::Dropped;
        }

        let caller = match registry.identity_of(origin) {
            Some(registered) => {
                if registered != call.from_user.id {
                    tracing::warn!(
                        conn = %origin,
                        registered = %registered,
                        claimed = %call.from_user.id,
                        "direct-call caller mismatch, using registered identity"
                    );
                }
                registered
            }
            None => call.from_user.id.clone(),
        };

        let mut session = CallSession {
            caller: caller.clone(),
            callee: call.target_user_id.clone(),
            meeting_id: call.meeting_id.clone(),
            state: CallState::Initiated,
        };
        tracing::debug!(
            caller = %caller,
            callee = %session.callee,
            meeting_id = %session.meeting_id,
            state = ?session.state,
            "call initiated"
        );

        // Record before ringing so an immediate accept finds the attempt.
        session.state = CallState::Ringing;
        let displaced = self
            .sessions
            .lock()
            .insert(call.meeting_id.clone(), session);

        let invitation = ServerEvent::IncomingCall(IncomingCall {
            from_user: CallerInfo {
                id: caller.clone(),
                name: call.from_user.name,
            },
            meeting_id: call.meeting_id.clone(),
        });
        let reached = registry.push_user(&call.target_user_id, Some(origin), &invitation);

        if reached == 0 {
            // An unreachable callee leaves any earlier attempt for the meeting in place.
            let mut sessions = self.sessions.lock();
            match displaced {
                Some(earlier) => {
                    sessions.insert(call.meeting_id.clone(), earlier);
                }
                None => {
                    sessions.remove(&call.meeting_id);
                }
            }
            drop(sessions);

            registry.push(
                origin,
                ServerEvent::CallError(CallError {
                    message: UNREACHABLE_MESSAGE.to_string(),
                }),
            );
            tracing::info!(
                caller = %caller,
                callee = %call.target_user_id,
                meeting_id = %call.meeting_id,
                "callee unreachable"
            );
            return CallState::Unreachable;
        }

        tracing::info!(
            caller = %caller,
            callee = %call.target_user_id,
            meeting_id = %call.meeting_id,
            reached,
            "ringing"
        );
        CallState::Ringing
    }

    /// Forwards the callee's acceptance to every connection of the caller.
    pub fn accept(
        &self,
        registry: &ConnectionRegistry,
        origin: ConnectionId,
        reply: AcceptCall,
    ) -> CallState {
        let ended = {
            let mut sessions = self.sessions.lock();
            let ringing = sessions
                .get(&reply.meeting_id)
                .is_some_and(|s| s.caller == reply.to_user_id);
            if ringing {
                sessions.remove(&reply.meeting_id)
            } else {
                None
            }
        };
        if ended.is_none() {
            tracing::debug!(
                conn = %origin,
                caller = %reply.to_user_id,
                meeting_id = %reply.meeting_id,
                "accept without a ringing call, forwarding anyway"
            );
        }

        let accepted = ServerEvent::CallAccepted(CallAccepted {
            meeting_id: reply.meeting_id.clone(),
        });
        let reached = registry.push_user(&reply.to_user_id, None, &accepted);
        tracing::info!(
            conn = %origin,
            caller = %reply.to_user_id,
            meeting_id = %reply.meeting_id,
            reached,
            "call accepted"
        );
        CallState::Accepted
    }

    /// Forwards the callee's refusal to every connection of the caller.
    pub fn reject(
        &self,
        registry: &ConnectionRegistry,
        origin: ConnectionId,
        reply: RejectCall,
    ) -> CallState {
        let callee = registry.identity_of(origin);
        let ended = {
            let mut sessions = self.sessions.lock();
            let key = sessions
                .iter()
                .find(|(_, s)| {
                    s.caller == reply.to_user_id
                        && callee.as_deref().is_none_or(|callee| callee == s.callee)
                })
                .map(|(meeting_id, _)| meeting_id.clone());
            key.and_then(|meeting_id| sessions.remove(&meeting_id))
        };
        if ended.is_none() {
            tracing::debug!(
                conn = %origin,
                caller = %reply.to_user_id,
                "reject without a ringing call, forwarding anyway"
            );
        }

        let reached = registry.push_user(&reply.to_user_id, None, &ServerEvent::CallRejected);
        tracing::info!(
            conn = %origin,
            caller = %reply.to_user_id,
            reached,
            "call rejected"
        );
        CallState::Rejected
    }

    /// Silently drops every ringing attempt involving `user_id`. Called when
    /// the user's last connection goes away. Returns the number dropped.
    pub fn abandon_user(&self, user_id: &str) -> usize {
        let mut sessions = self.sessions.lock();
        let before = sessions.len();
        sessions.retain(|_, s| s.caller != user_id && s.callee != user_id);
        before - sessions.len()
    }

    /// Returns the ringing attempt for a meeting, if any.
    #[must_use]
    pub fn pending(&self, meeting_id: &str) -> Option<CallSession> {
        self.sessions.lock().get(meeting_id).cloned()
    }

    /// Number of ringing attempts.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.sessions.lock().len()
    }
}
