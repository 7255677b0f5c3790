//! Live fan-out of persisted chat messages.
//!
//! The persistence layer stores a message and the author's client then
//! hands the populated document to the relay as `new message`. The router
//! pushes it as `message received` to every live connection of every
//! recipient except the sender. Recipients without a live connection are
//! skipped: nothing is queued or retried, the message is already stored.

use std::collections::{HashMap, HashSet};

use parking_lot::RwLock;
use prochat_proto::event::ServerEvent;
use prochat_proto::ids::ConnectionId;
use prochat_proto::message::{MessageError, MessageRoute};
use serde_json::Value;

use crate::registry::ConnectionRegistry;

/// Errors raised while building a [`Delivery`] from a message document.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FanoutError {
    /// The document lacks its routing fields.
    #[error(transparent)]
    Message(#[from] MessageError),
    /// Neither the document nor the membership resolver lists the members.
    #[error("no member list for chat {}", .chat_id.as_deref().unwrap_or("<unknown>"))]
    NoMembers {
        /// Chat whose members could not be found.
        chat_id: Option<String>,
    },
}

/// Resolves the member identities of a chat.
///
/// Used when a message arrives without a populated `chat.users` list.
pub trait ChatMembership: Send + Sync {
    /// Returns the member identities of `chat_id`, or `None` if unknown.
    fn members(&self, chat_id: &str) -> Option<Vec<String>>;
}

/// Membership resolver that knows no chats; messages must carry
/// `chat.users` themselves.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmbeddedOnly;

impl ChatMembership for EmbeddedOnly {
    fn members(&self, _chat_id: &str) -> Option<Vec<String>> {
        None
    }
}

/// In-memory membership resolver for embedding the relay next to a chat
/// store that pushes membership changes into it.
#[derive(Debug, Default)]
pub struct StaticMembership {
    chats: RwLock<HashMap<String, Vec<String>>>,
}

impl StaticMembership {
    /// Creates an empty resolver.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the member list of a chat.
    pub fn set_members(&self, chat_id: &str, members: Vec<String>) {
        self.chats.write().insert(chat_id.to_string(), members);
    }

    /// Forgets a chat.
    pub fn remove(&self, chat_id: &str) {
        self.chats.write().remove(chat_id);
    }
}

impl ChatMembership for StaticMembership {
    fn members(&self, chat_id: &str) -> Option<Vec<String>> {
        self.chats.read().get(chat_id).cloned()
    }
}

/// A message ready for fan-out.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    /// Author identity; never receives its own message.
    pub sender: String,
    /// Recipient identities, possibly including the sender.
    pub recipients: Vec<String>,
    /// The message document, forwarded verbatim.
    pub payload: Value,
}

impl Delivery {
    /// Builds a delivery from a `new message` document.
    ///
    /// Members come from the embedded `chat.users` list, falling back to
    /// `membership` keyed by the chat id.
    ///
    /// # Errors
    ///
    /// Returns [`FanoutError::Message`] if the document lacks a sender or a
    /// chat, and [`FanoutError::NoMembers`] if no member list is available.
    pub fn from_payload(
        payload: Value,
        membership: &dyn ChatMembership,
    ) -> Result<Self, FanoutError> {
        let route = MessageRoute::from_payload(&payload)?;
        let recipients = match route.members {
            Some(members) => members,
            None => route
                .chat_id
                .as_deref()
                .and_then(|chat_id| membership.members(chat_id))
                .ok_or(FanoutError::NoMembers {
                    chat_id: route.chat_id.clone(),
                })?,
        };
        Ok(Self {
            sender: route.sender,
            recipients,
            payload,
        })
    }
}

/// Pushes a message to the live connections of every recipient but the
/// sender, and never to `origin` (the connection the message came from).
///
/// Each connection is tried independently. Returns the number of
/// connections reached.
pub fn deliver(
    registry: &ConnectionRegistry,
    origin: Option<ConnectionId>,
    delivery: &Delivery,
) -> usize {
    let event = ServerEvent::MessageReceived(delivery.payload.clone());
    let mut seen = HashSet::new();
    let mut reached = 0;
    for user in &delivery.recipients {
        if *user == delivery.sender || !seen.insert(user.as_str()) {
            continue;
        }
        reached += registry.push_user(user, origin, &event);
    }
    tracing::debug!(
        sender = %delivery.sender,
        recipients = delivery.recipients.len(),
        reached,
        "message fanned out"
    );
    reached
}
