//! Routing fields of a persisted chat message.
//!
//! The relay treats a `new message` payload as an opaque document apart from
//! the three fields it needs for fan-out: who sent it, which chat it belongs
//! to, and (when the persistence layer populated it) the chat's members.
//! Both populated documents (`{"_id": ..., "name": ...}`) and bare id strings
//! are accepted for each of them.

use serde_json::Value;

/// Errors raised while reading routing fields from a message document.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MessageError {
    /// The payload is not a JSON object.
    #[error("message payload is not an object")]
    NotAnObject,
    /// `sender` is absent or carries no id.
    #[error("message has no sender id")]
    MissingSender,
    /// `chat` is absent or carries no id.
    #[error("message has no chat")]
    MissingChat,
}

/// Routing fields extracted from a message document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRoute {
    /// Identity of the author.
    pub sender: String,
    /// The chat's id, if the chat was given as a document with `_id` or as
    /// a bare id string.
    pub chat_id: Option<String>,
    /// Member identities from `chat.users`, when populated.
    pub members: Option<Vec<String>>,
}

impl MessageRoute {
    /// Reads the routing fields of a message document.
    ///
    /// A missing `chat.users` is not an error here: the caller may still be
    /// able to resolve members from the chat id.
    ///
    /// # Errors
    ///
    /// Returns [`MessageError`] if the payload is not an object or lacks a
    /// sender id or a chat.
    pub fn from_payload(payload: &Value) -> Result<Self, MessageError> {
        let object = payload.as_object().ok_or(MessageError::NotAnObject)?;

        let sender = object
            .get("sender")
            .and_then(document_id)
            .ok_or(MessageError::MissingSender)?;

        let chat = object.get("chat").ok_or(MessageError::MissingChat)?;
        let chat_id = document_id(chat);
        let members = chat
            .get("users")
            .and_then(Value::as_array)
            .map(|users| users.iter().filter_map(document_id).collect());

        if chat_id.is_none() && members.is_none() {
            return Err(MessageError::MissingChat);
        }

        Ok(Self {
            sender,
            chat_id,
            members,
        })
    }
}

/// Returns the id of a populated document (`_id`) or a bare id string.
fn document_id(value: &Value) -> Option<String> {
    match value {
        Value::String(id) if !id.is_empty() => Some(id.clone()),
        Value::Object(doc) => doc
            .get("_id")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .map(str::to_string),
        _ => None,
    }
}
