//! Serialization of relay events to and from WebSocket text frames.
//!
//! Frames are JSON text; see [`crate::event`] for the envelope shape. The
//! relay decodes [`ClientEvent`]s and encodes [`ServerEvent`]s; clients (and
//! tests) use the opposite pair.

use crate::event::{ClientEvent, ServerEvent};

/// Error type for codec encode/decode operations.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Encodes a [`ServerEvent`] into a JSON text frame.
///
/// # Errors
///
/// Returns `CodecError::Serialization` if the event cannot be serialized.
pub fn encode_server(event: &ServerEvent) -> Result<String, CodecError> {
    Ok(serde_json::to_string(event)?)
}

/// Decodes a [`ServerEvent`] from a JSON text frame.
///
/// # Errors
///
/// Returns `CodecError::Serialization` if the text is not a known server event.
pub fn decode_server(text: &str) -> Result<ServerEvent, CodecError> {
    Ok(serde_json::from_str(text)?)
}

/// Encodes a [`ClientEvent`] into a JSON text frame.
///
/// # Errors
///
/// Returns `CodecError::Serialization` if the event cannot be serialized.
pub fn encode_client(event: &ClientEvent) -> Result<String, CodecError> {
    Ok(serde_json::to_string(event)?)
}

/// Decodes a [`ClientEvent`] from a JSON text frame.
///
/// # Errors
///
/// Returns `CodecError::Serialization` if the text is not valid JSON, names
/// an unknown event, or lacks a required field.
pub fn decode_client(text: &str) -> Result<ClientEvent, CodecError> {
    Ok(serde_json::from_str(text)?)
}
