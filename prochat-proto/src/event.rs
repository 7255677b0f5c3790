//! Event types carried over the relay's WebSocket text frames.
//!
//! Every frame is a single JSON object of the form
//! `{"event": "<name>", "data": <payload>}`. [`ClientEvent`] lists what a
//! client may send, [`ServerEvent`] what the relay pushes back. Each event
//! name maps to exactly one variant with explicit required fields, so a
//! frame is validated once at the boundary and never re-inspected.
//!
//! Signalling payloads and persisted message objects are carried as
//! [`serde_json::Value`]; the relay forwards them without interpreting them.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::ConnectionId;

/// Events sent by a client to the relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientEvent {
    /// Announces the authenticated user identity of this connection.
    #[serde(rename = "setup")]
    Setup(SetupPayload),

    /// Joins the room of a chat conversation.
    #[serde(rename = "join chat")]
    JoinChat(String),

    /// Joins the room of a meeting; existing members are told about the
    /// newcomer so one of them can start the peer offer.
    #[serde(rename = "join meeting")]
    JoinMeeting(String),

    /// Leaves a previously joined room.
    #[serde(rename = "leave room")]
    LeaveRoom(String),

    /// The user started typing in a room.
    #[serde(rename = "typing")]
    Typing(String),

    /// The user stopped typing in a room.
    #[serde(rename = "stop typing")]
    StopTyping(String),

    /// A message that the persistence layer has already stored, populated
    /// with its sender and chat (including `chat.users`).
    #[serde(rename = "new message")]
    NewMessage(Value),

    /// Rings another user for a pre-created meeting.
    #[serde(rename = "direct-call")]
    DirectCall(DirectCall),

    /// The callee accepted an incoming call.
    #[serde(rename = "accept-call")]
    AcceptCall(AcceptCall),

    /// The callee declined an incoming call.
    #[serde(rename = "reject-call")]
    RejectCall(RejectCall),

    /// Opaque peer offer addressed to another meeting participant.
    #[serde(rename = "call-user")]
    CallUser(CallUser),

    /// Opaque peer answer addressed back to the offering participant.
    #[serde(rename = "answer-call")]
    AnswerCall(AnswerCall),
}

/// Events pushed by the relay to a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    /// Acknowledges a successful `setup`.
    #[serde(rename = "connected")]
    Connected,

    /// Someone else in the room started typing.
    #[serde(rename = "typing")]
    Typing(String),

    /// Someone else in the room stopped typing.
    #[serde(rename = "stop typing")]
    StopTyping(String),

    /// A message for one of the recipient's chats.
    #[serde(rename = "message received")]
    MessageReceived(Value),

    /// Someone is ringing this user.
    #[serde(rename = "incoming-call")]
    IncomingCall(IncomingCall),

    /// The callee accepted; join the meeting.
    #[serde(rename = "call-accepted")]
    CallAccepted(CallAccepted),

    /// The callee declined.
    #[serde(rename = "call-rejected")]
    CallRejected,

    /// The call could not be placed (callee unreachable).
    #[serde(rename = "call-error")]
    CallError(CallError),

    /// Relayed peer offer.
    #[serde(rename = "call-user")]
    CallUser(SignalOffer),

    /// Relayed peer answer.
    #[serde(rename = "call-accepted-signal")]
    CallAcceptedSignal(Value),

    /// A new connection joined a meeting room this connection is in.
    #[serde(rename = "user-joined")]
    UserJoined(ConnectionId),

    /// The relay refused a frame.
    #[serde(rename = "error")]
    Error {
        /// Human-readable error description.
        reason: String,
    },
}

/// Payload of `setup`.
///
/// Clients send either `{"userId": ...}` or their whole user document, in
/// which case the id is read from `_id` and the other fields are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetupPayload {
    /// The announced user identity.
    #[serde(rename = "userId", alias = "_id")]
    pub user_id: String,
}

/// Who is calling, as shown on the callee's ringing dialog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallerInfo {
    /// Caller user identity.
    #[serde(rename = "_id")]
    pub id: String,
    /// Caller display name.
    #[serde(default)]
    pub name: String,
}

/// Payload of `direct-call`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectCall {
    /// Identity of the user being called.
    pub target_user_id: String,
    /// The calling user.
    pub from_user: CallerInfo,
    /// Meeting minted by the meeting API before ringing.
    pub meeting_id: String,
}

/// Payload of `accept-call`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptCall {
    /// Identity of the original caller.
    pub to_user_id: String,
    /// Meeting the caller should open.
    pub meeting_id: String,
}

/// Payload of `reject-call`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectCall {
    /// Identity of the original caller.
    pub to_user_id: String,
}

/// Payload of an inbound `call-user` offer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallUser {
    /// Connection id (or user identity) of the peer to offer to.
    pub user_to_call: String,
    /// Opaque offer payload.
    pub signal_data: Value,
    /// Claimed sender; the relay replaces it with the real connection id.
    #[serde(default)]
    pub from: Option<String>,
    /// Display name of the offering user.
    #[serde(default)]
    pub name: Option<String>,
}

/// Payload of an inbound `answer-call`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerCall {
    /// Opaque answer payload.
    pub signal: Value,
    /// Connection id (or user identity) of the offering peer.
    pub to: String,
}

/// Payload of an outbound `incoming-call`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomingCall {
    /// The calling user.
    pub from_user: CallerInfo,
    /// Meeting to open on accept.
    pub meeting_id: String,
}

/// Payload of an outbound `call-accepted`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallAccepted {
    /// Meeting the callee accepted.
    pub meeting_id: String,
}

/// Payload of an outbound `call-error`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallError {
    /// Human-readable reason shown to the caller.
    pub message: String,
}

/// Payload of an outbound `call-user` offer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalOffer {
    /// Opaque offer payload, forwarded verbatim.
    pub signal: Value,
    /// Connection id of the offering peer, to address the answer to.
    pub from: String,
    /// Display name of the offering user.
    #[serde(default)]
    pub name: Option<String>,
}
