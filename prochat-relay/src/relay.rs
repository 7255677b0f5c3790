//! Relay server core: shared state, WebSocket handler, and event dispatch.
//!
//! Every WebSocket is a connection in the [`ConnectionRegistry`]. Inbound
//! text frames are decoded into [`ClientEvent`]s and handled one at a time,
//! in arrival order, by [`RelayState::dispatch`]. Outbound events go through
//! the connection's outbox to a dedicated writer task, so no handler ever
//! waits on the network.
//!
//! Bad frames are logged and dropped. Only the transport closing ends a
//! connection.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use prochat_proto::codec;
use prochat_proto::event::{ClientEvent, ServerEvent, SetupPayload};
use prochat_proto::ids::ConnectionId;
use tokio::sync::mpsc;

use crate::calls::CallBroker;
use crate::config::RelayConfig;
use crate::fanout::{self, ChatMembership, Delivery, EmbeddedOnly};
use crate::identity::{ClaimedIdentity, IdentityResolver};
use crate::registry::{ConnectionRegistry, DEFAULT_MAX_ROOMS_PER_CONNECTION};
use crate::{signaling, typing};

/// Default maximum allowed inbound frame size in bytes (64 KB).
pub const DEFAULT_MAX_PAYLOAD_SIZE: usize = 64 * 1024;

/// Shared relay server state.
pub struct RelayState {
    /// Live connections, identities, and rooms.
    pub registry: ConnectionRegistry,
    /// Ringing call attempts.
    pub calls: CallBroker,
    identity: Box<dyn IdentityResolver>,
    membership: Box<dyn ChatMembership>,
    /// Maximum allowed inbound frame size in bytes.
    max_payload_size: usize,
}

impl Default for RelayState {
    fn default() -> Self {
        Self::new()
    }
}

impl RelayState {
    /// Creates a new relay state with default limits, trusting `setup`
    /// claims and reading members from the message documents.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(DEFAULT_MAX_PAYLOAD_SIZE, DEFAULT_MAX_ROOMS_PER_CONNECTION)
    }

    /// Creates a new relay state with custom frame size and room limits.
    #[must_use]
    pub fn with_config(max_payload_size: usize, max_rooms_per_connection: usize) -> Self {
        Self {
            registry: ConnectionRegistry::with_room_limit(max_rooms_per_connection),
            calls: CallBroker::new(),
            identity: Box::new(ClaimedIdentity),
            membership: Box::new(EmbeddedOnly),
            max_payload_size,
        }
    }

    /// Creates a new relay state from a resolved [`RelayConfig`].
    #[must_use]
    pub fn from_config(config: &RelayConfig) -> Self {
        Self::with_config(config.max_payload_size, config.max_rooms_per_connection)
    }

    /// Replaces the resolver applied to `setup` claims.
    #[must_use]
    pub fn with_identity_resolver(mut self, resolver: impl IdentityResolver + 'static) -> Self {
        self.identity = Box::new(resolver);
        self
    }

    /// Replaces the resolver consulted for messages without `chat.users`.
    #[must_use]
    pub fn with_chat_membership(mut self, membership: impl ChatMembership + 'static) -> Self {
        self.membership = Box::new(membership);
        self
    }

    /// Decodes one inbound text frame and dispatches it.
    pub fn handle_text(&self, conn: ConnectionId, text: &str) {
        if text.len() > self.max_payload_size {
            tracing::warn!(
                conn = %conn,
                size = text.len(),
                max = self.max_payload_size,
                "frame exceeds size limit"
            );
            self.registry.push(
                conn,
                ServerEvent::Error {
                    reason: format!(
                        "payload too large: {} bytes (max {})",
                        text.len(),
                        self.max_payload_size
                    ),
                },
            );
            return;
        }

        match codec::decode_client(text) {
            Ok(event) => self.dispatch(conn, event),
            Err(e) => tracing::warn!(conn = %conn, error = %e, "failed to decode event"),
        }
    }

    /// Handles one decoded event from `conn`.
    ///
    /// Events from a connection that has already been torn down are dropped.
    pub fn dispatch(&self, conn: ConnectionId, event: ClientEvent) {
        if !self.registry.is_live(conn) {
            tracing::debug!(conn = %conn, "dropping event from departed connection");
            return;
        }
        match event {
            ClientEvent::Setup(claim) => self.setup(conn, &claim),
            ClientEvent::JoinChat(room_id) => match self.registry.join(conn, &room_id) {
                Ok(_) => tracing::info!(conn = %conn, room_id = %room_id, "joined chat"),
                Err(e) => {
                    tracing::warn!(
                        conn = %conn,
                        room_id = %room_id,
                        error = %e,
                        "join chat failed"
                    );
                }
            },
            ClientEvent::JoinMeeting(meeting_id) => {
                if let Err(e) = signaling::join_meeting(&self.registry, conn, &meeting_id) {
                    tracing::warn!(
                        conn = %conn,
                        meeting_id = %meeting_id,
                        error = %e,
                        "join meeting failed"
                    );
                }
            }
            ClientEvent::LeaveRoom(room_id) => {
                let was_member = self.registry.leave(conn, &room_id);
                tracing::debug!(conn = %conn, room_id = %room_id, was_member, "left room");
            }
            ClientEvent::Typing(room_id) => {
                typing::notify_typing(&self.registry, &room_id, conn);
            }
            ClientEvent::StopTyping(room_id) => {
                typing::notify_stop_typing(&self.registry, &room_id, conn);
            }
            ClientEvent::NewMessage(payload) => {
                match Delivery::from_payload(payload, self.membership.as_ref()) {
                    Ok(delivery) => {
                        fanout::deliver(&self.registry, Some(conn), &delivery);
                    }
                    Err(e) => tracing::warn!(conn = %conn, error = %e, "dropping new message"),
                }
            }
            ClientEvent::DirectCall(call) => {
                self.calls.initiate(&self.registry, conn, call);
            }
            ClientEvent::AcceptCall(reply) => {
                self.calls.accept(&self.registry, conn, reply);
            }
            ClientEvent::RejectCall(reply) => {
                self.calls.reject(&self.registry, conn, reply);
            }
            ClientEvent::CallUser(offer) => {
                signaling::relay_offer(&self.registry, conn, offer);
            }
            ClientEvent::AnswerCall(answer) => {
                signaling::relay_answer(&self.registry, conn, answer);
            }
        }
    }

    fn setup(&self, conn: ConnectionId, claim: &SetupPayload) {
        let user_id = match self.identity.resolve(claim) {
            Ok(user_id) => user_id,
            Err(e) => {
                tracing::warn!(conn = %conn, error = %e, "setup rejected");
                return;
            }
        };

        match self.registry.on_setup(conn, &user_id) {
            Ok(previous) => {
                if let Some(previous) = previous
                    && previous != user_id
                {
                    tracing::info!(
                        conn = %conn,
                        previous = %previous,
                        "connection changed identity"
                    );
                    if self.registry.resolve(&previous).is_empty() {
                        self.calls.abandon_user(&previous);
                    }
                }
                tracing::info!(conn = %conn, user_id = %user_id, "connection set up");
                self.registry.push(conn, ServerEvent::Connected);
            }
            Err(e) => tracing::warn!(conn = %conn, error = %e, "setup failed"),
        }
    }

    /// Tears down a connection: rooms, identity, and, for a user's last
    /// connection, any ringing call attempts. Safe to call more than once.
    pub fn disconnect(&self, conn: ConnectionId) {
        let Some(departed) = self.registry.on_disconnect(conn) else {
            return;
        };
        if departed.user_offline
            && let Some(user_id) = departed.user.as_deref()
        {
            let dropped = self.calls.abandon_user(user_id);
            if dropped > 0 {
                tracing::debug!(user_id = %user_id, dropped, "abandoned ringing calls");
            }
        }
        tracing::info!(
            conn = %conn,
            user_id = departed.user.as_deref().unwrap_or("-"),
            rooms = departed.rooms.len(),
            "connection closed"
        );
    }
}

/// Handles an upgraded WebSocket connection.
///
/// The connection lifecycle:
/// 1. Register the connection (no identity yet) with its outbox.
/// 2. Spawn a writer task draining the outbox onto the socket.
/// 3. Read frames and dispatch them in order.
/// 4. When either half ends, tear the connection down.
pub async fn handle_socket(socket: WebSocket, state: Arc<RelayState>) {
    let (mut ws_sender, mut ws_receiver) = socket.split();

    let (tx, mut rx) = mpsc::unbounded_channel::<ServerEvent>();
    let conn = state.registry.on_connect(tx);
    tracing::info!(conn = %conn, "connection opened");

    // Writer task: encodes outbound events and flushes them to the socket.
    let mut write_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let text = match codec::encode_server(&event) {
                Ok(text) => text,
                Err(e) => {
                    tracing::warn!(conn = %conn, error = %e, "failed to encode event");
                    continue;
                }
            };
            if ws_sender.send(Message::Text(text.into())).await.is_err() {
                tracing::warn!(conn = %conn, "WebSocket write failed");
                break;
            }
        }
    });

    // Reader loop: events from one connection are handled in arrival order.
    let reader_state = Arc::clone(&state);
    let mut read_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_receiver.next().await {
            match msg {
                Message::Text(text) => reader_state.handle_text(conn, text.as_str()),
                Message::Binary(data) => {
                    tracing::warn!(conn = %conn, len = data.len(), "ignoring binary frame");
                }
                Message::Close(_) => {
                    tracing::info!(conn = %conn, "received close frame");
                    break;
                }
                _ => {
                    // Ignore ping and pong frames.
                }
            }
        }
    });

    // Wait for either task to finish, then stop the other. The reader must
    // be fully stopped before teardown so no event is handled afterwards.
    tokio::select! {
        _ = &mut read_task => {
            write_task.abort();
        }
        _ = &mut write_task => {
            read_task.abort();
            if let Err(e) = read_task.await
                && !e.is_cancelled()
            {
                tracing::warn!(conn = %conn, error = %e, "reader task failed");
            }
        }
    }

    state.disconnect(conn);
}

/// Starts the relay server on the given address and returns the bound address
/// and a join handle.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server(
    addr: &str,
) -> Result<
    (std::net::SocketAddr, tokio::task::JoinHandle<()>),
    Box<dyn std::error::Error + Send + Sync>,
> {
    start_server_with_state(addr, Arc::new(RelayState::new())).await
}

/// Starts the relay server with a pre-configured [`RelayState`].
///
/// Use [`RelayState::from_config`] to build a state from the resolved
/// [`RelayConfig`].
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server_with_state(
    addr: &str,
    state: Arc<RelayState>,
) -> Result<
    (std::net::SocketAddr, tokio::task::JoinHandle<()>),
    Box<dyn std::error::Error + Send + Sync>,
> {
    let app = axum::Router::new()
        .route("/ws", axum::routing::get(ws_handler))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let bound_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "relay server error");
        }
    });

    Ok((bound_addr, handle))
}

/// Starts the relay server in-process for testing.
///
/// Binds to `127.0.0.1:0` (OS-assigned port) and returns the bound address,
/// the shared state, and a [`tokio::task::JoinHandle`] for cleanup.
#[cfg(test)]
pub async fn start_test_server() -> (
    std::net::SocketAddr,
    Arc<RelayState>,
    tokio::task::JoinHandle<()>,
) {
    let state = Arc::new(RelayState::new());
    let (addr, handle) = start_server_with_state("127.0.0.1:0", Arc::clone(&state))
        .await
        .expect("failed to start test server");
    (addr, state, handle)
}

/// axum handler that upgrades an HTTP request to a WebSocket connection.
async fn ws_handler(
    ws: axum::extract::ws::WebSocketUpgrade,
    axum::extract::State(state): axum::extract::State<Arc<RelayState>>,
) -> impl axum::response::IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}
