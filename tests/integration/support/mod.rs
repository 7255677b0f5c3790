//! Shared WebSocket client helpers for the relay integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use prochat_proto::codec;
use prochat_proto::event::{ClientEvent, ServerEvent, SetupPayload};
use prochat_relay::relay::{self, RelayState};
use tokio_tungstenite::tungstenite;

pub type Ws =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Start an in-process relay on an OS-assigned port.
pub async fn start_relay() -> (SocketAddr, Arc<RelayState>) {
    let state = Arc::new(RelayState::new());
    let (addr, _handle) = relay::start_server_with_state("127.0.0.1:0", Arc::clone(&state))
        .await
        .unwrap();
    (addr, state)
}

/// Open a WebSocket without announcing an identity.
pub async fn connect(addr: SocketAddr) -> Ws {
    let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws"))
        .await
        .unwrap();
    ws
}

/// Open a WebSocket and announce `user_id`, waiting for `connected`.
pub async fn connect_as(addr: SocketAddr, user_id: &str) -> Ws {
    let mut ws = connect(addr).await;
    setup(&mut ws, user_id).await;
    ws
}

/// Send `setup` and wait for `connected`. Since events from one connection
/// are handled in order, this also acts as a barrier for earlier events.
pub async fn setup(ws: &mut Ws, user_id: &str) {
    send(
        ws,
        &ClientEvent::Setup(SetupPayload {
            user_id: user_id.to_string(),
        }),
    )
    .await;
    assert_eq!(recv(ws).await, ServerEvent::Connected);
}

pub async fn send(ws: &mut Ws, event: &ClientEvent) {
    let text = codec::encode_client(event).unwrap();
    ws.send(tungstenite::Message::Text(text.into())).await.unwrap();
}

pub async fn recv(ws: &mut Ws) -> ServerEvent {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .unwrap_or_else(|_| panic!("timed out waiting for an event"))
            .unwrap()
            .unwrap();
        if let tungstenite::Message::Text(text) = msg {
            return codec::decode_server(text.as_str()).unwrap();
        }
    }
}

/// Assert that nothing arrives on `ws` for a short while.
pub async fn assert_silent(ws: &mut Ws) {
    let result = tokio::time::timeout(Duration::from_millis(200), ws.next()).await;
    assert!(result.is_err(), "unexpected frame: {result:?}");
}

/// Wait until `check` holds, polling the shared state.
pub async fn eventually(mut check: impl FnMut() -> bool) {
    for _ in 0..100 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("condition never became true");
}
