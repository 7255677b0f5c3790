//! Integration tests for live message fan-out and typing indicators.
//!
//! Verifies:
//! 1. A message reaches every live connection of every recipient.
//! 2. The sender's own connections never receive it.
//! 3. Offline recipients are skipped without affecting the others.
//! 4. A message without a member list is dropped and the socket stays open.
//! 5. Typing indicators never echo back to the originating connection.

mod support;

use prochat_proto::event::{ClientEvent, ServerEvent};
use serde_json::{Value, json};
use support::{assert_silent, connect_as, recv, send, setup, start_relay};

fn message(sender: &str, users: &[&str]) -> Value {
    json!({
        "_id": "msg1",
        "content": "hello",
        "sender": {"_id": sender, "name": sender.to_uppercase()},
        "chat": {
            "_id": "chat42",
            "isGroupChat": users.len() > 2,
            "users": users.iter().map(|u| json!({"_id": u})).collect::<Vec<_>>()
        }
    })
}

#[tokio::test]
async fn message_reaches_every_recipient_connection_but_not_sender() {
    let (addr, _state) = start_relay().await;

    let mut c1 = connect_as(addr, "A").await;
    let mut c2 = connect_as(addr, "B").await;
    let mut c3 = connect_as(addr, "B").await;

    for ws in [&mut c1, &mut c2, &mut c3] {
        send(ws, &ClientEvent::JoinChat("chat42".into())).await;
    }

    let payload = message("A", &["A", "B"]);
    send(&mut c1, &ClientEvent::NewMessage(payload.clone())).await;

    assert_eq!(recv(&mut c2).await, ServerEvent::MessageReceived(payload.clone()));
    assert_eq!(recv(&mut c3).await, ServerEvent::MessageReceived(payload));
    assert_silent(&mut c1).await;
}

#[tokio::test]
async fn sender_listed_as_recipient_is_skipped() {
    let (addr, _state) = start_relay().await;

    let mut cs = connect_as(addr, "S").await;
    let mut cs_other_tab = connect_as(addr, "S").await;
    let mut ca = connect_as(addr, "A").await;
    let mut cb = connect_as(addr, "B").await;

    send(&mut cs, &ClientEvent::NewMessage(message("S", &["S", "A", "B"]))).await;

    assert!(matches!(recv(&mut ca).await, ServerEvent::MessageReceived(_)));
    assert!(matches!(recv(&mut cb).await, ServerEvent::MessageReceived(_)));
    assert_silent(&mut cs).await;
    assert_silent(&mut cs_other_tab).await;
}

#[tokio::test]
async fn offline_recipient_does_not_block_others() {
    let (addr, _state) = start_relay().await;

    let mut ca = connect_as(addr, "A").await;
    let mut cb = connect_as(addr, "B").await;

    send(&mut ca, &ClientEvent::NewMessage(message("A", &["A", "ghost", "B"]))).await;
    assert!(matches!(recv(&mut cb).await, ServerEvent::MessageReceived(_)));
}

#[tokio::test]
async fn message_without_members_is_dropped() {
    let (addr, _state) = start_relay().await;

    let mut ca = connect_as(addr, "A").await;
    let mut cb = connect_as(addr, "B").await;

    let broken = json!({"sender": {"_id": "A"}, "chat": {"_id": "chat42"}});
    send(&mut ca, &ClientEvent::NewMessage(broken)).await;
    assert_silent(&mut cb).await;

    // The sending connection is still usable.
    setup(&mut ca, "A").await;
}

#[tokio::test]
async fn typing_is_never_echoed_to_origin() {
    let (addr, _state) = start_relay().await;

    let mut c1 = connect_as(addr, "A").await;
    let mut c2 = connect_as(addr, "B").await;
    send(&mut c1, &ClientEvent::JoinChat("chat42".into())).await;
    send(&mut c2, &ClientEvent::JoinChat("chat42".into())).await;
    setup(&mut c2, "B").await;

    send(&mut c1, &ClientEvent::Typing("chat42".into())).await;
    assert_eq!(recv(&mut c2).await, ServerEvent::Typing("chat42".into()));

    send(&mut c1, &ClientEvent::StopTyping("chat42".into())).await;
    assert_eq!(recv(&mut c2).await, ServerEvent::StopTyping("chat42".into()));

    assert_silent(&mut c1).await;
}

#[tokio::test]
async fn left_room_no_longer_hears_typing() {
    let (addr, state) = start_relay().await;

    let mut c1 = connect_as(addr, "A").await;
    let mut c2 = connect_as(addr, "B").await;
    send(&mut c1, &ClientEvent::JoinChat("chat42".into())).await;
    send(&mut c2, &ClientEvent::JoinChat("chat42".into())).await;
    send(&mut c2, &ClientEvent::LeaveRoom("chat42".into())).await;
    setup(&mut c1, "A").await;
    setup(&mut c2, "B").await;

    assert_eq!(state.registry.members_of("chat42").len(), 1);

    send(&mut c1, &ClientEvent::Typing("chat42".into())).await;
    assert_silent(&mut c2).await;
}
