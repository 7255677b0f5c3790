//! Integration tests for meeting rooms and peer signaling.
//!
//! Verifies:
//! 1. Joining a meeting announces the newcomer's connection id to the others.
//! 2. Offers are relayed as `call-user` with the true sender connection id.
//! 3. Answers are relayed as `call-accepted-signal`.
//! 4. Signaling works before any identity is announced.

mod support;

use prochat_proto::event::{AnswerCall, CallUser, ClientEvent, ServerEvent};
use serde_json::json;
use support::{assert_silent, connect, recv, send, setup, start_relay};

#[tokio::test]
async fn join_offer_answer_round() {
    let (addr, state) = start_relay().await;

    let mut p1 = connect(addr).await;
    let mut p2 = connect(addr).await;

    send(&mut p1, &ClientEvent::JoinMeeting("m1".into())).await;
    setup(&mut p1, "A").await;
    send(&mut p2, &ClientEvent::JoinMeeting("m1".into())).await;

    let ServerEvent::UserJoined(p2_id) = recv(&mut p1).await else {
        panic!("expected user-joined");
    };
    assert!(state.registry.members_of("m1").contains(&p2_id));
    assert_silent(&mut p2).await;

    let offer = json!({"type": "offer", "sdp": "v=0"});
    send(
        &mut p1,
        &ClientEvent::CallUser(CallUser {
            user_to_call: p2_id.to_string(),
            signal_data: offer.clone(),
            from: Some("spoofed".into()),
            name: Some("Alice".into()),
        }),
    )
    .await;

    let ServerEvent::CallUser(received) = recv(&mut p2).await else {
        panic!("expected call-user");
    };
    assert_eq!(received.signal, offer);
    assert_eq!(received.name.as_deref(), Some("Alice"));
    assert_ne!(received.from, "spoofed");

    let answer = json!({"type": "answer", "sdp": "v=0"});
    send(
        &mut p2,
        &ClientEvent::AnswerCall(AnswerCall {
            signal: answer.clone(),
            to: received.from.clone(),
        }),
    )
    .await;
    assert_eq!(recv(&mut p1).await, ServerEvent::CallAcceptedSignal(answer));
}

#[tokio::test]
async fn rejoining_meeting_is_silent() {
    let (addr, _state) = start_relay().await;

    let mut p1 = connect(addr).await;
    let mut p2 = connect(addr).await;

    send(&mut p1, &ClientEvent::JoinMeeting("m1".into())).await;
    setup(&mut p1, "A").await;
    send(&mut p2, &ClientEvent::JoinMeeting("m1".into())).await;
    assert!(matches!(recv(&mut p1).await, ServerEvent::UserJoined(_)));

    send(&mut p2, &ClientEvent::JoinMeeting("m1".into())).await;
    assert_silent(&mut p1).await;
}

#[tokio::test]
async fn offer_to_unknown_target_is_dropped() {
    let (addr, _state) = start_relay().await;

    let mut p1 = connect(addr).await;
    send(
        &mut p1,
        &ClientEvent::CallUser(CallUser {
            user_to_call: "nobody".into(),
            signal_data: json!({}),
            from: None,
            name: None,
        }),
    )
    .await;
    assert_silent(&mut p1).await;

    // The connection survives.
    setup(&mut p1, "A").await;
}
