//! Session controller scenarios over the in-process transport

mod common;

use std::time::Duration;

use serde_json::json;
use tokio::sync::watch;

use common::{mentee, seeded_db, FlakyBackend};
use mentor_chat::models::DeliveryStatus;
use mentor_chat::transport::MemoryHandle;
use mentor_chat::{
    ChatBackend, ChatConfig, ChatError, ChatSession, Database, MemoryTransport, Notification,
    SessionState, StaticIdentity, TransportEvent,
};

fn session_with<B: ChatBackend>(backend: B) -> (ChatSession<MemoryTransport, B>, MemoryHandle) {
    let transport = MemoryTransport::new();
    let handle = transport.handle();
    (
        ChatSession::new(transport, backend, &ChatConfig::default()),
        handle,
    )
}

fn message_event(channel: &str, data: serde_json::Value) -> TransportEvent {
    TransportEvent::Event {
        channel: channel.to_string(),
        event: "message".to_string(),
        data,
    }
}

#[tokio::test]
async fn test_optimistic_send_visible_before_confirmation() {
    let (mut session, handle) = session_with(seeded_db(&["U1", "U2"]));
    session.start(&StaticIdentity::signed_in(mentee("U1"))).unwrap();

    let pending = session.begin_send("U2", "hi").unwrap();

    let messages = session.state().unwrap().conversations().messages("U2");
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].content, "hi");
    assert!(messages[0].is_own);
    assert_eq!(messages[0].status, DeliveryStatus::Sending);
    assert!(handle.log().triggers.is_empty());

    let confirmed = session.complete_send(&pending).await.unwrap();
    let messages = session.state().unwrap().conversations().messages("U2");
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].id, confirmed.id);
    assert_eq!(messages[0].status, DeliveryStatus::Sent);

    let triggers = handle.log().triggers;
    assert_eq!(triggers.len(), 1);
    assert_eq!(triggers[0].channel, "private-user-U2");
    assert_eq!(triggers[0].data["correlation_id"], json!(pending.correlation_id));
}

#[tokio::test]
async fn test_echo_after_confirm_does_not_duplicate() {
    let (mut session, handle) = session_with(seeded_db(&["U1", "U2"]));
    session.start(&StaticIdentity::signed_in(mentee("U1"))).unwrap();

    let confirmed = session.send_message("U2", "hello").await.unwrap();
    handle.deliver(message_event(
        "private-user-U1",
        json!({
            "id": confirmed.id,
            "sender_id": "U1",
            "recipient_id": "U2",
            "content": "hello",
            "created_at": confirmed.created_at,
            "correlation_id": confirmed.correlation_id,
        }),
    ));
    assert_eq!(session.drain(), 1);

    let messages = session.state().unwrap().conversations().messages("U2");
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].status, DeliveryStatus::Sent);
}

#[tokio::test]
async fn test_double_start_binds_once() {
    let (mut session, handle) = session_with(seeded_db(&["U1"]));
    let identity = StaticIdentity::signed_in(mentee("U1"));

    assert!(session.start(&identity).unwrap());
    assert!(!session.start(&identity).unwrap());

    let log = handle.log();
    assert_eq!(log.connects, vec!["U1"]);
    assert_eq!(log.binds.len(), 5);
    assert_eq!(log.subscriptions.len(), 2);
    assert_eq!(handle.bind_count("private-user-U1", "message"), 1);
    assert_eq!(handle.bind_count("presence-chat", "member_added"), 1);
}

#[tokio::test]
async fn test_stop_twice_is_safe() {
    let (mut session, handle) = session_with(seeded_db(&["U1"]));
    assert!(!session.stop());

    session.start(&StaticIdentity::signed_in(mentee("U1"))).unwrap();
    assert_eq!(session.session_state(), SessionState::Connected);

    assert!(session.stop());
    assert!(!session.stop());
    assert_eq!(session.session_state(), SessionState::Disconnected);
    assert!(session.state().is_none());
    assert_eq!(handle.log().disconnects, 1);
}

#[tokio::test]
async fn test_start_requires_identity() {
    let (mut session, handle) = session_with(seeded_db(&[]));
    let err = session.start(&StaticIdentity::default()).unwrap_err();
    assert_eq!(err, ChatError::Unauthorized);
    assert!(handle.log().connects.is_empty());
    assert_eq!(
        session.begin_send("U2", "hi").unwrap_err(),
        ChatError::Unauthorized
    );
}

#[tokio::test]
async fn test_inbound_message_creates_conversation() {
    let (mut session, handle) = session_with(seeded_db(&["U1"]));
    session.start(&StaticIdentity::signed_in(mentee("U1"))).unwrap();
    assert!(session.state().unwrap().conversations().messages("U5").is_empty());

    assert!(handle.deliver(message_event(
        "private-user-U1",
        json!({
            "id": "m-1",
            "senderId": "U5",
            "recipientId": "U1",
            "body": "hey there",
            "createdAt": 1_700_000_000_000i64,
        }),
    )));
    session.drain();

    let messages = session.state().unwrap().conversations().messages("U5");
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].content, "hey there");
    assert!(!messages[0].is_own);
}

#[tokio::test]
async fn test_presence_snapshot_sets_exact_online_set() {
    let (mut session, handle) = session_with(seeded_db(&["U0", "U1", "U2", "U3", "U4"]));
    session.start(&StaticIdentity::signed_in(mentee("U0"))).unwrap();
    assert_eq!(session.load_roster().await.unwrap(), 4);

    handle.deliver(TransportEvent::SubscriptionSucceeded {
        channel: "presence-chat".into(),
        members: vec!["U2".into(), "U3".into()],
    });
    session.drain();

    let presence = session.state().unwrap().presence();
    assert_eq!(presence.online_ids(), vec!["U2", "U3"]);
    assert!(!presence.is_online("U1"));
    assert!(!presence.is_online("U4"));

    handle.deliver(TransportEvent::MemberRemoved {
        channel: "presence-chat".into(),
        user_id: "U2".into(),
    });
    session.drain();
    let presence = session.state().unwrap().presence();
    assert!(!presence.is_online("U2"));
    assert!(presence.user("U2").unwrap().last_seen.is_some());
}

#[tokio::test]
async fn test_failed_send_is_marked_and_can_be_resent() {
    let backend = FlakyBackend::new(seeded_db(&["U1", "U2"]));
    backend.set_failing(true);
    let (mut session, _handle) = session_with(backend);
    session.start(&StaticIdentity::signed_in(mentee("U1"))).unwrap();

    let err = session.send_message("U2", "are you there?").await.unwrap_err();
    assert!(err.is_transient());

    let state = session.state().unwrap();
    let messages = state.conversations().messages("U2");
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].status, DeliveryStatus::Failed);
    assert!(matches!(
        state.notifications(),
        [Notification::SendFailed { counterpart_id, .. }] if counterpart_id == "U2"
    ));
    let failed_id = messages[0].id.clone();

    session.backend().set_failing(false);
    let resent = session.resend("U2", &failed_id).await.unwrap();

    let messages = session.state().unwrap().conversations().messages("U2");
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].id, resent.id);
    assert_eq!(messages[0].status, DeliveryStatus::Sent);
    assert_eq!(messages[0].content, "are you there?");
}

#[tokio::test]
async fn test_resend_rejects_sent_message() {
    let (mut session, _handle) = session_with(seeded_db(&["U1", "U2"]));
    session.start(&StaticIdentity::signed_in(mentee("U1"))).unwrap();
    let sent = session.send_message("U2", "hi").await.unwrap();

    let err = session.resend("U2", &sent.id).await.unwrap_err();
    assert_eq!(err.status_code(), 400);
    let err = session.resend("U2", "missing").await.unwrap_err();
    assert_eq!(err.status_code(), 404);
}

#[tokio::test]
async fn test_load_history_keys_by_counterpart() {
    let db = seeded_db(&["U1", "U2", "U3"]);
    let conversation = db.get_or_create_conversation("U1", "U2").await.unwrap();
    for (sender, body) in [("U1", "ping"), ("U2", "pong")] {
        db.create_message(mentor_chat::models::NewMessage {
            conversation_id: conversation.id.clone(),
            sender_id: sender.into(),
            body: body.into(),
            correlation_id: None,
        })
        .await
        .unwrap();
    }

    let (mut session, _handle) = session_with(db);
    session.start(&StaticIdentity::signed_in(mentee("U1"))).unwrap();
    session.load_roster().await.unwrap();
    session.load_history().await.unwrap();

    let conversations = session.state().unwrap().conversations();
    let messages = conversations.messages("U2");
    assert_eq!(messages.len(), 2);
    assert!(messages[0].is_own);
    assert_eq!(messages[0].recipient_id, "U2");
    assert!(!messages[1].is_own);
    assert_eq!(messages[1].recipient_id, "U1");
    assert!(conversations.messages("U3").is_empty());
}

#[tokio::test]
async fn test_set_typing_publishes_to_recipient() {
    let (mut session, handle) = session_with(seeded_db(&["U1", "U2"]));
    assert_eq!(
        session.set_typing("U2", true).unwrap_err(),
        ChatError::Unauthorized
    );

    session.start(&StaticIdentity::signed_in(mentee("U1"))).unwrap();
    session.set_typing("U2", true).unwrap();

    let triggers = handle.log().triggers;
    assert_eq!(triggers[0].channel, "private-user-U2");
    assert_eq!(triggers[0].data, json!({"user_id": "U1", "is_typing": true}));
}

#[tokio::test(start_paused = true)]
async fn test_run_loop_applies_events_and_expires_typing() {
    let (mut session, handle) = session_with(seeded_db(&["U1"]));
    session.start(&StaticIdentity::signed_in(mentee("U1"))).unwrap();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let driver = async {
        handle.deliver(TransportEvent::Event {
            channel: "private-user-U1".into(),
            event: "typing".into(),
            data: json!({"user_id": "U7", "is_typing": true}),
        });
        handle.deliver(message_event(
            "private-user-U1",
            json!({"id": "m1", "sender_id": "U7", "recipient_id": "U1", "content": "yo", "created_at": 1}),
        ));
        tokio::time::sleep(Duration::from_secs(8)).await;
        shutdown_tx.send(true).unwrap();
    };

    tokio::join!(session.run(shutdown_rx), driver);

    let state = session.state().unwrap();
    assert_eq!(state.conversations().messages("U7").len(), 1);
    assert!(state.typing().typing_users(tokio::time::Instant::now()).is_empty());
}

#[tokio::test]
async fn test_drop_tears_down_connection() {
    let (mut session, handle) = session_with(Database::open_in_memory().unwrap());
    session.start(&StaticIdentity::signed_in(mentee("U1"))).unwrap();
    assert!(handle.is_connected());
    drop(session);
    assert!(!handle.is_connected());
}
