use mentor_relay::{handle_frame, RelayFrame, RelayState};
use tokio::sync::mpsc;

#[tokio::test]
async fn test_sender_spoofing_protection() {
    let state = RelayState::new();
    let (victim_tx, mut victim_rx) = mpsc::unbounded_channel();
    state.add_client("victim".to_string(), victim_tx.clone());
    state.subscribe("private-user-victim", "victim", &victim_tx);

    let (attacker_tx, _attacker_rx) = mpsc::unbounded_channel();

    // Attacker tries to send a message as "admin"
    let spoofed = r#"{
        "type": "trigger",
        "channel": "private-user-victim",
        "event": "message",
        "data": {
            "id": "1",
            "sender_id": "admin",
            "recipient_id": "victim",
            "content": "Click this link",
            "created_at": 123
        }
    }"#;

    handle_frame(spoofed, "attacker", &attacker_tx, &state);

    let frame: RelayFrame = serde_json::from_str(&victim_rx.recv().await.unwrap()).unwrap();
    if let RelayFrame::Event {
        sender_id, data, ..
    } = frame
    {
        assert_eq!(sender_id, "attacker");
        assert_eq!(data["sender_id"], "attacker", "Spoofed sender id persisted!");
    } else {
        panic!("Expected Event");
    }
}

#[tokio::test]
async fn test_typing_identity_protection() {
    let state = RelayState::new();
    let (victim_tx, mut victim_rx) = mpsc::unbounded_channel();
    state.add_client("victim".to_string(), victim_tx.clone());
    state.subscribe("private-user-victim", "victim", &victim_tx);

    let (attacker_tx, _attacker_rx) = mpsc::unbounded_channel();
    let spoofed = r#"{
        "type": "trigger",
        "channel": "private-user-victim",
        "event": "typing",
        "data": { "user_id": "someone_else", "is_typing": true }
    }"#;

    handle_frame(spoofed, "attacker", &attacker_tx, &state);

    let frame: RelayFrame = serde_json::from_str(&victim_rx.recv().await.unwrap()).unwrap();
    if let RelayFrame::Event { data, .. } = frame {
        assert_eq!(data["user_id"], "attacker");
    } else {
        panic!("Expected Event");
    }
}

#[tokio::test]
async fn test_relay_only_events_cannot_be_triggered() {
    let state = RelayState::new();
    let (victim_tx, mut victim_rx) = mpsc::unbounded_channel();
    state.add_client("victim".to_string(), victim_tx.clone());
    state.subscribe("presence-chat", "victim", &victim_tx);

    let (attacker_tx, mut attacker_rx) = mpsc::unbounded_channel();
    let forged = r#"{
        "type": "trigger",
        "channel": "presence-chat",
        "event": "member_removed",
        "data": { "user_id": "victim" }
    }"#;

    handle_frame(forged, "attacker", &attacker_tx, &state);

    assert!(victim_rx.try_recv().is_err());
    let reply: RelayFrame = serde_json::from_str(&attacker_rx.try_recv().unwrap()).unwrap();
    assert!(matches!(reply, RelayFrame::Error { .. }));
}

#[tokio::test]
async fn test_cannot_inject_into_own_inbox() {
    let state = RelayState::new();
    let (tx, mut rx) = mpsc::unbounded_channel();
    state.add_client("user1".to_string(), tx.clone());
    state.subscribe("private-user-user1", "user1", &tx);

    let forged = r#"{
        "type": "trigger",
        "channel": "private-user-user1",
        "event": "message",
        "data": { "id": "x", "content": "fake echo" }
    }"#;
    handle_frame(forged, "user1", &tx, &state);

    let reply: RelayFrame = serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
    assert!(matches!(reply, RelayFrame::Error { .. }));
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_camel_case_sender_is_stripped() {
    let state = RelayState::new();
    let (victim_tx, mut victim_rx) = mpsc::unbounded_channel();
    state.add_client("victim".to_string(), victim_tx.clone());
    state.subscribe("private-user-victim", "victim", &victim_tx);

    let (attacker_tx, _attacker_rx) = mpsc::unbounded_channel();
    let spoofed = r#"{
        "type": "trigger",
        "channel": "private-user-victim",
        "event": "message",
        "data": { "id": "1", "senderId": "admin", "recipientId": "victim", "body": "hi", "createdAt": 1 }
    }"#;

    handle_frame(spoofed, "attacker", &attacker_tx, &state);

    let frame: RelayFrame = serde_json::from_str(&victim_rx.recv().await.unwrap()).unwrap();
    let RelayFrame::Event { data, .. } = frame else {
        panic!("Expected Event");
    };
    assert!(data.get("senderId").is_none());
    assert_eq!(data["sender_id"], "attacker");
}
