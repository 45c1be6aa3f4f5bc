use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::{tungstenite::Message, WebSocketStream};
use tracing::{debug, error, info, warn};

use crate::channels::{
    authorize_subscription, authorize_trigger, private_user_channel, ChannelKind, MESSAGE_EVENT,
    TYPING_EVENT,
};
use crate::messages::RelayFrame;
use crate::state::RelayState;

const AUTH_TIMEOUT_SECS: u64 = 10;

/// Handle a single WebSocket connection
pub async fn handle_connection(ws_stream: WebSocketStream<TcpStream>, state: Arc<RelayState>) {
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    // Wait for Connect message to authenticate
    let user_id = match wait_for_connect(&mut ws_receiver, state.access_token()).await {
        Ok(id) => id,
        Err(reason) => {
            warn!(reason = %reason, "Connection rejected before authentication");
            let rejection = RelayFrame::AuthResponse {
                success: false,
                message: reason,
            };
            if let Some(json) = rejection.to_json() {
                let _ = ws_sender.send(Message::Text(json.into())).await;
            }
            let _ = ws_sender.send(Message::Close(None)).await;
            return;
        }
    };

    info!(user_id = %user_id, "User connected");

    // Create channel for sending frames to this connection
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    state.add_client(user_id.clone(), tx.clone());

    let auth_response = RelayFrame::AuthResponse {
        success: true,
        message: "Connected to relay".to_string(),
    };
    if let Some(json) = auth_response.to_json() {
        if let Err(e) = ws_sender.send(Message::Text(json.into())).await {
            error!(user_id = %user_id, error = %e, "Failed to send auth response");
        }
    }

    // Spawn task to forward frames from channel to WebSocket
    let mut send_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if ws_sender.send(Message::Text(frame.into())).await.is_err() {
                break;
            }
        }
    });

    loop {
        tokio::select! {
            res = ws_receiver.next() => {
                match res {
                    Some(Ok(Message::Text(text))) => {
                        handle_frame(&text, &user_id, &tx, &state);
                    }
                    Some(Ok(Message::Close(_))) => {
                        info!(user_id = %user_id, "User sent close frame");
                        break;
                    }
                    Some(Err(e)) => {
                        error!(user_id = %user_id, error = %e, "WebSocket error");
                        break;
                    }
                    None => {
                        info!(user_id = %user_id, "WebSocket stream ended");
                        break;
                    }
                    _ => {}
                }
            }
            _ = &mut send_task => {
                info!(user_id = %user_id, "Send task finished (likely connection lost)");
                break;
            }
        }
    }

    // Cleanup
    if !send_task.is_finished() {
        send_task.abort();
        let _ = (&mut send_task).await;
    }
    drop(tx);
    state.remove_client(&user_id);
    // Only channels no other connection of this user still holds
    for channel in state.leave_closed(&user_id) {
        if ChannelKind::parse(&channel) == ChannelKind::Presence {
            announce_member_removed(&state, &channel, &user_id);
        }
    }

    info!(user_id = %user_id, "User disconnected");
}

/// Wait for the Connect frame from a new connection
async fn wait_for_connect(
    receiver: &mut futures_util::stream::SplitStream<WebSocketStream<TcpStream>>,
    access_token: Option<&str>,
) -> Result<String, String> {
    let timeout = tokio::time::timeout(std::time::Duration::from_secs(AUTH_TIMEOUT_SECS), async {
        while let Some(result) = receiver.next().await {
            let text = match result {
                Ok(Message::Text(text)) => text,
                Ok(Message::Close(_)) | Err(_) => break,
                Ok(_) => continue,
            };
            match serde_json::from_str::<RelayFrame>(&text) {
                Ok(RelayFrame::Connect { user_id, token }) => {
                    return check_credentials(user_id, token, access_token);
                }
                Ok(other) => {
                    debug!(frame = ?other, "Ignoring frame before authentication");
                }
                Err(e) => {
                    warn!(error = %e, "Failed to parse Connect frame");
                }
            }
        }
        Err("Connection closed before authentication".to_string())
    });

    match timeout.await {
        Ok(result) => result,
        Err(_) => Err("Authentication timeout".to_string()),
    }
}

fn check_credentials(
    user_id: String,
    token: Option<String>,
    access_token: Option<&str>,
) -> Result<String, String> {
    let user_id = user_id.trim().to_string();
    if user_id.is_empty() {
        return Err("User id cannot be empty".to_string());
    }
    if let Some(expected) = access_token {
        match token {
            Some(received) if received == expected => {}
            Some(_) => return Err("Invalid token".to_string()),
            None => return Err("No token provided".to_string()),
        }
    }
    Ok(user_id)
}

/// Handle a frame from an authenticated connection.
///
/// `reply` reaches only the connection the frame arrived on; channel traffic
/// goes through `state`.
pub fn handle_frame(
    text: &str,
    sender_id: &str,
    reply: &mpsc::UnboundedSender<String>,
    state: &RelayState,
) {
    let frame: RelayFrame = match serde_json::from_str(text) {
        Ok(f) => f,
        Err(e) => {
            warn!(user_id = %sender_id, error = %e, "Failed to parse frame");
            send_frame(
                reply,
                &RelayFrame::Error {
                    message: format!("Malformed frame: {}", e),
                },
            );
            return;
        }
    };

    match frame {
        RelayFrame::Subscribe { channel } => subscribe(&channel, sender_id, reply, state),
        RelayFrame::Unsubscribe { channel } => {
            if state.unsubscribe(&channel, sender_id, reply)
                && ChannelKind::parse(&channel) == ChannelKind::Presence
            {
                announce_member_removed(state, &channel, sender_id);
            }
        }
        RelayFrame::Trigger {
            channel,
            event,
            data,
        } => trigger(&channel, &event, data, sender_id, reply, state),
        RelayFrame::Connect { .. } => {
            // Already authenticated, ignore
        }
        other => {
            // Relay-only frames, ignore from clients
            debug!(user_id = %sender_id, frame = ?other, "Ignoring relay-only frame from client");
        }
    }
}

fn subscribe(
    channel: &str,
    user_id: &str,
    reply: &mpsc::UnboundedSender<String>,
    state: &RelayState,
) {
    if let Err(message) = authorize_subscription(user_id, channel) {
        warn!(user_id = %user_id, channel = %channel, "Subscription refused");
        send_frame(
            reply,
            &RelayFrame::SubscriptionError {
                channel: channel.to_string(),
                message,
            },
        );
        return;
    }

    let newly_joined = state.subscribe(channel, user_id, reply);
    let is_presence = ChannelKind::parse(channel) == ChannelKind::Presence;

    let members = if is_presence {
        state.members(channel)
    } else {
        Vec::new()
    };
    send_frame(
        reply,
        &RelayFrame::SubscriptionSucceeded {
            channel: channel.to_string(),
            members,
        },
    );
    info!(user_id = %user_id, channel = %channel, "Subscribed");

    if is_presence && newly_joined {
        let added = RelayFrame::MemberAdded {
            channel: channel.to_string(),
            user_id: user_id.to_string(),
        };
        if let Some(json) = added.to_json() {
            state.publish(channel, &json, Some(user_id));
        }
    }

    // Flush events queued while nobody was listening
    let pending = state.take_pending_events(channel);
    if !pending.is_empty() {
        info!(channel = %channel, count = pending.len(), "Delivering pending events");
        for frame in pending {
            let _ = reply.send(frame);
        }
    }
}

fn trigger(
    channel: &str,
    event: &str,
    mut data: serde_json::Value,
    sender_id: &str,
    reply: &mpsc::UnboundedSender<String>,
    state: &RelayState,
) {
    if let Err(message) = authorize_trigger(sender_id, channel, event) {
        warn!(user_id = %sender_id, channel = %channel, event = %event, "Trigger refused");
        send_frame(reply, &RelayFrame::Error { message });
        return;
    }

    // Enforce sender identity to prevent spoofing
    if let Some(payload) = data.as_object_mut() {
        let (identity_field, camel_case) = if event == TYPING_EVENT {
            ("user_id", "userId")
        } else {
            ("sender_id", "senderId")
        };
        payload.remove(camel_case);
        payload.insert(
            identity_field.to_string(),
            serde_json::Value::String(sender_id.to_string()),
        );
    }

    let delivered = RelayFrame::Event {
        channel: channel.to_string(),
        event: event.to_string(),
        sender_id: sender_id.to_string(),
        data,
    };
    let Some(json) = delivered.to_json() else {
        return;
    };

    match (ChannelKind::parse(channel), event) {
        (ChannelKind::PrivateUser(_), MESSAGE_EVENT) => {
            // Messages survive the recipient being offline
            state.publish_or_queue(channel, &json);

            // Echo to the sender's own inbox so every device can reconcile
            let own_channel = private_user_channel(sender_id);
            if let RelayFrame::Event { data, .. } = delivered {
                let echo = RelayFrame::Event {
                    channel: own_channel.clone(),
                    event: event.to_string(),
                    sender_id: sender_id.to_string(),
                    data,
                };
                if let Some(echo_json) = echo.to_json() {
                    state.publish(&own_channel, &echo_json, None);
                }
            }
        }
        (ChannelKind::PrivateUser(_), _) => {
            // Typing indicators are ephemeral - don't queue
            state.publish(channel, &json, None);
        }
        _ => {
            state.publish(channel, &json, Some(sender_id));
        }
    }
}

fn announce_member_removed(state: &RelayState, channel: &str, user_id: &str) {
    let removed = RelayFrame::MemberRemoved {
        channel: channel.to_string(),
        user_id: user_id.to_string(),
    };
    if let Some(json) = removed.to_json() {
        state.publish(channel, &json, Some(user_id));
    }
}

fn send_frame(reply: &mpsc::UnboundedSender<String>, frame: &RelayFrame) {
    if let Some(json) = frame.to_json() {
        let _ = reply.send(json);
    }
}
