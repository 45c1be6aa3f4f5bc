//! Channel names, event payloads and the decoding of transport events into
//! chat events.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::models::{DeliveryStatus, Message};
use crate::transport::TransportEvent;

pub const MESSAGE_EVENT: &str = "message";
pub const TYPING_EVENT: &str = "typing";
pub const SUBSCRIPTION_SUCCEEDED: &str = "subscription_succeeded";
pub const MEMBER_ADDED: &str = "member_added";
pub const MEMBER_REMOVED: &str = "member_removed";

const PRIVATE_USER_PREFIX: &str = "private-user-";

/// Inbox channel of a user
pub fn private_user_channel(user_id: &str) -> String {
    format!("{}{}", PRIVATE_USER_PREFIX, user_id)
}

/// Payload of a `message` event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessagePayload {
    pub id: String,
    #[serde(alias = "senderId")]
    pub sender_id: String,
    #[serde(alias = "recipientId")]
    pub recipient_id: String,
    #[serde(alias = "body")]
    pub content: String,
    #[serde(alias = "createdAt")]
    pub created_at: i64,
    #[serde(default, alias = "correlationId", skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

impl MessagePayload {
    pub fn from_message(message: &Message) -> Self {
        Self {
            id: message.id.clone(),
            sender_id: message.sender_id.clone(),
            recipient_id: message.recipient_id.clone(),
            content: message.content.clone(),
            created_at: message.created_at,
            correlation_id: message.correlation_id.clone(),
        }
    }

    /// Ownership is derived by the store on insertion
    pub fn into_message(self) -> Message {
        Message {
            id: self.id,
            sender_id: self.sender_id,
            recipient_id: self.recipient_id,
            content: self.content,
            created_at: self.created_at,
            is_own: false,
            status: DeliveryStatus::Sent,
            correlation_id: self.correlation_id,
        }
    }
}

/// Payload of a `typing` event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypingPayload {
    #[serde(alias = "userId")]
    pub user_id: String,
    #[serde(alias = "isTyping")]
    pub is_typing: bool,
}

/// Everything that can change chat state from the outside
#[derive(Debug, Clone, PartialEq)]
pub enum ChatEvent {
    PresenceSnapshot(Vec<String>),
    MemberAdded(String),
    MemberRemoved(String),
    MessageReceived(MessagePayload),
    Typing { user_id: String, is_typing: bool },
}

impl ChatEvent {
    /// Map a transport event to a chat event. Unknown or malformed events
    /// are logged and dropped.
    pub fn decode(event: TransportEvent, presence_channel: &str) -> Option<ChatEvent> {
        match event {
            TransportEvent::SubscriptionSucceeded { channel, members } => {
                if channel == presence_channel {
                    Some(ChatEvent::PresenceSnapshot(members))
                } else {
                    debug!(channel = %channel, "Subscribed");
                    None
                }
            }
            TransportEvent::MemberAdded { channel, user_id } if channel == presence_channel => {
                Some(ChatEvent::MemberAdded(user_id))
            }
            TransportEvent::MemberRemoved { channel, user_id } if channel == presence_channel => {
                Some(ChatEvent::MemberRemoved(user_id))
            }
            TransportEvent::MemberAdded { channel, .. }
            | TransportEvent::MemberRemoved { channel, .. } => {
                debug!(channel = %channel, "Ignoring membership change outside presence channel");
                None
            }
            TransportEvent::Event {
                channel,
                event,
                data,
            } => match event.as_str() {
                MESSAGE_EVENT => match serde_json::from_value::<MessagePayload>(data) {
                    Ok(payload) => Some(ChatEvent::MessageReceived(payload)),
                    Err(e) => {
                        warn!(channel = %channel, error = %e, "Malformed message event");
                        None
                    }
                },
                TYPING_EVENT => match serde_json::from_value::<TypingPayload>(data) {
                    Ok(payload) => Some(ChatEvent::Typing {
                        user_id: payload.user_id,
                        is_typing: payload.is_typing,
                    }),
                    Err(e) => {
                        warn!(channel = %channel, error = %e, "Malformed typing event");
                        None
                    }
                },
                other => {
                    debug!(channel = %channel, event = %other, "Ignoring unknown event");
                    None
                }
            },
        }
    }
}
