//! Owned chat state for one session.
//!
//! `ChatState` is created when a session connects and dropped when it
//! disconnects. Every inbound event goes through `apply`.

use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;
use tracing::debug;

use crate::conversation::ConversationStore;
use crate::events::ChatEvent;
use crate::presence::PresenceTracker;
use crate::typing::TypingIndicators;

/// Non-blocking notice for the UI
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notification {
    SendFailed {
        counterpart_id: String,
        correlation_id: String,
        reason: String,
    },
}

#[derive(Debug)]
pub struct ChatState {
    presence: PresenceTracker,
    conversations: ConversationStore,
    typing: TypingIndicators,
    notifications: Vec<Notification>,
    selected: Option<String>,
}

impl ChatState {
    pub fn new(local_user_id: impl Into<String>, typing_ttl: Duration) -> Self {
        Self {
            presence: PresenceTracker::default(),
            conversations: ConversationStore::new(local_user_id),
            typing: TypingIndicators::new(typing_ttl),
            notifications: Vec::new(),
            selected: None,
        }
    }

    pub fn local_user_id(&self) -> &str {
        self.conversations.local_user_id()
    }

    pub fn presence(&self) -> &PresenceTracker {
        &self.presence
    }

    pub fn presence_mut(&mut self) -> &mut PresenceTracker {
        &mut self.presence
    }

    pub fn conversations(&self) -> &ConversationStore {
        &self.conversations
    }

    pub fn conversations_mut(&mut self) -> &mut ConversationStore {
        &mut self.conversations
    }

    pub fn typing(&self) -> &TypingIndicators {
        &self.typing
    }

    /// Counterpart whose conversation is open
    pub fn selected(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    pub fn select(&mut self, counterpart_id: Option<&str>) {
        self.selected = counterpart_id.map(str::to_string);
    }

    /// State transition for one inbound event
    pub fn apply(&mut self, event: ChatEvent, now: Instant, now_ms: i64) {
        match event {
            ChatEvent::PresenceSnapshot(members) => {
                self.presence.apply_snapshot(&members, now_ms);
            }
            ChatEvent::MemberAdded(user_id) => self.presence.member_added(&user_id),
            ChatEvent::MemberRemoved(user_id) => self.presence.member_removed(&user_id, now_ms),
            ChatEvent::MessageReceived(payload) => {
                // Our own send comes back on our channel as the echo
                let counterpart = if payload.sender_id == self.local_user_id() {
                    payload.recipient_id.clone()
                } else {
                    payload.sender_id.clone()
                };
                self.conversations.receive(&counterpart, payload.into_message());
            }
            ChatEvent::Typing { user_id, is_typing } => {
                if user_id == self.local_user_id() {
                    debug!("Ignoring own typing signal");
                    return;
                }
                self.typing.set(&user_id, is_typing, now);
            }
        }
    }

    /// Clear expired typing indicators
    pub fn sweep_typing(&mut self, now: Instant) -> Vec<String> {
        self.typing.expire(now)
    }

    pub fn notify(&mut self, notification: Notification) {
        self.notifications.push(notification);
    }

    pub fn notifications(&self) -> &[Notification] {
        &self.notifications
    }

    pub fn take_notifications(&mut self) -> Vec<Notification> {
        std::mem::take(&mut self.notifications)
    }
}
