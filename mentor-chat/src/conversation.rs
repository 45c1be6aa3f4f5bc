//! Per-counterpart message sequences.
//!
//! Sequences are kept in arrival order. `append` is a raw push; `receive` and
//! `confirm` reconcile optimistic entries with their server copies so ids stay
//! unique within a sequence.

use std::collections::{HashMap, HashSet};

use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::{DeliveryStatus, Message};

const LOCAL_ID_PREFIX: &str = "local-";

#[derive(Debug)]
pub struct ConversationStore {
    local_user_id: String,
    conversations: HashMap<String, Vec<Message>>,
}

impl ConversationStore {
    pub fn new(local_user_id: impl Into<String>) -> Self {
        Self {
            local_user_id: local_user_id.into(),
            conversations: HashMap::new(),
        }
    }

    pub fn local_user_id(&self) -> &str {
        &self.local_user_id
    }

    /// Messages exchanged with `counterpart_id`, oldest first
    pub fn messages(&self, counterpart_id: &str) -> &[Message] {
        self.conversations
            .get(counterpart_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn counterparts(&self) -> impl Iterator<Item = &str> {
        self.conversations.keys().map(String::as_str)
    }

    pub fn find(&self, counterpart_id: &str, message_id: &str) -> Option<&Message> {
        self.messages(counterpart_id)
            .iter()
            .find(|m| m.id == message_id)
    }

    /// Replace the whole map, e.g. after the initial history fetch.
    /// Duplicate ids within a sequence keep their first occurrence.
    pub fn replace_all(&mut self, conversations: HashMap<String, Vec<Message>>) {
        self.conversations = conversations
            .into_iter()
            .map(|(counterpart, messages)| {
                let mut seen = HashSet::new();
                let messages = messages
                    .into_iter()
                    .filter(|m| seen.insert(m.id.clone()))
                    .map(|m| self.owned(m))
                    .collect();
                (counterpart, messages)
            })
            .collect();
    }

    /// Push to the end of a sequence, creating it if absent. No deduplication.
    pub fn append(&mut self, counterpart_id: &str, message: Message) {
        let message = self.owned(message);
        self.conversations
            .entry(counterpart_id.to_string())
            .or_default()
            .push(message);
    }

    /// Create and append a `Sending` message for a local send
    pub fn insert_optimistic(&mut self, counterpart_id: &str, content: &str, now_ms: i64) -> Message {
        let correlation_id = Uuid::new_v4().to_string();
        let message = Message {
            id: format!("{}{}", LOCAL_ID_PREFIX, correlation_id),
            sender_id: self.local_user_id.clone(),
            recipient_id: counterpart_id.to_string(),
            content: content.to_string(),
            created_at: now_ms,
            is_own: true,
            status: DeliveryStatus::Sending,
            correlation_id: Some(correlation_id),
        };
        self.append(counterpart_id, message.clone());
        message
    }

    /// Swap the optimistic entry for its confirmed copy, in place.
    /// If the confirmed id is already present the optimistic entry is dropped.
    pub fn confirm(&mut self, counterpart_id: &str, correlation_id: &str, confirmed: Message) -> bool {
        let mut confirmed = self.owned(confirmed);
        confirmed.status = DeliveryStatus::Sent;
        confirmed.correlation_id = Some(correlation_id.to_string());

        let Some(messages) = self.conversations.get_mut(counterpart_id) else {
            return false;
        };
        let Some(pos) = messages
            .iter()
            .position(|m| m.correlation_id.as_deref() == Some(correlation_id))
        else {
            return false;
        };

        if messages
            .iter()
            .enumerate()
            .any(|(i, m)| i != pos && m.id == confirmed.id)
        {
            messages.remove(pos);
        } else {
            messages[pos] = confirmed;
        }
        true
    }

    /// Deliver a message from the channel. Replaces an entry from the same
    /// sender with the same correlation id or id, otherwise appends. A message
    /// reusing the id of another sender's entry is dropped.
    pub fn receive(&mut self, counterpart_id: &str, message: Message) {
        let message = self.owned(message);
        let messages = self
            .conversations
            .entry(counterpart_id.to_string())
            .or_default();

        let existing = message
            .correlation_id
            .as_deref()
            .and_then(|corr| {
                messages
                    .iter()
                    .position(|m| m.correlation_id.as_deref() == Some(corr))
            })
            .or_else(|| messages.iter().position(|m| m.id == message.id));

        match existing {
            Some(pos) if messages[pos].sender_id != message.sender_id => {
                warn!(
                    message_id = %message.id,
                    sender_id = %message.sender_id,
                    "Dropping message that collides with another sender's entry"
                );
            }
            Some(pos) => {
                debug!(message_id = %message.id, "Reconciled delivered message");
                // A failed entry was never confirmed; keep it failed
                let status = match messages[pos].status {
                    DeliveryStatus::Failed => DeliveryStatus::Failed,
                    _ => DeliveryStatus::Sent,
                };
                let merged = Message { status, ..message };
                // Drop any other entry already carrying the server id
                let id = merged.id.clone();
                let sender_id = merged.sender_id.clone();
                messages[pos] = merged;
                let mut index = 0;
                messages.retain(|m| {
                    let keep = index == pos || m.id != id || m.sender_id != sender_id;
                    index += 1;
                    keep
                });
            }
            None => messages.push(Message {
                status: DeliveryStatus::Sent,
                ..message
            }),
        }
    }

    /// `Sending -> Failed` for the optimistic entry with this correlation id
    pub fn mark_failed(&mut self, counterpart_id: &str, correlation_id: &str) -> bool {
        self.conversations
            .get_mut(counterpart_id)
            .and_then(|messages| {
                messages
                    .iter_mut()
                    .find(|m| m.correlation_id.as_deref() == Some(correlation_id))
            })
            .filter(|m| m.status.can_transition_to(DeliveryStatus::Failed))
            .map(|m| m.status = DeliveryStatus::Failed)
            .is_some()
    }

    pub fn remove(&mut self, counterpart_id: &str, message_id: &str) -> Option<Message> {
        let messages = self.conversations.get_mut(counterpart_id)?;
        let pos = messages.iter().position(|m| m.id == message_id)?;
        Some(messages.remove(pos))
    }

    pub fn clear(&mut self) {
        self.conversations.clear();
    }

    fn owned(&self, mut message: Message) -> Message {
        message.is_own = message.sender_id == self.local_user_id;
        message
    }
}
