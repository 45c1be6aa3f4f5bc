use serde::{Deserialize, Serialize};

use super::conversation::StoredMessage;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Sending,
    Sent,
    Failed,
}

impl DeliveryStatus {
    /// Status only moves forward: sending -> sent or sending -> failed
    pub fn can_transition_to(self, next: DeliveryStatus) -> bool {
        matches!(
            (self, next),
            (DeliveryStatus::Sending, DeliveryStatus::Sent)
                | (DeliveryStatus::Sending, DeliveryStatus::Failed)
        )
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Message {
    pub id: String,
    pub sender_id: String,
    pub recipient_id: String,
    pub content: String,
    pub created_at: i64,
    /// Fixed when the message enters the store
    pub is_own: bool,
    pub status: DeliveryStatus,
    pub correlation_id: Option<String>,
}

impl Message {
    /// Build a confirmed message from a persisted record
    pub fn from_stored(stored: StoredMessage, recipient_id: &str, local_user_id: &str) -> Self {
        Self {
            is_own: stored.sender_id == local_user_id,
            id: stored.id,
            sender_id: stored.sender_id,
            recipient_id: recipient_id.to_string(),
            content: stored.body,
            created_at: stored.created_at,
            status: DeliveryStatus::Sent,
            correlation_id: stored.correlation_id,
        }
    }
}
