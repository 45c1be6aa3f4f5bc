use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Conversation {
    pub id: String,
    pub participant_ids: Vec<String>,
    pub created_at: i64,
    pub last_message_at: Option<i64>,
}

impl Conversation {
    pub fn has_participant(&self, user_id: &str) -> bool {
        self.participant_ids.iter().any(|id| id == user_id)
    }

    /// The participant that is not `user_id`
    pub fn counterpart_of(&self, user_id: &str) -> Option<&str> {
        self.participant_ids
            .iter()
            .map(String::as_str)
            .find(|id| *id != user_id)
    }
}

/// A message as persisted by the query layer
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct StoredMessage {
    pub id: String,
    pub conversation_id: String,
    pub sender_id: String,
    pub body: String,
    pub created_at: i64,
    pub correlation_id: Option<String>,
    #[serde(default)]
    pub seen_by: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct NewMessage {
    pub conversation_id: String,
    pub sender_id: String,
    pub body: String,
    pub correlation_id: Option<String>,
}
