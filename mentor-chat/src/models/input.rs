//! Request DTOs with garde validation.
//!
//! Field aliases accept the camelCase names older web clients send.

use garde::Validate;
use serde::Deserialize;

use crate::error::{ChatError, ChatResult};

/// Validation constants
pub const MAX_USER_ID_LENGTH: usize = 128;
pub const MAX_CONVERSATION_ID_LENGTH: usize = 256;
pub const MAX_MESSAGE_LENGTH: usize = 10000;
pub const MAX_CORRELATION_ID_LENGTH: usize = 64;
pub const MAX_MESSAGE_ID_LENGTH: usize = 128;

fn validate_not_blank(value: &str, _ctx: &()) -> garde::Result {
    if value.trim().is_empty() {
        return Err(garde::Error::new("Message cannot be blank"));
    }
    Ok(())
}

/// Body of `POST /api/chat/messages`
#[derive(Debug, Deserialize, Validate)]
#[garde(context(()))]
pub struct SendMessageInput {
    #[serde(default, alias = "recipientId")]
    #[garde(length(min = 1, max = MAX_USER_ID_LENGTH))]
    pub recipient_id: Option<String>,
    #[serde(default, alias = "conversationId")]
    #[garde(length(min = 1, max = MAX_CONVERSATION_ID_LENGTH))]
    pub conversation_id: Option<String>,
    #[serde(alias = "body")]
    #[garde(length(min = 1, max = MAX_MESSAGE_LENGTH), custom(validate_not_blank))]
    pub content: String,
    #[serde(default, alias = "correlationId")]
    #[garde(length(min = 1, max = MAX_CORRELATION_ID_LENGTH))]
    pub correlation_id: Option<String>,
}

/// Where a message is addressed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageTarget {
    Conversation(String),
    Recipient(String),
}

impl SendMessageInput {
    /// Conversation id wins when both are given
    pub fn target(&self) -> ChatResult<MessageTarget> {
        match (&self.conversation_id, &self.recipient_id) {
            (Some(id), _) => Ok(MessageTarget::Conversation(id.clone())),
            (None, Some(id)) => Ok(MessageTarget::Recipient(id.clone())),
            (None, None) => Err(ChatError::BadRequest(
                "Missing recipientId or conversationId".to_string(),
            )),
        }
    }
}

/// Query of `GET /api/chat/messages?userId=`
#[derive(Debug, Deserialize, Validate)]
#[garde(context(()))]
pub struct MessagesQuery {
    #[serde(default, alias = "userId")]
    #[garde(length(min = 1, max = MAX_USER_ID_LENGTH))]
    pub user_id: Option<String>,
}

/// Path of `POST /api/conversation/{id}/seen`
#[derive(Debug, Deserialize, Validate)]
#[garde(context(()))]
pub struct SeenInput {
    #[serde(default, alias = "conversationId")]
    #[garde(length(min = 1, max = MAX_CONVERSATION_ID_LENGTH))]
    pub conversation_id: Option<String>,
}

/// Path of `DELETE /api/chat/messages/{id}`
#[derive(Debug, Deserialize, Validate)]
#[garde(context(()))]
pub struct DeleteMessageInput {
    #[serde(default, alias = "messageId")]
    #[garde(length(min = 1, max = MAX_MESSAGE_ID_LENGTH))]
    pub message_id: Option<String>,
}

/// Helper trait to convert garde validation errors to `ChatError`
pub trait ValidateExt {
    fn validate_input(&self) -> ChatResult<()>;
}

impl<T: Validate<Context = ()>> ValidateExt for T {
    fn validate_input(&self) -> ChatResult<()> {
        self.validate().map_err(ChatError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_message_accepts_aliases() {
        let input: SendMessageInput =
            serde_json::from_str(r#"{"conversationId":"c1","body":"hello"}"#).unwrap();
        assert!(input.validate_input().is_ok());
        assert_eq!(input.content, "hello");
        assert_eq!(input.target().unwrap(), MessageTarget::Conversation("c1".into()));

        let input: SendMessageInput =
            serde_json::from_str(r#"{"recipientId":"u2","content":"hi"}"#).unwrap();
        assert_eq!(input.target().unwrap(), MessageTarget::Recipient("u2".into()));
    }

    #[test]
    fn test_send_message_requires_target() {
        let input: SendMessageInput = serde_json::from_str(r#"{"content":"hi"}"#).unwrap();
        assert!(input.validate_input().is_ok());
        assert_eq!(input.target().unwrap_err().status_code(), 400);
    }

    #[test]
    fn test_send_message_rejects_blank_and_oversized() {
        let blank = SendMessageInput {
            recipient_id: Some("u2".into()),
            conversation_id: None,
            content: "   ".into(),
            correlation_id: None,
        };
        assert!(blank.validate_input().is_err());

        let huge = SendMessageInput {
            recipient_id: Some("u2".into()),
            conversation_id: None,
            content: "x".repeat(MAX_MESSAGE_LENGTH + 1),
            correlation_id: None,
        };
        assert!(huge.validate_input().is_err());

        let empty_recipient = SendMessageInput {
            recipient_id: Some(String::new()),
            conversation_id: None,
            content: "hi".into(),
            correlation_id: None,
        };
        assert!(empty_recipient.validate_input().is_err());
    }

    #[test]
    fn test_messages_query_optional_user() {
        let query: MessagesQuery = serde_json::from_str(r#"{"userId":"42"}"#).unwrap();
        assert!(query.validate_input().is_ok());
        assert_eq!(query.user_id.as_deref(), Some("42"));

        let query: MessagesQuery = serde_json::from_str("{}").unwrap();
        assert!(query.validate_input().is_ok());
        assert!(query.user_id.is_none());
    }
}
