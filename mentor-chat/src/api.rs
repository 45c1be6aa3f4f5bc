//! Handlers behind the chat HTTP surface.
//!
//! Each handler resolves the caller through an `IdentityProvider`, works
//! against a `ChatBackend` and returns a `ChatResult`. `respond` turns the
//! result into a status code and JSON body for whatever server hosts them.

use serde::Serialize;
use tracing::{error, info, warn};

use crate::backend::ChatBackend;
use crate::error::{ChatError, ChatResult};
use crate::identity::IdentityProvider;
use crate::models::input::{
    DeleteMessageInput, MessageTarget, MessagesQuery, SeenInput, SendMessageInput, ValidateExt,
};
use crate::models::{NewMessage, Role, SessionUser, StoredMessage, User};
use crate::rate_limit::RateLimiter;

fn require_user<I: IdentityProvider>(identity: &I) -> ChatResult<SessionUser> {
    identity.current_user().ok_or(ChatError::Unauthorized)
}

fn require_mentee(user: &SessionUser) -> ChatResult<()> {
    if user.role != Role::Mentee {
        warn!(user_id = %user.id, role = user.role.as_str(), "Chat access refused for role");
        return Err(ChatError::Forbidden);
    }
    Ok(())
}

/// `GET /api/chat/users`
pub async fn get_chat_users<I, B>(identity: &I, backend: &B) -> ChatResult<Vec<User>>
where
    I: IdentityProvider,
    B: ChatBackend,
{
    let user = require_user(identity)?;
    backend.fetch_users(&user).await
}

/// `GET /api/chat/messages?userId=`
pub async fn get_chat_messages<I, B>(
    identity: &I,
    backend: &B,
    query: MessagesQuery,
) -> ChatResult<Vec<StoredMessage>>
where
    I: IdentityProvider,
    B: ChatBackend,
{
    let user = require_user(identity)?;
    require_mentee(&user)?;
    query.validate_input()?;

    let target = query
        .user_id
        .ok_or_else(|| ChatError::BadRequest("Missing userId".to_string()))?;
    let conversation = backend
        .find_conversation(&user.id, &target)
        .await?
        .ok_or_else(|| ChatError::NotFound("Conversation".to_string()))?;

    backend.fetch_messages(&conversation.id).await
}

/// `POST /api/chat/messages`
pub async fn post_chat_message<I, B>(
    identity: &I,
    backend: &B,
    limiter: &RateLimiter,
    input: SendMessageInput,
) -> ChatResult<StoredMessage>
where
    I: IdentityProvider,
    B: ChatBackend,
{
    let user = require_user(identity)?;
    limiter.check(&user.id).into_result()?;
    require_mentee(&user)?;
    input.validate_input()?;

    let conversation = match input.target()? {
        MessageTarget::Conversation(id) => {
            let conversation = backend
                .conversation_by_id(&id)
                .await?
                .ok_or_else(|| ChatError::NotFound("Conversation".to_string()))?;
            if !conversation.has_participant(&user.id) {
                warn!(user_id = %user.id, conversation_id = %id, "Not a participant");
                return Err(ChatError::Forbidden);
            }
            conversation
        }
        MessageTarget::Recipient(recipient_id) => {
            if recipient_id == user.id {
                return Err(ChatError::BadRequest(
                    "Cannot send a message to yourself".to_string(),
                ));
            }
            backend
                .get_or_create_conversation(&user.id, &recipient_id)
                .await?
        }
    };

    let created = backend
        .create_message(NewMessage {
            conversation_id: conversation.id,
            sender_id: user.id,
            body: input.content,
            correlation_id: input.correlation_id,
        })
        .await?;
    info!(message_id = %created.id, conversation_id = %created.conversation_id, "Message created");
    Ok(created)
}

/// `POST /api/conversation/{id}/seen`. `None` when the conversation has no
/// messages yet.
pub async fn mark_conversation_seen<I, B>(
    identity: &I,
    backend: &B,
    input: SeenInput,
) -> ChatResult<Option<StoredMessage>>
where
    I: IdentityProvider,
    B: ChatBackend,
{
    let user = require_user(identity)?;
    input.validate_input()?;

    let conversation_id = input
        .conversation_id
        .ok_or_else(|| ChatError::BadRequest("Missing conversationId".to_string()))?;
    let conversation = backend
        .conversation_by_id(&conversation_id)
        .await?
        .ok_or_else(|| ChatError::NotFound("Conversation".to_string()))?;
    if !conversation.has_participant(&user.id) {
        return Err(ChatError::Forbidden);
    }

    backend.mark_seen(&conversation.id, &user.id).await
}

/// `DELETE /api/chat/messages/{id}`. Only the sender may delete.
pub async fn delete_chat_message<I, B>(
    identity: &I,
    backend: &B,
    input: DeleteMessageInput,
) -> ChatResult<StoredMessage>
where
    I: IdentityProvider,
    B: ChatBackend,
{
    let user = require_user(identity)?;
    input.validate_input()?;

    let message_id = input
        .message_id
        .ok_or_else(|| ChatError::BadRequest("Missing messageId".to_string()))?;
    let message = backend
        .message_by_id(&message_id)
        .await?
        .ok_or_else(|| ChatError::NotFound("Message".to_string()))?;
    if message.sender_id != user.id {
        return Err(ChatError::Forbidden);
    }

    backend.delete_message(&message.id).await?;
    info!(message_id = %message.id, "Message deleted");
    Ok(message)
}

/// Status code and JSON body for a handler result
pub fn respond<T: Serialize>(result: ChatResult<T>) -> (u16, serde_json::Value) {
    match result {
        Ok(value) => match serde_json::to_value(value) {
            Ok(body) => (200, body),
            Err(e) => respond::<()>(Err(ChatError::Internal(e.to_string()))),
        },
        Err(e) => {
            if e.status_code() >= 500 {
                error!(error = %e, "Request failed");
            }
            (e.status_code(), e.response_body())
        }
    }
}
