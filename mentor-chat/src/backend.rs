//! Persistence/query collaborator.

use crate::error::ChatResult;
use crate::models::{Conversation, NewMessage, SessionUser, StoredMessage, User};

#[allow(async_fn_in_trait)]
pub trait ChatBackend {
    /// Mentees sharing at least one interest with `for_user`, excluding them
    async fn fetch_users(&self, for_user: &SessionUser) -> ChatResult<Vec<User>>;

    async fn find_conversation(&self, user_a: &str, user_b: &str) -> ChatResult<Option<Conversation>>;

    async fn get_or_create_conversation(&self, user_a: &str, user_b: &str) -> ChatResult<Conversation>;

    async fn conversation_by_id(&self, conversation_id: &str) -> ChatResult<Option<Conversation>>;

    /// Oldest first
    async fn fetch_messages(&self, conversation_id: &str) -> ChatResult<Vec<StoredMessage>>;

    async fn create_message(&self, message: NewMessage) -> ChatResult<StoredMessage>;

    async fn message_by_id(&self, message_id: &str) -> ChatResult<Option<StoredMessage>>;

    /// Returns false when no such message existed
    async fn delete_message(&self, message_id: &str) -> ChatResult<bool>;

    /// Mark the last message of the conversation seen by `user_id`.
    /// `None` when the conversation has no messages.
    async fn mark_seen(&self, conversation_id: &str, user_id: &str) -> ChatResult<Option<StoredMessage>>;
}
