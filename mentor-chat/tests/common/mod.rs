#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};

use mentor_chat::models::{Conversation, NewMessage, Role, SessionUser, StoredMessage, User};
use mentor_chat::{ChatBackend, ChatError, ChatResult, Database};

pub fn session_user(id: &str, role: Role, interests: &[&str]) -> SessionUser {
    SessionUser {
        id: id.to_string(),
        name: format!("User {}", id),
        email: format!("{}@example.com", id.to_lowercase()),
        role,
        interested_in: interests.iter().map(|s| s.to_string()).collect(),
    }
}

pub fn mentee(id: &str) -> SessionUser {
    session_user(id, Role::Mentee, &["rust"])
}

/// In-memory database holding the given mentees, all interested in rust
pub fn seeded_db(ids: &[&str]) -> Database {
    let db = Database::open_in_memory().unwrap();
    for id in ids {
        let user = User {
            interested_in: vec!["rust".to_string()],
            ..User::new(*id, format!("User {}", id))
        };
        db.upsert_user(&user, Role::Mentee).unwrap();
    }
    db
}

/// Backend whose message creation fails like a dropped network call
pub struct FlakyBackend {
    pub inner: Database,
    pub fail_creates: AtomicBool,
}

impl FlakyBackend {
    pub fn new(inner: Database) -> Self {
        Self {
            inner,
            fail_creates: AtomicBool::new(false),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.fail_creates.store(failing, Ordering::SeqCst);
    }
}

impl ChatBackend for FlakyBackend {
    async fn fetch_users(&self, for_user: &SessionUser) -> ChatResult<Vec<User>> {
        self.inner.fetch_users(for_user).await
    }

    async fn find_conversation(&self, user_a: &str, user_b: &str) -> ChatResult<Option<Conversation>> {
        self.inner.find_conversation(user_a, user_b).await
    }

    async fn get_or_create_conversation(&self, user_a: &str, user_b: &str) -> ChatResult<Conversation> {
        self.inner.get_or_create_conversation(user_a, user_b).await
    }

    async fn conversation_by_id(&self, conversation_id: &str) -> ChatResult<Option<Conversation>> {
        self.inner.conversation_by_id(conversation_id).await
    }

    async fn fetch_messages(&self, conversation_id: &str) -> ChatResult<Vec<StoredMessage>> {
        self.inner.fetch_messages(conversation_id).await
    }

    async fn create_message(&self, message: NewMessage) -> ChatResult<StoredMessage> {
        if self.fail_creates.load(Ordering::SeqCst) {
            return Err(ChatError::Transient("connection reset".to_string()));
        }
        self.inner.create_message(message).await
    }

    async fn message_by_id(&self, message_id: &str) -> ChatResult<Option<StoredMessage>> {
        self.inner.message_by_id(message_id).await
    }

    async fn delete_message(&self, message_id: &str) -> ChatResult<bool> {
        self.inner.delete_message(message_id).await
    }

    async fn mark_seen(&self, conversation_id: &str, user_id: &str) -> ChatResult<Option<StoredMessage>> {
        self.inner.mark_seen(conversation_id, user_id).await
    }
}
