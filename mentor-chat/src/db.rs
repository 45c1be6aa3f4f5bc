use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};
use uuid::Uuid;

use crate::backend::ChatBackend;
use crate::error::{ChatError, ChatResult};
use crate::models::{Conversation, NewMessage, Role, SessionUser, StoredMessage, User};
use crate::utils::{conversation_id, now_millis};

pub struct Database(pub Mutex<Connection>);

impl Database {
    pub fn open(path: &Path) -> ChatResult<Self> {
        let conn = Connection::open(path)?;
        info!(path = %path.display(), "Opened chat database");
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> ChatResult<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    /// File-backed when a path is configured, in memory otherwise
    pub fn open_configured(path: Option<&Path>) -> ChatResult<Self> {
        match path {
            Some(path) => Self::open(path),
            None => Self::open_in_memory(),
        }
    }

    fn with_connection(conn: Connection) -> ChatResult<Self> {
        init_schema(&conn)?;
        Ok(Self(Mutex::new(conn)))
    }

    fn conn(&self) -> ChatResult<MutexGuard<'_, Connection>> {
        self.0
            .lock()
            .map_err(|e| ChatError::Database(format!("Lock poisoned: {}", e)))
    }

    pub fn upsert_user(&self, user: &User, role: Role) -> ChatResult<()> {
        let interests = serde_json::to_string(&user.interested_in)
            .map_err(|e| ChatError::Internal(e.to_string()))?;
        self.conn()?.execute(
            "INSERT INTO users (id, name, avatar_url, role, interested_in)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                avatar_url = excluded.avatar_url,
                role = excluded.role,
                interested_in = excluded.interested_in",
            params![user.id, user.name, user.avatar_url, role.as_str(), interests],
        )?;
        Ok(())
    }
}

fn init_schema(conn: &Connection) -> ChatResult<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            avatar_url TEXT,
            role TEXT CHECK(role IN ('MENTEE', 'MENTOR')) NOT NULL,
            interested_in TEXT NOT NULL DEFAULT '[]'
        );

        CREATE TABLE IF NOT EXISTS conversations (
            id TEXT PRIMARY KEY,
            created_at INTEGER NOT NULL,
            last_message_at INTEGER
        );

        CREATE TABLE IF NOT EXISTS conversation_participants (
            conversation_id TEXT REFERENCES conversations(id),
            user_id TEXT NOT NULL,
            PRIMARY KEY (conversation_id, user_id)
        );

        CREATE TABLE IF NOT EXISTS messages (
            id TEXT PRIMARY KEY,
            conversation_id TEXT REFERENCES conversations(id),
            sender_id TEXT NOT NULL,
            body TEXT NOT NULL,
            correlation_id TEXT,
            created_at INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS message_seen (
            message_id TEXT REFERENCES messages(id) ON DELETE CASCADE,
            user_id TEXT NOT NULL,
            PRIMARY KEY (message_id, user_id)
        );

        CREATE INDEX IF NOT EXISTS idx_messages_conversation_id ON messages(conversation_id);
        CREATE INDEX IF NOT EXISTS idx_messages_created_at ON messages(created_at);
        CREATE INDEX IF NOT EXISTS idx_participants_user_id ON conversation_participants(user_id);
        ",
    )?;
    Ok(())
}

fn load_conversation(conn: &Connection, id: &str) -> ChatResult<Option<Conversation>> {
    let Some((created_at, last_message_at)) = conn
        .query_row(
            "SELECT created_at, last_message_at FROM conversations WHERE id = ?1",
            [id],
            |row| Ok((row.get::<_, i64>(0)?, row.get::<_, Option<i64>>(1)?)),
        )
        .optional()?
    else {
        return Ok(None);
    };

    let mut stmt = conn.prepare(
        "SELECT user_id FROM conversation_participants WHERE conversation_id = ?1 ORDER BY user_id",
    )?;
    let participant_ids = stmt
        .query_map([id], |row| row.get(0))?
        .collect::<Result<Vec<String>, _>>()?;

    Ok(Some(Conversation {
        id: id.to_string(),
        participant_ids,
        created_at,
        last_message_at,
    }))
}

fn load_seen(conn: &Connection, message_id: &str) -> ChatResult<Vec<String>> {
    let mut stmt =
        conn.prepare("SELECT user_id FROM message_seen WHERE message_id = ?1 ORDER BY user_id")?;
    let seen = stmt
        .query_map([message_id], |row| row.get(0))?
        .collect::<Result<Vec<String>, _>>()?;
    Ok(seen)
}

const MESSAGE_COLUMNS: &str = "id, conversation_id, sender_id, body, created_at, correlation_id";

fn message_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<StoredMessage> {
    Ok(StoredMessage {
        id: row.get(0)?,
        conversation_id: row.get(1)?,
        sender_id: row.get(2)?,
        body: row.get(3)?,
        created_at: row.get(4)?,
        correlation_id: row.get(5)?,
        seen_by: Vec::new(),
    })
}

fn load_message(conn: &Connection, message_id: &str) -> ChatResult<Option<StoredMessage>> {
    let message = conn
        .query_row(
            &format!("SELECT {} FROM messages WHERE id = ?1", MESSAGE_COLUMNS),
            [message_id],
            message_from_row,
        )
        .optional()?;
    match message {
        Some(mut message) => {
            message.seen_by = load_seen(conn, &message.id)?;
            Ok(Some(message))
        }
        None => Ok(None),
    }
}

impl ChatBackend for Database {
    async fn fetch_users(&self, for_user: &SessionUser) -> ChatResult<Vec<User>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, name, avatar_url, interested_in FROM users
             WHERE role = 'MENTEE' AND id != ?1
             ORDER BY name, id",
        )?;
        let rows = stmt
            .query_map([&for_user.id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let users = rows
            .into_iter()
            .filter_map(|(id, name, avatar_url, interests)| {
                let interested_in: Vec<String> = serde_json::from_str(&interests).unwrap_or_default();
                let shared = interested_in
                    .iter()
                    .any(|tag| for_user.interested_in.contains(tag));
                shared.then(|| User {
                    avatar_url,
                    interested_in,
                    ..User::new(id, name)
                })
            })
            .collect();
        Ok(users)
    }

    async fn find_conversation(&self, user_a: &str, user_b: &str) -> ChatResult<Option<Conversation>> {
        let conn = self.conn()?;
        load_conversation(&conn, &conversation_id(user_a, user_b))
    }

    async fn get_or_create_conversation(&self, user_a: &str, user_b: &str) -> ChatResult<Conversation> {
        let id = conversation_id(user_a, user_b);
        let conn = self.conn()?;
        if let Some(existing) = load_conversation(&conn, &id)? {
            return Ok(existing);
        }

        conn.execute(
            "INSERT INTO conversations (id, created_at) VALUES (?1, ?2)",
            params![id, now_millis()],
        )?;
        for user_id in [user_a, user_b] {
            conn.execute(
                "INSERT OR IGNORE INTO conversation_participants (conversation_id, user_id) VALUES (?1, ?2)",
                params![id, user_id],
            )?;
        }
        debug!(conversation_id = %id, "Created conversation");

        load_conversation(&conn, &id)?
            .ok_or_else(|| ChatError::Database("Conversation vanished after insert".to_string()))
    }

    async fn conversation_by_id(&self, conversation_id: &str) -> ChatResult<Option<Conversation>> {
        let conn = self.conn()?;
        load_conversation(&conn, conversation_id)
    }

    async fn fetch_messages(&self, conversation_id: &str) -> ChatResult<Vec<StoredMessage>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM messages WHERE conversation_id = ?1 ORDER BY created_at ASC, rowid ASC",
            MESSAGE_COLUMNS
        ))?;
        let mut messages = stmt
            .query_map([conversation_id], message_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        for message in messages.iter_mut() {
            message.seen_by = load_seen(&conn, &message.id)?;
        }
        Ok(messages)
    }

    async fn create_message(&self, message: NewMessage) -> ChatResult<StoredMessage> {
        let conn = self.conn()?;
        if load_conversation(&conn, &message.conversation_id)?.is_none() {
            return Err(ChatError::NotFound("Conversation".to_string()));
        }

        let id = Uuid::new_v4().to_string();
        let created_at = now_millis();
        conn.execute(
            "INSERT INTO messages (id, conversation_id, sender_id, body, correlation_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                id,
                message.conversation_id,
                message.sender_id,
                message.body,
                message.correlation_id,
                created_at
            ],
        )?;
        // The sender has seen their own message
        conn.execute(
            "INSERT OR IGNORE INTO message_seen (message_id, user_id) VALUES (?1, ?2)",
            [&id, &message.sender_id],
        )?;
        conn.execute(
            "UPDATE conversations SET last_message_at = ?1 WHERE id = ?2",
            params![created_at, message.conversation_id],
        )?;

        Ok(StoredMessage {
            id,
            conversation_id: message.conversation_id,
            sender_id: message.sender_id.clone(),
            body: message.body,
            created_at,
            correlation_id: message.correlation_id,
            seen_by: vec![message.sender_id],
        })
    }

    async fn message_by_id(&self, message_id: &str) -> ChatResult<Option<StoredMessage>> {
        let conn = self.conn()?;
        load_message(&conn, message_id)
    }

    async fn delete_message(&self, message_id: &str) -> ChatResult<bool> {
        let conn = self.conn()?;
        conn.execute("DELETE FROM message_seen WHERE message_id = ?1", [message_id])?;
        let deleted = conn.execute("DELETE FROM messages WHERE id = ?1", [message_id])?;
        Ok(deleted > 0)
    }

    async fn mark_seen(&self, conversation_id: &str, user_id: &str) -> ChatResult<Option<StoredMessage>> {
        let conn = self.conn()?;
        let last_id: Option<String> = conn
            .query_row(
                "SELECT id FROM messages WHERE conversation_id = ?1
                 ORDER BY created_at DESC, rowid DESC LIMIT 1",
                [conversation_id],
                |row| row.get(0),
            )
            .optional()?;
        let Some(last_id) = last_id else {
            return Ok(None);
        };

        conn.execute(
            "INSERT OR IGNORE INTO message_seen (message_id, user_id) VALUES (?1, ?2)",
            params![last_id, user_id],
        )?;
        load_message(&conn, &last_id)
    }
}
