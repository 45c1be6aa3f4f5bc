use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;

/// Who is typing right now. A `true` signal lasts `ttl` unless refreshed;
/// a `false` signal clears it. Last write wins.
#[derive(Debug)]
pub struct TypingIndicators {
    ttl: Duration,
    expires_at: HashMap<String, Instant>,
}

impl TypingIndicators {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            expires_at: HashMap::new(),
        }
    }

    pub fn set(&mut self, user_id: &str, is_typing: bool, now: Instant) {
        if is_typing {
            self.expires_at.insert(user_id.to_string(), now + self.ttl);
        } else {
            self.expires_at.remove(user_id);
        }
    }

    pub fn is_typing(&self, user_id: &str, now: Instant) -> bool {
        self.expires_at
            .get(user_id)
            .map(|deadline| *deadline > now)
            .unwrap_or(false)
    }

    /// Drop expired indicators, returning the users that stopped typing
    pub fn expire(&mut self, now: Instant) -> Vec<String> {
        let mut cleared: Vec<String> = self
            .expires_at
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(user_id, _)| user_id.clone())
            .collect();
        for user_id in &cleared {
            self.expires_at.remove(user_id);
        }
        cleared.sort();
        cleared
    }

    pub fn typing_users(&self, now: Instant) -> Vec<String> {
        let mut users: Vec<String> = self
            .expires_at
            .iter()
            .filter(|(_, deadline)| **deadline > now)
            .map(|(user_id, _)| user_id.clone())
            .collect();
        users.sort();
        users
    }

    pub fn clear(&mut self) {
        self.expires_at.clear();
    }
}
