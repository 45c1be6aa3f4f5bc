use sha2::{Digest, Sha256};

/// Conversation id shared by both participants, whoever starts it
pub fn conversation_id(user_id_1: &str, user_id_2: &str) -> String {
    let mut ids = [user_id_1, user_id_2];
    ids.sort();
    let mut hasher = Sha256::new();
    hasher.update(ids[0].as_bytes());
    hasher.update([0u8]);
    hasher.update(ids[1].as_bytes());
    hex::encode(hasher.finalize())
}

/// Current time in Unix milliseconds
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
