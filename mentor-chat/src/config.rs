use std::path::PathBuf;
use std::time::Duration;

use tracing::{info, warn};
use url::Url;

use crate::error::{ChatError, ChatResult};

const DEFAULT_RELAY_URL: &str = "ws://localhost:9001";
pub const DEFAULT_PRESENCE_CHANNEL: &str = "presence-chat";
const DEFAULT_TYPING_TTL_MS: u64 = 5000;
const DEFAULT_RECONNECT_DELAY_MS: u64 = 3000;

/// Client settings
#[derive(Debug, Clone)]
pub struct ChatConfig {
    pub relay_url: String,
    pub access_token: Option<String>,
    pub presence_channel: String,
    /// How long a typing signal stays visible without a refresh
    pub typing_ttl: Duration,
    pub reconnect_delay: Duration,
    /// In-memory database when unset
    pub database_path: Option<PathBuf>,
    pub log_dir: Option<PathBuf>,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            relay_url: DEFAULT_RELAY_URL.to_string(),
            access_token: None,
            presence_channel: DEFAULT_PRESENCE_CHANNEL.to_string(),
            typing_ttl: Duration::from_millis(DEFAULT_TYPING_TTL_MS),
            reconnect_delay: Duration::from_millis(DEFAULT_RECONNECT_DELAY_MS),
            database_path: None,
            log_dir: None,
        }
    }
}

impl ChatConfig {
    /// Load `.env` (if present), then `MENTOR_*` variables, then defaults
    pub fn from_env() -> ChatResult<Self> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> ChatResult<Self> {
        // Priority: build-time env -> runtime env -> default
        let build_time_url = option_env!("MENTOR_RELAY_URL");
        let runtime_url = lookup("MENTOR_RELAY_URL");
        let relay_url = build_time_url
            .map(String::from)
            .or(runtime_url)
            .unwrap_or_else(|| DEFAULT_RELAY_URL.to_string());
        validate_relay_url(&relay_url)?;
        info!(url = %relay_url, "Using relay URL");

        let config = Self {
            relay_url,
            access_token: lookup("MENTOR_ACCESS_TOKEN").filter(|t| !t.is_empty()),
            presence_channel: lookup("MENTOR_PRESENCE_CHANNEL")
                .filter(|c| !c.is_empty())
                .unwrap_or_else(|| DEFAULT_PRESENCE_CHANNEL.to_string()),
            typing_ttl: millis_or_default(&lookup, "MENTOR_TYPING_TTL_MS", DEFAULT_TYPING_TTL_MS),
            reconnect_delay: millis_or_default(
                &lookup,
                "MENTOR_RECONNECT_DELAY_MS",
                DEFAULT_RECONNECT_DELAY_MS,
            ),
            database_path: lookup("MENTOR_DATABASE_PATH").map(PathBuf::from),
            log_dir: lookup("MENTOR_LOG_DIR").map(PathBuf::from),
        };
        Ok(config)
    }
}

fn millis_or_default(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: u64) -> Duration {
    let millis = match lookup(key) {
        Some(raw) => raw.parse().unwrap_or_else(|e| {
            warn!(key = %key, value = %raw, error = %e, "Invalid duration, using default");
            default
        }),
        None => default,
    };
    Duration::from_millis(millis)
}

/// The relay speaks WebSocket only
pub fn validate_relay_url(raw: &str) -> ChatResult<()> {
    let parsed = Url::parse(raw).map_err(|e| ChatError::Config(format!("{}: {}", raw, e)))?;
    match parsed.scheme() {
        "ws" | "wss" => Ok(()),
        other => Err(ChatError::Config(format!(
            "Relay URL must use ws or wss, got {}",
            other
        ))),
    }
}
