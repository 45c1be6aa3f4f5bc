use tracing::warn;

use crate::state::DEFAULT_MAX_PENDING_PER_CHANNEL;

const DEFAULT_ADDR: &str = "0.0.0.0:9001";
const DEFAULT_LOG_FILTER: &str = "info";

/// Relay settings, read from the environment
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub addr: String,
    pub access_token: Option<String>,
    pub max_pending: usize,
    /// `EnvFilter` directives used when `RUST_LOG` is unset
    pub log_filter: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            addr: DEFAULT_ADDR.to_string(),
            access_token: None,
            max_pending: DEFAULT_MAX_PENDING_PER_CHANNEL,
            log_filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

impl RelayConfig {
    /// Load `.env` (if present) and then `MENTOR_RELAY_*` variables
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let max_pending = match lookup("MENTOR_RELAY_MAX_PENDING") {
            Some(raw) => raw.parse().unwrap_or_else(|e| {
                warn!(value = %raw, error = %e, "Invalid MENTOR_RELAY_MAX_PENDING, using default");
                defaults.max_pending
            }),
            None => defaults.max_pending,
        };

        Self {
            addr: lookup("MENTOR_RELAY_ADDR").unwrap_or(defaults.addr),
            access_token: lookup("MENTOR_RELAY_TOKEN").filter(|t| !t.is_empty()),
            max_pending,
            log_filter: lookup("MENTOR_RELAY_LOG")
                .filter(|f| !f.trim().is_empty())
                .unwrap_or(defaults.log_filter),
        }
    }
}
