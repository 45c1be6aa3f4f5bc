use serde_json::json;
use thiserror::Error;

pub type ChatResult<T> = Result<T, ChatError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChatError {
    #[error("unauthorized")]
    Unauthorized,

    #[error("forbidden")]
    Forbidden,

    #[error("{0} not found")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("too many requests, retry in {retry_after_ms} ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("transport error: {0}")]
    Transient(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ChatError {
    /// HTTP status code the error surfaces as
    pub fn status_code(&self) -> u16 {
        match self {
            ChatError::BadRequest(_) => 400,
            ChatError::Unauthorized => 401,
            ChatError::Forbidden => 403,
            ChatError::NotFound(_) => 404,
            ChatError::RateLimited { .. } => 429,
            ChatError::Transient(_) => 503,
            ChatError::Database(_) | ChatError::Config(_) | ChatError::Internal(_) => 500,
        }
    }

    /// Network or transport failure. Nothing here retries on its own.
    pub fn is_transient(&self) -> bool {
        matches!(self, ChatError::Transient(_))
    }

    /// JSON body returned alongside `status_code`
    pub fn response_body(&self) -> serde_json::Value {
        let message = match self {
            ChatError::Unauthorized => "Unauthorized".to_string(),
            ChatError::Forbidden => "Forbidden".to_string(),
            // Storage details stay in the logs
            ChatError::Database(_) | ChatError::Config(_) | ChatError::Internal(_) => {
                "Internal Server Error".to_string()
            }
            other => other.to_string(),
        };
        json!({ "error": message })
    }
}

impl From<rusqlite::Error> for ChatError {
    fn from(e: rusqlite::Error) -> Self {
        ChatError::Database(e.to_string())
    }
}

impl From<serde_json::Error> for ChatError {
    fn from(e: serde_json::Error) -> Self {
        ChatError::BadRequest(e.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for ChatError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        ChatError::Transient(e.to_string())
    }
}

impl From<garde::Report> for ChatError {
    fn from(report: garde::Report) -> Self {
        ChatError::BadRequest(report.to_string())
    }
}
