//! Fixed-window request limiting keyed by caller.

use std::time::Duration;

use dashmap::DashMap;
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::ChatError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub max_requests: u32,
    pub window: Duration,
}

impl RateLimitConfig {
    /// 100 requests per minute
    pub const API: Self = Self {
        max_requests: 100,
        window: Duration::from_secs(60),
    };

    /// 5 attempts per 15 minutes
    pub const AUTH: Self = Self {
        max_requests: 5,
        window: Duration::from_secs(15 * 60),
    };

    /// 3 attempts per hour
    pub const PASSWORD_RESET: Self = Self {
        max_requests: 3,
        window: Duration::from_secs(60 * 60),
    };
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 10,
            window: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    /// Time until the window resets
    #[serde(skip)]
    pub reset_after: Duration,
}

impl RateLimitDecision {
    pub fn into_result(self) -> Result<Self, ChatError> {
        if self.allowed {
            Ok(self)
        } else {
            Err(ChatError::RateLimited {
                retry_after_ms: self.reset_after.as_millis() as u64,
            })
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Window {
    count: u32,
    reset_at: Instant,
}

pub struct RateLimiter {
    config: RateLimitConfig,
    windows: DashMap<String, Window>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            windows: DashMap::new(),
        }
    }

    pub fn api() -> Self {
        Self::new(RateLimitConfig::API)
    }

    pub fn auth() -> Self {
        Self::new(RateLimitConfig::AUTH)
    }

    pub fn config(&self) -> RateLimitConfig {
        self.config
    }

    /// Count one request from `identifier`
    pub fn check(&self, identifier: &str) -> RateLimitDecision {
        let now = Instant::now();
        let limit = self.config.max_requests;

        let mut window = self
            .windows
            .entry(identifier.to_string())
            .or_insert(Window {
                count: 0,
                reset_at: now + self.config.window,
            });

        if now >= window.reset_at {
            *window = Window {
                count: 0,
                reset_at: now + self.config.window,
            };
        }

        let reset_after = window.reset_at.saturating_duration_since(now);
        if window.count >= limit {
            warn!(identifier = %identifier, "Rate limit exceeded");
            return RateLimitDecision {
                allowed: false,
                limit,
                remaining: 0,
                reset_after,
            };
        }

        window.count += 1;
        RateLimitDecision {
            allowed: true,
            limit,
            remaining: limit - window.count,
            reset_after,
        }
    }

    pub fn reset(&self, identifier: &str) {
        self.windows.remove(identifier);
    }

    /// Drop expired windows
    pub fn cleanup(&self) -> usize {
        let now = Instant::now();
        let before = self.windows.len();
        self.windows.retain(|_, window| now < window.reset_at);
        let removed = before - self.windows.len();
        if removed > 0 {
            debug!(removed, "Cleaned up rate limit windows");
        }
        removed
    }

    pub fn tracked(&self) -> usize {
        self.windows.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_limit_then_reset_after_window() {
        let limiter = RateLimiter::new(RateLimitConfig {
            max_requests: 2,
            window: Duration::from_secs(60),
        });

        assert_eq!(limiter.check("U1").remaining, 1);
        assert_eq!(limiter.check("U1").remaining, 0);
        let denied = limiter.check("U1");
        assert!(!denied.allowed);
        assert_eq!(
            denied.into_result().unwrap_err(),
            ChatError::RateLimited {
                retry_after_ms: 60_000
            }
        );

        // Other callers are unaffected
        assert!(limiter.check("U2").allowed);

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(limiter.check("U1").allowed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_drops_expired_windows() {
        let limiter = RateLimiter::auth();
        limiter.check("a");
        limiter.check("b");
        assert_eq!(limiter.cleanup(), 0);

        tokio::time::advance(RateLimitConfig::AUTH.window).await;
        assert_eq!(limiter.cleanup(), 2);
        assert_eq!(limiter.tracked(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_clears_caller() {
        let limiter = RateLimiter::new(RateLimitConfig {
            max_requests: 1,
            window: Duration::from_secs(60),
        });
        assert!(limiter.check("U1").allowed);
        assert!(!limiter.check("U1").allowed);
        limiter.reset("U1");
        assert!(limiter.check("U1").allowed);
    }

    #[test]
    fn test_presets() {
        assert_eq!(RateLimiter::api().config().max_requests, 100);
        assert_eq!(RateLimitConfig::AUTH.window, Duration::from_secs(900));
    }
}
