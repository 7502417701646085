//! Rate limiting port.
//!
//! Injected into the HTTP layer for administrative endpoints; there is no
//! process-global limiter state.

use async_trait::async_trait;
use std::fmt;

#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Check if request is allowed, consuming one unit of quota if so.
    async fn check(&self, key: &RateLimitKey) -> Result<RateLimitResult, RateLimitError>;

    /// Current quota without consuming any.
    async fn status(&self, key: &RateLimitKey) -> Result<RateLimitStatus, RateLimitError>;

    /// Clears the current window for a key.
    async fn reset(&self, key: &RateLimitKey) -> Result<(), RateLimitError>;
}

/// What a limit is counted against.
#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub struct RateLimitKey {
    pub scope: RateLimitScope,
    /// Client address or `global`
    pub identifier: String,
    /// Endpoint being limited
    pub resource: String,
}

#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub enum RateLimitScope {
    Global,
    Ip,
}

impl RateLimitKey {
    pub fn ip(ip: &str, resource: &str) -> Self {
        Self {
            scope: RateLimitScope::Ip,
            identifier: ip.to_string(),
            resource: resource.to_string(),
        }
    }

    pub fn global(resource: &str) -> Self {
        Self {
            scope: RateLimitScope::Global,
            identifier: "global".to_string(),
            resource: resource.to_string(),
        }
    }

    /// Flat storage key, e.g. `ratelimit:ip:10.0.0.1:manual_process`.
    pub fn storage_key(&self) -> String {
        format!(
            "ratelimit:{}:{}:{}",
            self.scope, self.identifier, self.resource
        )
    }
}

impl RateLimitScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            RateLimitScope::Global => "global",
            RateLimitScope::Ip => "ip",
        }
    }
}

impl fmt::Display for RateLimitScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone)]
pub enum RateLimitResult {
    Allowed(RateLimitStatus),
    Denied(RateLimitDenied),
}

impl RateLimitResult {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateLimitResult::Allowed(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitStatus {
    pub limit: u32,
    pub remaining: u32,
    /// Unix seconds at which the window resets
    pub reset_at: i64,
    pub window_secs: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitDenied {
    pub limit: u32,
    pub retry_after_secs: u32,
    pub scope: RateLimitScope,
}

#[derive(Debug, thiserror::Error)]
pub enum RateLimitError {
    #[error("rate limiter unavailable: {0}")]
    Unavailable(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_key_format() {
        let key = RateLimitKey::ip("10.0.0.1", "manual_process");
        assert_eq!(key.storage_key(), "ratelimit:ip:10.0.0.1:manual_process");
        assert_eq!(
            RateLimitKey::global("manual_process").storage_key(),
            "ratelimit:global:global:manual_process"
        );
    }

    #[test]
    fn result_is_allowed() {
        let allowed = RateLimitResult::Allowed(RateLimitStatus {
            limit: 10,
            remaining: 9,
            reset_at: 0,
            window_secs: 60,
        });
        assert!(allowed.is_allowed());

        let denied = RateLimitResult::Denied(RateLimitDenied {
            limit: 10,
            retry_after_secs: 30,
            scope: RateLimitScope::Ip,
        });
        assert!(!denied.is_allowed());
    }
}
