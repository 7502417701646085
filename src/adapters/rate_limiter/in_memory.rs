//! In-memory rate limiter.
//!
//! Fixed-window counters in a HashMap. Counts are per process, which is
//! enough for the low-volume administrative endpoints that use it.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::config::RateLimitConfig;
use crate::domain::foundation::Timestamp;
use crate::ports::{
    RateLimitDenied, RateLimitError, RateLimitKey, RateLimitResult, RateLimitStatus, RateLimiter,
};

/// Requests allowed per window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowLimit {
    pub max_requests: u32,
    pub window_secs: u32,
}

#[derive(Debug, Clone)]
struct WindowState {
    count: u32,
    window_start: i64,
    window_secs: u32,
}

impl WindowState {
    fn window_end(&self) -> i64 {
        self.window_start + i64::from(self.window_secs)
    }
}

#[derive(Debug)]
pub struct InMemoryRateLimiter {
    limit: WindowLimit,
    windows: Arc<RwLock<HashMap<String, WindowState>>>,
}

impl InMemoryRateLimiter {
    pub fn new(limit: WindowLimit) -> Self {
        Self {
            limit,
            windows: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(WindowLimit {
            max_requests: config.manual_process_max_requests,
            window_secs: config.manual_process_window_secs,
        })
    }

    async fn check_at(&self, key: &RateLimitKey, now: i64) -> RateLimitResult {
        let WindowLimit {
            max_requests,
            window_secs,
        } = self.limit;
        let mut windows = self.windows.write().await;

        let state = windows
            .entry(key.storage_key())
            .or_insert_with(|| WindowState {
                count: 0,
                window_start: now,
                window_secs,
            });

        if now >= state.window_end() {
            state.count = 0;
            state.window_start = now;
        }

        if state.count >= max_requests {
            let retry_after = state.window_end().saturating_sub(now).max(1);
            return RateLimitResult::Denied(RateLimitDenied {
                limit: max_requests,
                retry_after_secs: u32::try_from(retry_after).unwrap_or(window_secs),
                scope: key.scope,
            });
        }

        state.count += 1;
        RateLimitResult::Allowed(RateLimitStatus {
            limit: max_requests,
            remaining: max_requests.saturating_sub(state.count),
            reset_at: state.window_end(),
            window_secs,
        })
    }
}

#[async_trait]
impl RateLimiter for InMemoryRateLimiter {
    async fn check(&self, key: &RateLimitKey) -> Result<RateLimitResult, RateLimitError> {
        Ok(self.check_at(key, Timestamp::now().as_unix_secs()).await)
    }

    async fn status(&self, key: &RateLimitKey) -> Result<RateLimitStatus, RateLimitError> {
        let now = Timestamp::now().as_unix_secs();
        let windows = self.windows.read().await;

        let (count, window_start) = windows
            .get(&key.storage_key())
            .filter(|state| now < state.window_end())
            .map(|state| (state.count, state.window_start))
            .unwrap_or((0, now));

        Ok(RateLimitStatus {
            limit: self.limit.max_requests,
            remaining: self.limit.max_requests.saturating_sub(count),
            reset_at: window_start + i64::from(self.limit.window_secs),
            window_secs: self.limit.window_secs,
        })
    }

    async fn reset(&self, key: &RateLimitKey) -> Result<(), RateLimitError> {
        self.windows.write().await.remove(&key.storage_key());
        Ok(())
    }
}
