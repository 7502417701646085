//! Rate limit configuration for administrative endpoints

use serde::Deserialize;

use super::error::ValidationError;

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    /// Requests allowed per client within one window
    #[serde(default = "default_max_requests")]
    pub manual_process_max_requests: u32,

    /// Window length in seconds
    #[serde(default = "default_window_secs")]
    pub manual_process_window_secs: u32,
}

impl RateLimitConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.manual_process_max_requests == 0 || self.manual_process_window_secs == 0 {
            return Err(ValidationError::InvalidRateLimit);
        }
        Ok(())
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            manual_process_max_requests: default_max_requests(),
            manual_process_window_secs: default_window_secs(),
        }
    }
}

fn default_max_requests() -> u32 {
    10
}

fn default_window_secs() -> u32 {
    60
}
