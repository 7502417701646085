//! Rate limiter adapters.
//!
//! - `InMemoryRateLimiter` - fixed-window counters for a single instance
//!
//! ```ignore
//! let limiter = InMemoryRateLimiter::from_config(&config.rate_limit);
//! let result = limiter.check(&RateLimitKey::ip("10.0.0.1", "manual_process")).await?;
//! ```

mod in_memory;

pub use in_memory::{InMemoryRateLimiter, WindowLimit};
