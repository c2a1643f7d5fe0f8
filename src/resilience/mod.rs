//! 准入控制模块：多粒度滑动窗口限流与突发容忍。
//!
//! # Admission Control Module
//!
//! This module decides whether an inbound call may proceed, using per-bucket
//! sliding windows (minute / hour / day) plus a burst allowance on the minute
//! window.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`RateLimiter`] | Sliding-window limiter with opportunistic housekeeping |
//! | [`WindowPolicy`] | Limits and burst allowance; pure admit/reject evaluation |
//! | [`RateLimitDecision`] | Per-call outcome with counts, limits and reset times |
//! | [`HistoryStore`] | Trait for request-history backings |
//! | [`MemoryHistoryStore`] | Per-process backing (one coarse lock) |
//!
//! With the `redis` feature, `RedisHistoryStore` keeps histories in sorted sets
//! so several gateway instances share one budget (best effort).
//!
//! ## Example
//!
//! ```rust
//! use ai_lib_gateway::resilience::{RateLimiter, WindowPolicy};
//!
//! # tokio_test::block_on(async {
//! let policy = WindowPolicy::new(3, 1000, 10000).with_burst_allowance(1);
//! let limiter = RateLimiter::new(policy);
//!
//! let decision = limiter.check_and_record("u1", "/lessons").await;
//! assert!(decision.allowed);
//! # });
//! ```

mod history;
pub mod rate_limiter;
#[cfg(feature = "redis")]
mod redis_history;

pub use history::{Admission, HistoryStore, MemoryHistoryStore};
pub use rate_limiter::{
    RateLimitDecision, RateLimiter, RateLimiterSnapshot, ResetTimes, Verdict, WindowCounts,
    WindowPolicy,
};
#[cfg(feature = "redis")]
pub use redis_history::RedisHistoryStore;
