//! # ai-lib-gateway
//!
//! 面向高成本 AI 调用的请求准入层：多窗口滑动限流、分层缓存与成本统计。
//!
//! Request-admission layer for expensive, billable calls (model inference,
//! content generation). It throttles callers and memoizes responses so the
//! backing services are not overwhelmed, and accounts for what the cache saved.
//!
//! ## Overview
//!
//! A [`Gateway`] wraps an opaque [`gateway::Handler`]. Every call is rate
//! limited per caller and endpoint, served from the tiered cache when an
//! equivalent request was answered before, and only forwarded to the handler
//! on a genuine miss.
//!
//! ## Core Philosophy
//!
//! - **Fail open**: a slow or unreachable shared store degrades to the in-process tier
//! - **Never mask handler failures**: they reach the caller and are never cached
//! - **Deterministic keys**: equivalent requests normalize to the same cache key
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ai_lib_gateway::{Gateway, GatewayConfig, GatewayRequest};
//! use ai_lib_gateway::gateway::{Handler, HandlerOutput};
//! use async_trait::async_trait;
//!
//! struct Generator;
//!
//! #[async_trait]
//! impl Handler for Generator {
//!     async fn invoke(&self, req: &GatewayRequest) -> anyhow::Result<HandlerOutput> {
//!         Ok(HandlerOutput::new(serde_json::json!({ "lesson": req.body }), 0.02))
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> ai_lib_gateway::Result<()> {
//!     let config = GatewayConfig::from_env()?;
//!     let gateway = Gateway::builder(config).build()?;
//!
//!     let req = GatewayRequest::post("/v1/generate")
//!         .with_query("Introduction to Algebra", "lesson", "en")
//!         .side_effect_free(true)
//!         .with_caller("user-42");
//!     let resp = gateway.call(&req, &Generator).await?;
//!     for (name, value) in resp.admission.header_pairs() {
//!         println!("{name}: {value}");
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`gateway`] | Call orchestration, requests, responses, admission headers |
//! | [`resilience`] | Multi-window sliding rate limiter and history stores |
//! | [`cache`] | Tiered cache, in-process LRU tier, codec, key normalization |
//! | [`telemetry`] | Cost and hit-rate accounting, metrics sinks |
//! | [`config`] | Configuration from defaults, YAML and environment |
//! | [`clock`] | Millisecond clocks (system and manual) |

pub mod cache;
pub mod clock;
pub mod config;
pub mod gateway;
pub mod resilience;
pub mod telemetry;

// Re-export main types for convenience
pub use config::GatewayConfig;
pub use gateway::{
    AdmissionHeaders, Gateway, GatewayBuilder, GatewayRequest, GatewayResponse, GuardedHandler,
    Outcome,
};
pub use resilience::{RateLimitDecision, RateLimiter, WindowPolicy};
pub use telemetry::{CostSnapshot, CostTracker, MetricsSink};

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for the library
pub mod error;
pub use error::{Error, ErrorContext, TierError};
