//! 请求准入网关：限流、缓存与成本统计的组合入口。
//!
//! # Gateway Module
//!
//! Wraps an expensive, billable [`Handler`] so that every call goes through
//! the same pipeline:
//!
//! ```text
//! NORMALIZE -> RATE_LIMIT_CHECK -> REJECTED
//!                               -> CACHE_LOOKUP -> SERVED_FROM_CACHE
//!                                               -> INVOKE_HANDLER -> CACHE_STORE -> SERVED_FRESH
//!                                                                 -> HANDLER_ERROR
//! ```
//!
//! Only side-effect-free calls touch the cache. Mutating calls are still
//! rate limited. Failures of the limiter or cache tiers degrade to "tier
//! absent"; handler failures always reach the caller and are never cached.
//!
//! ## Example
//!
//! ```rust
//! use ai_lib_gateway::gateway::{Gateway, GatewayRequest, Handler, HandlerOutput};
//! use ai_lib_gateway::GatewayConfig;
//! use async_trait::async_trait;
//!
//! struct Lessons;
//!
//! #[async_trait]
//! impl Handler for Lessons {
//!     async fn invoke(&self, req: &GatewayRequest) -> anyhow::Result<HandlerOutput> {
//!         Ok(HandlerOutput::new(serde_json::json!({ "endpoint": req.endpoint }), 0.02))
//!     }
//! }
//!
//! # #[tokio::main]
//! # async fn main() -> ai_lib_gateway::Result<()> {
//! let gateway = Gateway::builder(GatewayConfig::default()).build()?;
//! let req = GatewayRequest::get("/v1/lessons").with_caller("user-1");
//! let first = gateway.call(&req, &Lessons).await?;
//! let second = gateway.call(&req, &Lessons).await?;
//! assert!(!first.is_cached() && second.is_cached());
//! # Ok(())
//! # }
//! ```

mod request;
mod response;

pub use request::{GatewayRequest, Handler, HandlerOutput, Method, SemanticQuery};
pub use response::{AdmissionHeaders, GatewayResponse, Outcome};

use crate::cache::{CacheStats, KeyNormalizer, RemoteStore, TieredCache};
use crate::clock::{Clock, SystemClock};
use crate::config::GatewayConfig;
use crate::resilience::{HistoryStore, MemoryHistoryStore, RateLimiter, RateLimiterSnapshot};
use crate::telemetry::{sanitize_cost, CostSnapshot, CostTracker, MetricsSink};
use crate::{Error, ErrorContext, Result};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// What is stored per cached response: the body and the cost it took to produce.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CachedResponse {
    body: serde_json::Value,
    cost: f64,
}

#[derive(Debug, Clone)]
pub struct GatewaySnapshot {
    pub costs: CostSnapshot,
    pub cache: CacheStats,
    pub limiter: RateLimiterSnapshot,
    pub remote_cache: Option<&'static str>,
    pub closed: bool,
}

pub struct GatewayBuilder {
    config: GatewayConfig,
    remote: Option<Arc<dyn RemoteStore>>,
    history: Option<Arc<dyn HistoryStore>>,
    clock: Option<Arc<dyn Clock>>,
    normalizer: KeyNormalizer,
}

impl GatewayBuilder {
    fn new(config: GatewayConfig) -> Self {
        Self {
            config,
            remote: None,
            history: None,
            clock: None,
            normalizer: KeyNormalizer::new(),
        }
    }

    /// Shared cache tier consulted before the in-process one.
    pub fn with_remote_store(mut self, remote: Arc<dyn RemoteStore>) -> Self {
        self.remote = Some(remote);
        self
    }

    /// Shared request history; defaults to per-process memory.
    pub fn with_history_store(mut self, history: Arc<dyn HistoryStore>) -> Self {
        self.history = Some(history);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn with_key_normalizer(mut self, normalizer: KeyNormalizer) -> Self {
        self.normalizer = normalizer;
        self
    }

    /// Connect both shared tiers to `config.redis_url` when set.
    ///
    /// A failed connection is logged and the gateway runs on in-process
    /// tiers, the same way a later outage would be handled.
    #[cfg(feature = "redis")]
    pub async fn connect_redis(mut self) -> Self {
        let Some(url) = self.config.redis_url.clone() else {
            return self;
        };
        match crate::cache::RedisStore::connect(&url).await {
            Ok(store) => {
                let history = crate::resilience::RedisHistoryStore::new(
                    store.connection(),
                    self.config.key_prefix.clone(),
                );
                self.remote = Some(Arc::new(store));
                self.history = Some(Arc::new(history));
                tracing::info!("connected shared tiers to redis");
            }
            Err(e) => {
                tracing::warn!(error = %e, "redis unavailable, using in-process tiers");
            }
        }
        self
    }

    pub fn build(self) -> Result<Gateway> {
        self.config.validate()?;
        let clock = self
            .clock
            .unwrap_or_else(|| Arc::new(SystemClock::new()));
        let history = self
            .history
            .unwrap_or_else(|| Arc::new(MemoryHistoryStore::new()));

        let limiter = RateLimiter::with_store(self.config.window_policy(), history, clock.clone())
            .with_store_timeout(self.config.remote_timeout())
            .with_sweep_every(self.config.sweep_every_calls);

        let mut cache = TieredCache::new(self.config.cache_config()).with_clock(clock);
        if let Some(remote) = self.remote {
            cache = cache.with_remote(remote);
        }

        tracing::info!(
            per_minute = self.config.requests_per_minute,
            burst = self.config.burst_allowance,
            cache_enabled = self.config.cache_enabled,
            remote_cache = cache.remote_name().unwrap_or("none"),
            "gateway ready"
        );

        Ok(Gateway {
            config: self.config,
            limiter,
            cache,
            normalizer: self.normalizer,
            costs: CostTracker::new(),
            closed: AtomicBool::new(false),
        })
    }
}

/// Admission and caching front for a billable handler. Share it through `Arc`.
pub struct Gateway {
    config: GatewayConfig,
    limiter: RateLimiter,
    cache: TieredCache,
    normalizer: KeyNormalizer,
    costs: CostTracker,
    closed: AtomicBool,
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

impl Gateway {
    pub fn builder(config: GatewayConfig) -> GatewayBuilder {
        GatewayBuilder::new(config)
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn cache(&self) -> &TieredCache {
        &self.cache
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub fn costs(&self) -> &CostTracker {
        &self.costs
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Run one call through admission, cache and (on a miss) the handler.
    pub async fn call<H>(&self, request: &GatewayRequest, handler: &H) -> Result<GatewayResponse>
    where
        H: Handler + ?Sized,
    {
        if self.is_closed() {
            return Err(Error::runtime_with_context(
                "gateway closed",
                ErrorContext::new().with_source("gateway"),
            ));
        }
        if request.endpoint.trim().is_empty() {
            return Err(Error::validation_with_context(
                "endpoint must not be empty",
                ErrorContext::new()
                    .with_field_path("endpoint")
                    .with_source("gateway"),
            ));
        }

        let started = Instant::now();
        let request_id = uuid::Uuid::new_v4().to_string();
        let resource = request.resource();
        let key = request
            .is_cacheable()
            .then(|| self.normalizer.request_key(request, &self.config.vary_headers).to_string());

        let identity = request.caller_identity();
        let decision = self.limiter.check_and_record(&identity, &request.endpoint).await;
        self.costs.record_admission(&decision);
        if !decision.allowed {
            tracing::debug!(
                request_id = %request_id,
                caller = %identity,
                endpoint = %request.endpoint,
                "call rejected by rate limiter"
            );
            return Err(Error::AdmissionRejected(Box::new(decision)));
        }

        if let Some(ref key) = key {
            if let Some(hit) = self.cache.get_json::<CachedResponse>(key).await {
                self.costs.record_outcome(resource, hit.cost, true);
                return Ok(GatewayResponse {
                    request_id,
                    body: hit.body,
                    outcome: Outcome::ServedFromCache,
                    admission: AdmissionHeaders::from_decision(&decision, true, elapsed_ms(started)),
                });
            }
        }

        let output = match handler.invoke(request).await {
            Ok(output) => output,
            Err(e) => {
                self.costs.record_failure(resource);
                tracing::warn!(
                    request_id = %request_id,
                    endpoint = %request.endpoint,
                    error = %e,
                    "handler failed"
                );
                return Err(Error::Handler(e));
            }
        };
        // NaN and infinities serialize as null and would never read back
        let cost = sanitize_cost(resource, output.cost);
        self.costs.record_outcome(resource, cost, false);

        let body = match key {
            Some(ref key) => {
                let entry = CachedResponse {
                    body: output.body,
                    cost,
                };
                let ttl = self.config.ttl_for(&request.endpoint);
                self.cache.set_json(key, &entry, Some(ttl)).await;
                entry.body
            }
            None => output.body,
        };

        Ok(GatewayResponse {
            request_id,
            body,
            outcome: Outcome::ServedFresh,
            admission: AdmissionHeaders::from_decision(&decision, false, elapsed_ms(started)),
        })
    }

    /// Bind a handler to this gateway.
    pub fn wrap(self: &Arc<Self>, handler: Arc<dyn Handler>) -> GuardedHandler {
        GuardedHandler {
            gateway: Arc::clone(self),
            handler,
        }
    }

    /// Drop cached responses whose key contains `pattern` (e.g. an endpoint).
    pub async fn invalidate(&self, pattern: &str) -> usize {
        self.cache.invalidate_pattern(pattern).await
    }

    pub async fn snapshot(&self) -> GatewaySnapshot {
        GatewaySnapshot {
            costs: self.costs.snapshot(),
            cache: self.cache.stats(),
            limiter: self.limiter.snapshot().await,
            remote_cache: self.cache.remote_name(),
            closed: self.is_closed(),
        }
    }

    pub async fn publish_metrics(&self, sink: &dyn MetricsSink) -> Result<()> {
        sink.publish(&self.costs.snapshot()).await
    }

    /// Stop admitting calls. In-flight calls finish normally.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            let snap = self.costs.snapshot();
            tracing::info!(
                requests = snap.total_requests,
                hit_rate = snap.hit_rate,
                cost_saved = snap.total_saved,
                "gateway closed"
            );
        }
    }
}

/// A handler bound to a gateway: `handle` is `Gateway::call` with the handler filled in.
#[derive(Clone)]
pub struct GuardedHandler {
    gateway: Arc<Gateway>,
    handler: Arc<dyn Handler>,
}

impl GuardedHandler {
    pub async fn handle(&self, request: &GatewayRequest) -> Result<GatewayResponse> {
        self.gateway.call(request, self.handler.as_ref()).await
    }

    pub fn gateway(&self) -> &Arc<Gateway> {
        &self.gateway
    }
}
