//! 响应缓存模块：远端 + 进程内两级 TTL 缓存，批量 LRU 淘汰。
//!
//! # Response Caching Module
//!
//! This module memoizes admitted, side-effect-free responses so repeated
//! requests do not reach the protected handler again.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`TieredCache`] | Remote-first lookup, write-through to the in-process tier |
//! | [`CacheConfig`] | TTL, capacity, key prefix, remote timeout, compression |
//! | [`RemoteStore`] | Trait for the shared TTL-capable tier |
//! | [`InMemoryRemoteStore`] | Process-local remote stand-in (tests, single node) |
//! | [`MemoryTier`] | Capacity-bounded map with batched LRU eviction |
//! | [`KeyNormalizer`] | Canonical keys for requests and semantic queries |
//!
//! With the `redis` feature, `RedisStore` implements [`RemoteStore`] on top of
//! a `redis::aio::ConnectionManager`.
//!
//! ## Example
//!
//! ```rust
//! use ai_lib_gateway::cache::{CacheConfig, TieredCache};
//! use std::time::Duration;
//!
//! # tokio_test::block_on(async {
//! let cache = TieredCache::new(CacheConfig::new().with_max_entries(1000));
//! cache.set("lessons:algebra", b"{...}", Some(Duration::from_secs(60))).await;
//! assert!(cache.get("lessons:algebra").await.is_some());
//! # });
//! ```
//!
//! ## Eviction
//!
//! When a new key arrives and the in-process tier is full, the least recently
//! used tenth of the entries (at least one) is evicted in a single batch.

mod backend;
mod codec;
mod key;
#[cfg(feature = "redis")]
pub(crate) mod redis_store;
mod tiered;

pub use backend::{
    escape_glob, glob_match, InMemoryRemoteStore, InsertOutcome, MemoryTier, RemoteStore,
};
pub use codec::{Codec, CodecError};
pub use key::{canonical_topic, CacheKey, KeyNormalizer};
#[cfg(feature = "redis")]
pub use redis_store::RedisStore;
pub use tiered::{CacheConfig, CacheStats, TieredCache};
