//! Two-tier cache: optional remote store in front of the in-process tier.

use super::backend::{escape_glob, MemoryTier, RemoteStore};
use super::codec::Codec;
use crate::clock::{Clock, SystemClock};
use crate::error::TierError;
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashSet;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub enabled: bool,
    pub default_ttl: Duration,
    pub max_entries: usize,
    /// Namespace for remote keys (`"{prefix}:{key}"`). Empty means none.
    pub key_prefix: String,
    pub remote_timeout: Duration,
    pub compression_enabled: bool,
    pub compression_threshold_bytes: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            default_ttl: Duration::from_secs(3600),
            max_entries: 10_000,
            key_prefix: "gateway".into(),
            remote_timeout: Duration::from_millis(250),
            compression_enabled: false,
            compression_threshold_bytes: 1024,
        }
    }
}

impl CacheConfig {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
    pub fn with_max_entries(mut self, max: usize) -> Self {
        self.max_entries = max;
        self
    }
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }
    pub fn with_remote_timeout(mut self, timeout: Duration) -> Self {
        self.remote_timeout = timeout;
        self
    }
    pub fn with_compression(mut self, enabled: bool, threshold_bytes: usize) -> Self {
        self.compression_enabled = enabled;
        self.compression_threshold_bytes = threshold_bytes;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub remote_hits: u64,
    pub local_hits: u64,
    pub misses: u64,
    pub sets: u64,
    pub evictions: u64,
    pub invalidations: u64,
    pub remote_errors: u64,
    pub codec_errors: u64,
    pub local_entries: usize,
}

impl CacheStats {
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Default)]
struct AtomicStats {
    hits: AtomicU64,
    remote_hits: AtomicU64,
    local_hits: AtomicU64,
    misses: AtomicU64,
    sets: AtomicU64,
    evictions: AtomicU64,
    invalidations: AtomicU64,
    remote_errors: AtomicU64,
    codec_errors: AtomicU64,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

/// Cache-aside store for admitted responses.
///
/// Reads try the remote tier first and fall back to the in-process tier.
/// Writes go to the remote tier (failures logged) and always through to the
/// in-process tier. Remote failures never reach the caller.
pub struct TieredCache {
    config: CacheConfig,
    remote: Option<Arc<dyn RemoteStore>>,
    local: MemoryTier,
    codec: Codec,
    clock: Arc<dyn Clock>,
    stats: AtomicStats,
}

impl TieredCache {
    /// In-process only, on the system clock.
    pub fn new(config: CacheConfig) -> Self {
        let local = MemoryTier::new(config.max_entries);
        let codec = Codec::new(config.compression_enabled, config.compression_threshold_bytes);
        Self {
            config,
            remote: None,
            local,
            codec,
            clock: Arc::new(SystemClock::new()),
            stats: AtomicStats::default(),
        }
    }

    pub fn with_remote(mut self, remote: Arc<dyn RemoteStore>) -> Self {
        self.remote = Some(remote);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn remote_name(&self) -> Option<&'static str> {
        self.remote.as_ref().map(|r| r.name())
    }

    fn remote_key(&self, key: &str) -> String {
        if self.config.key_prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}:{}", self.config.key_prefix, key)
        }
    }

    fn local_key<'a>(&self, remote_key: &'a str) -> &'a str {
        if self.config.key_prefix.is_empty() {
            return remote_key;
        }
        remote_key
            .strip_prefix(self.config.key_prefix.as_str())
            .and_then(|k| k.strip_prefix(':'))
            .unwrap_or(remote_key)
    }

    /// Run a remote call under the configured timeout.
    async fn remote_call<T, F>(&self, op: &'static str, fut: F) -> Result<T, TierError>
    where
        F: Future<Output = Result<T, TierError>>,
    {
        let result = match tokio::time::timeout(self.config.remote_timeout, fut).await {
            Ok(r) => r,
            Err(_) => Err(TierError::Timeout(self.config.remote_timeout)),
        };
        if let Err(ref e) = result {
            bump(&self.stats.remote_errors);
            tracing::warn!(op, error = %e, "remote tier unavailable, using local tier");
        }
        result
    }

    /// Decoded frame from the first tier that has one, and whether it came
    /// from the remote tier. Hits and misses are counted by the caller.
    async fn lookup(&self, key: &str) -> Option<(Vec<u8>, bool)> {
        if let Some(remote) = self.remote.as_ref() {
            let rk = self.remote_key(key);
            if let Ok(Some(frame)) = self.remote_call("get", remote.get(&rk)).await {
                match self.codec.decode(&frame) {
                    Ok(value) => return Some((value, true)),
                    Err(e) => {
                        bump(&self.stats.codec_errors);
                        tracing::warn!(key = %key, error = %e, "undecodable remote entry");
                    }
                }
            }
        }

        let now = self.clock.now_ms();
        let frame = self.local.get(key, now)?;
        match self.codec.decode(&frame) {
            Ok(value) => Some((value, false)),
            Err(e) => {
                bump(&self.stats.codec_errors);
                tracing::warn!(key = %key, error = %e, "undecodable local entry, dropping");
                self.local.remove(key);
                None
            }
        }
    }

    fn record_hit(&self, key: &str, remote: bool) {
        bump(&self.stats.hits);
        if remote {
            bump(&self.stats.remote_hits);
            tracing::debug!(key = %key, "cache hit (remote)");
        } else {
            bump(&self.stats.local_hits);
            tracing::debug!(key = %key, "cache hit (local)");
        }
    }

    fn record_miss(&self, key: &str) {
        bump(&self.stats.misses);
        tracing::debug!(key = %key, "cache miss");
    }

    pub async fn get(&self, key: &str) -> Option<Vec<u8>> {
        if !self.config.enabled {
            return None;
        }
        match self.lookup(key).await {
            Some((value, remote)) => {
                self.record_hit(key, remote);
                Some(value)
            }
            None => {
                self.record_miss(key);
                None
            }
        }
    }

    /// Store `value` for `ttl` (or the default TTL). Returns false only when
    /// nothing was written (cache disabled or encoding failed).
    pub async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> bool {
        if !self.config.enabled {
            return false;
        }
        let frame = match self.codec.encode(value) {
            Ok(f) => f,
            Err(e) => {
                bump(&self.stats.codec_errors);
                tracing::warn!(key = %key, error = %e, "failed to encode cache entry, skipping");
                return false;
            }
        };
        let ttl = ttl.unwrap_or(self.config.default_ttl);

        if let Some(remote) = self.remote.as_ref() {
            let rk = self.remote_key(key);
            let _ = self.remote_call("set", remote.set_ex(&rk, &frame, ttl)).await;
        }

        let now = self.clock.now_ms();
        let outcome = self.local.insert(key, frame, ttl, now);
        if !outcome.evicted.is_empty() {
            self.stats
                .evictions
                .fetch_add(outcome.evicted.len() as u64, Ordering::Relaxed);
            tracing::debug!(evicted = outcome.evicted.len(), "evicted least recently used entries");
        }
        bump(&self.stats.sets);
        true
    }

    /// JSON read; an undecodable value counts as a miss.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        if !self.config.enabled {
            return None;
        }
        let Some((bytes, remote)) = self.lookup(key).await else {
            self.record_miss(key);
            return None;
        };
        match serde_json::from_slice(&bytes) {
            Ok(v) => {
                self.record_hit(key, remote);
                Some(v)
            }
            Err(e) => {
                bump(&self.stats.codec_errors);
                tracing::warn!(key = %key, error = %e, "cached value does not deserialize, treating as miss");
                self.record_miss(key);
                None
            }
        }
    }

    /// JSON write; a serialization failure is logged and skipped.
    pub async fn set_json<T: Serialize>(&self, key: &str, value: &T, ttl: Option<Duration>) -> bool {
        match serde_json::to_vec(value) {
            Ok(bytes) => self.set(key, &bytes, ttl).await,
            Err(e) => {
                bump(&self.stats.codec_errors);
                tracing::warn!(key = %key, error = %e, "failed to serialize cache value, skipping");
                false
            }
        }
    }

    /// Remove every entry, in both tiers, whose key contains `substring`.
    /// Returns the number of distinct keys removed.
    pub async fn invalidate_pattern(&self, substring: &str) -> usize {
        let mut removed: HashSet<String> = self.local.remove_matching(substring).into_iter().collect();

        if let Some(remote) = self.remote.as_ref() {
            let pattern = if self.config.key_prefix.is_empty() {
                format!("*{}*", escape_glob(substring))
            } else {
                format!("{}:*{}*", escape_glob(&self.config.key_prefix), escape_glob(substring))
            };
            if let Ok(keys) = self.remote_call("scan", remote.scan(&pattern)).await {
                for rk in keys {
                    let logical = self.local_key(&rk);
                    if !logical.contains(substring) {
                        continue;
                    }
                    if let Ok(true) = self.remote_call("del", remote.del(&rk)).await {
                        removed.insert(logical.to_string());
                    }
                }
            }
        }

        self.stats
            .invalidations
            .fetch_add(removed.len() as u64, Ordering::Relaxed);
        tracing::debug!(pattern = %substring, removed = removed.len(), "invalidated cache family");
        removed.len()
    }

    /// True when a remote tier is configured and answers PING in time.
    pub async fn remote_available(&self) -> bool {
        match self.remote.as_ref() {
            Some(remote) => self.remote_call("ping", remote.ping()).await.is_ok(),
            None => false,
        }
    }

    pub fn local_len(&self) -> usize {
        self.local.len()
    }

    pub fn clear_local(&self) {
        self.local.clear();
    }

    pub fn stats(&self) -> CacheStats {
        let s = &self.stats;
        CacheStats {
            hits: s.hits.load(Ordering::Relaxed),
            remote_hits: s.remote_hits.load(Ordering::Relaxed),
            local_hits: s.local_hits.load(Ordering::Relaxed),
            misses: s.misses.load(Ordering::Relaxed),
            sets: s.sets.load(Ordering::Relaxed),
            evictions: s.evictions.load(Ordering::Relaxed),
            invalidations: s.invalidations.load(Ordering::Relaxed),
            remote_errors: s.remote_errors.load(Ordering::Relaxed),
            codec_errors: s.codec_errors.load(Ordering::Relaxed),
            local_entries: self.local.len(),
        }
    }
}
