use ai_lib_gateway::cache::{CacheConfig, InMemoryRemoteStore, RemoteStore, TieredCache};
use ai_lib_gateway::clock::ManualClock;
use ai_lib_gateway::TierError;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Remote store that is down.
struct FailingStore {
    calls: AtomicUsize,
}

#[async_trait]
impl RemoteStore for FailingStore {
    async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>, TierError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(TierError::Unavailable("connection refused".into()))
    }
    async fn set_ex(&self, _key: &str, _value: &[u8], _ttl: Duration) -> Result<(), TierError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(TierError::Unavailable("connection refused".into()))
    }
    async fn del(&self, _key: &str) -> Result<bool, TierError> {
        Err(TierError::Unavailable("connection refused".into()))
    }
    async fn scan(&self, _pattern: &str) -> Result<Vec<String>, TierError> {
        Err(TierError::Unavailable("connection refused".into()))
    }
    async fn ping(&self) -> Result<(), TierError> {
        Err(TierError::Unavailable("connection refused".into()))
    }
    fn name(&self) -> &'static str {
        "failing"
    }
}

/// Remote store that never answers.
struct HangingStore;

#[async_trait]
impl RemoteStore for HangingStore {
    async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>, TierError> {
        std::future::pending().await
    }
    async fn set_ex(&self, _key: &str, _value: &[u8], _ttl: Duration) -> Result<(), TierError> {
        std::future::pending().await
    }
    async fn del(&self, _key: &str) -> Result<bool, TierError> {
        std::future::pending().await
    }
    async fn scan(&self, _pattern: &str) -> Result<Vec<String>, TierError> {
        std::future::pending().await
    }
    async fn ping(&self) -> Result<(), TierError> {
        std::future::pending().await
    }
    fn name(&self) -> &'static str {
        "hanging"
    }
}

#[tokio::test]
async fn test_ttl_expiry_in_real_time() {
    let cache = TieredCache::new(CacheConfig::new());
    assert!(cache.set("k", b"v", Some(Duration::from_secs(1))).await);
    assert_eq!(cache.get("k").await, Some(b"v".to_vec()));

    tokio::time::sleep(Duration::from_millis(1100)).await;
    assert_eq!(cache.get("k").await, None);
}

#[tokio::test]
async fn test_eleven_keys_evict_one_batch_of_one() {
    let clock = Arc::new(ManualClock::new(0));
    let cache = TieredCache::new(CacheConfig::new().with_max_entries(10)).with_clock(clock.clone());
    for i in 0..11 {
        cache.set(&format!("k{i}"), b"v", None).await;
        clock.advance(Duration::from_millis(1));
    }
    assert_eq!(cache.local_len(), 10);
    assert_eq!(cache.stats().evictions, 1);
    assert_eq!(cache.get("k0").await, None);
    for i in 1..11 {
        assert!(cache.get(&format!("k{i}")).await.is_some(), "k{i} should survive");
    }
}

#[tokio::test]
async fn test_recently_read_entry_survives_eviction() {
    let clock = Arc::new(ManualClock::new(0));
    let cache = TieredCache::new(CacheConfig::new().with_max_entries(10)).with_clock(clock.clone());
    for i in 0..10 {
        cache.set(&format!("k{i}"), b"v", None).await;
        clock.advance(Duration::from_millis(1));
    }
    assert!(cache.get("k0").await.is_some());
    clock.advance(Duration::from_millis(1));

    cache.set("k10", b"v", None).await;
    assert!(cache.get("k0").await.is_some());
    assert_eq!(cache.get("k1").await, None);
}

#[tokio::test]
async fn test_failing_remote_degrades_to_local() {
    let remote = Arc::new(FailingStore {
        calls: AtomicUsize::new(0),
    });
    let cache = TieredCache::new(CacheConfig::new()).with_remote(remote.clone());

    assert!(cache.set("k", b"v", None).await);
    assert_eq!(cache.get("k").await, Some(b"v".to_vec()));
    assert!(!cache.remote_available().await);
    assert_eq!(cache.invalidate_pattern("k").await, 1);

    let stats = cache.stats();
    assert_eq!(stats.local_hits, 1);
    assert!(stats.remote_errors >= 2);
    assert_eq!(remote.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_hanging_remote_times_out() {
    let cache = TieredCache::new(CacheConfig::new().with_remote_timeout(Duration::from_millis(20)))
        .with_remote(Arc::new(HangingStore));

    let started = std::time::Instant::now();
    assert!(cache.set("k", b"v", None).await);
    assert_eq!(cache.get("k").await, Some(b"v".to_vec()));
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(cache.stats().remote_errors, 2);
}

#[tokio::test]
async fn test_remote_entries_expire() {
    let clock = Arc::new(ManualClock::new(0));
    let remote = Arc::new(InMemoryRemoteStore::with_clock(clock.clone()));
    let writer = TieredCache::new(CacheConfig::new())
        .with_remote(remote.clone())
        .with_clock(clock.clone());
    let reader = TieredCache::new(CacheConfig::new())
        .with_remote(remote.clone())
        .with_clock(clock.clone());

    writer.set("k", b"v", Some(Duration::from_secs(5))).await;
    assert!(reader.get("k").await.is_some());
    clock.advance(Duration::from_secs(5));
    assert_eq!(reader.get("k").await, None);
    assert!(remote.is_empty());
}

#[tokio::test]
async fn test_pattern_invalidation_with_glob_characters() {
    let remote = Arc::new(InMemoryRemoteStore::new());
    let cache = TieredCache::new(CacheConfig::new()).with_remote(remote.clone());
    cache.set("/v1/items?page=1:a", b"1", None).await;
    cache.set("/v1/items:b", b"2", None).await;

    assert_eq!(cache.invalidate_pattern("items?page").await, 1);
    assert!(cache.get("/v1/items:b").await.is_some());
}
