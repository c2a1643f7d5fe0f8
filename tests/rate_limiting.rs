use ai_lib_gateway::clock::{ManualClock, DAY_MS, HOUR_MS};
use ai_lib_gateway::resilience::{MemoryHistoryStore, RateLimiter, WindowPolicy};
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;

const START_MS: u64 = 1_700_000_000_000;

fn limiter_with(policy: WindowPolicy) -> (Arc<RateLimiter>, Arc<MemoryHistoryStore>, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(START_MS));
    let store = Arc::new(MemoryHistoryStore::new());
    let limiter = RateLimiter::with_store(policy, store.clone(), clock.clone());
    (Arc::new(limiter), store, clock)
}

#[tokio::test]
async fn test_rpm_three_with_burst_one() {
    let (limiter, _, _) = limiter_with(WindowPolicy::new(3, 1000, 10000).with_burst_allowance(1));
    let mut decisions = Vec::new();
    for _ in 0..5 {
        decisions.push(limiter.check_and_record("u1", "/v1/lessons").await);
    }
    let allowed: Vec<bool> = decisions.iter().map(|d| d.allowed).collect();
    let burst: Vec<bool> = decisions.iter().map(|d| d.burst_used).collect();
    assert_eq!(allowed, vec![true, true, true, true, false]);
    assert_eq!(burst, vec![false, false, false, true, false]);
}

#[tokio::test]
async fn test_cutoff_never_grows_counts() {
    let policy = WindowPolicy::new(5, 1000, 10000).with_burst_allowance(2);
    let (limiter, store, clock) = limiter_with(policy);
    for _ in 0..7 {
        assert!(limiter.check_and_record("u", "/e").await.allowed);
        clock.advance(Duration::from_millis(10));
    }
    for _ in 0..20 {
        let d = limiter.check_and_record("u", "/e").await;
        assert!(!d.allowed);
        assert_eq!(d.counts.minute, 7);
        clock.advance(Duration::from_millis(10));
    }
    assert_eq!(store.history("u:/e").len(), 7);
}

#[tokio::test]
async fn test_history_is_pruned_after_a_day() {
    let (limiter, store, clock) = limiter_with(WindowPolicy::default());
    for _ in 0..3 {
        limiter.check_and_record("u", "/e").await;
        clock.advance(Duration::from_millis(HOUR_MS));
    }
    clock.set(START_MS + DAY_MS + HOUR_MS);
    let d = limiter.check_and_record("u", "/e").await;
    assert!(d.allowed);

    let history = store.history("u:/e");
    let now = START_MS + DAY_MS + HOUR_MS;
    assert!(history.iter().all(|&ts| now - ts < DAY_MS));
    assert_eq!(d.counts.day as usize, history.len());
}

#[tokio::test]
async fn test_hour_limit_spills_into_burst() {
    let policy = WindowPolicy::new(2, 5, 10000).with_burst_allowance(1);
    let (limiter, _, clock) = limiter_with(policy);
    for _ in 0..5 {
        let d = limiter.check_and_record("u", "/e").await;
        assert!(d.allowed && !d.burst_used);
        clock.advance(Duration::from_secs(61));
    }

    // hour window full: only the minute burst headroom is left
    let first = limiter.check_and_record("u", "/e").await;
    assert!(first.allowed && first.burst_used);
    assert_eq!(first.remaining().hour, 0);
    for _ in 0..2 {
        let d = limiter.check_and_record("u", "/e").await;
        assert!(d.allowed && d.burst_used);
    }
    let cut = limiter.check_and_record("u", "/e").await;
    assert!(!cut.allowed);
    assert_eq!(cut.counts.minute, 3);

    clock.advance(Duration::from_millis(HOUR_MS));
    let d = limiter.check_and_record("u", "/e").await;
    assert!(d.allowed && !d.burst_used);
}

#[tokio::test]
async fn test_concurrent_callers_respect_limit() {
    let policy = WindowPolicy::new(10, 1000, 10000).with_burst_allowance(5);
    let (limiter, _, _) = limiter_with(policy);

    let calls = (0..40).map(|_| {
        let limiter = limiter.clone();
        tokio::spawn(async move { limiter.check_and_record("shared", "/e").await })
    });
    let decisions: Vec<_> = join_all(calls)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect();

    let admitted = decisions.iter().filter(|d| d.allowed).count();
    let burst = decisions.iter().filter(|d| d.burst_used).count();
    assert_eq!(admitted, 15);
    assert_eq!(burst, 5);
}

#[tokio::test]
async fn test_identifiers_are_independent() {
    let policy = WindowPolicy::new(1, 1000, 10000).with_burst_allowance(0);
    let (limiter, _, _) = limiter_with(policy);
    let results = join_all(
        ["a", "b", "c"]
            .iter()
            .map(|id| limiter.check_and_record(id, "/e")),
    )
    .await;
    assert!(results.iter().all(|d| d.allowed));
    assert!(!limiter.check_and_record("a", "/e").await.allowed);
    assert_eq!(limiter.snapshot().await.buckets, Some(3));
}
