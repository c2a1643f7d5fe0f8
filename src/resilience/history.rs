//! Request-history backings for the rate limiter.

use super::rate_limiter::{Verdict, WindowCounts, WindowPolicy};
use crate::clock::{DAY_MS, HOUR_MS, MINUTE_MS};
use crate::error::TierError;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};

/// Outcome of one check against a bucket's history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admission {
    pub verdict: Verdict,
    /// Window counts after the call was (or was not) recorded.
    pub counts: WindowCounts,
}

/// Storage for per-bucket request timestamps.
///
/// `check_and_record` prunes entries older than a day, counts the three
/// windows, evaluates `policy` and records `now_ms` only when admitted.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn check_and_record(
        &self,
        bucket: &str,
        now_ms: u64,
        policy: &WindowPolicy,
    ) -> Result<Admission, TierError>;

    /// Drops buckets whose history is empty after pruning. Returns how many were removed.
    async fn sweep(&self, now_ms: u64) -> Result<usize, TierError>;

    async fn bucket_count(&self) -> Result<usize, TierError>;

    fn name(&self) -> &'static str;
}

/// In-process history: one `VecDeque` per bucket behind a single lock.
#[derive(Debug, Default)]
pub struct MemoryHistoryStore {
    buckets: Mutex<HashMap<String, VecDeque<u64>>>,
}

impl MemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of a bucket's retained timestamps, oldest first.
    pub fn history(&self, bucket: &str) -> Vec<u64> {
        let buckets = self.buckets.lock().unwrap_or_else(PoisonError::into_inner);
        buckets
            .get(bucket)
            .map(|h| h.iter().copied().collect())
            .unwrap_or_default()
    }
}

fn prune(history: &mut VecDeque<u64>, now_ms: u64) {
    while let Some(&oldest) = history.front() {
        if now_ms.saturating_sub(oldest) >= DAY_MS {
            history.pop_front();
        } else {
            break;
        }
    }
}

fn count_within(history: &VecDeque<u64>, now_ms: u64, window_ms: u64) -> u32 {
    let outside = history.partition_point(|&ts| now_ms.saturating_sub(ts) >= window_ms);
    (history.len() - outside) as u32
}

fn counts(history: &VecDeque<u64>, now_ms: u64) -> WindowCounts {
    WindowCounts {
        minute: count_within(history, now_ms, MINUTE_MS),
        hour: count_within(history, now_ms, HOUR_MS),
        day: count_within(history, now_ms, DAY_MS),
    }
}

#[async_trait]
impl HistoryStore for MemoryHistoryStore {
    async fn check_and_record(
        &self,
        bucket: &str,
        now_ms: u64,
        policy: &WindowPolicy,
    ) -> Result<Admission, TierError> {
        let mut buckets = self.buckets.lock().unwrap_or_else(PoisonError::into_inner);
        let history = buckets.entry(bucket.to_string()).or_default();
        prune(history, now_ms);

        let before = counts(history, now_ms);
        let verdict = policy.evaluate(&before);
        if !verdict.is_admitted() {
            return Ok(Admission {
                verdict,
                counts: before,
            });
        }

        history.push_back(now_ms);
        Ok(Admission {
            verdict,
            counts: WindowCounts {
                minute: before.minute + 1,
                hour: before.hour + 1,
                day: before.day + 1,
            },
        })
    }

    async fn sweep(&self, now_ms: u64) -> Result<usize, TierError> {
        let mut buckets = self.buckets.lock().unwrap_or_else(PoisonError::into_inner);
        let before = buckets.len();
        buckets.retain(|_, history| {
            prune(history, now_ms);
            !history.is_empty()
        });
        Ok(before - buckets.len())
    }

    async fn bucket_count(&self) -> Result<usize, TierError> {
        Ok(self
            .buckets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> WindowPolicy {
        WindowPolicy::new(3, 100, 1000).with_burst_allowance(1)
    }

    #[tokio::test]
    async fn test_rejected_call_is_not_recorded() {
        let store = MemoryHistoryStore::new();
        let p = policy();
        for _ in 0..4 {
            assert!(store
                .check_and_record("b", 1_000, &p)
                .await
                .unwrap()
                .verdict
                .is_admitted());
        }
        let rejected = store.check_and_record("b", 1_000, &p).await.unwrap();
        assert_eq!(rejected.verdict, Verdict::Reject);
        assert_eq!(rejected.counts.minute, 4);
        assert_eq!(store.history("b").len(), 4);
    }

    #[tokio::test]
    async fn test_prunes_entries_older_than_a_day() {
        let store = MemoryHistoryStore::new();
        let p = policy();
        store.check_and_record("b", 0, &p).await.unwrap();
        store.check_and_record("b", 10, &p).await.unwrap();

        let now = DAY_MS + 5;
        let admission = store.check_and_record("b", now, &p).await.unwrap();
        let history = store.history("b");
        assert!(history.iter().all(|&ts| now - ts < DAY_MS));
        assert_eq!(history, vec![10, now]);
        assert_eq!(admission.counts.day, 2);
        assert_eq!(admission.counts.minute, 1);
    }

    #[tokio::test]
    async fn test_sweep_removes_idle_buckets() {
        let store = MemoryHistoryStore::new();
        let p = policy();
        store.check_and_record("idle", 0, &p).await.unwrap();
        store.check_and_record("busy", DAY_MS, &p).await.unwrap();
        assert_eq!(store.bucket_count().await.unwrap(), 2);

        let removed = store.sweep(DAY_MS + 1).await.unwrap();
        assert_eq!(removed, 1);
        assert_eq!(store.bucket_count().await.unwrap(), 1);
        assert!(store.history("idle").is_empty());
    }
}
