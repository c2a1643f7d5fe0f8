use super::history::{Admission, HistoryStore, MemoryHistoryStore};
use crate::clock::{next_boundary_secs, Clock, SystemClock, DAY_MS, HOUR_MS, MINUTE_MS};
use crate::error::TierError;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Request counts (or limits) for the three sliding windows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowCounts {
    pub minute: u32,
    pub hour: u32,
    pub day: u32,
}

/// Unix-second timestamps of the next minute / hour / day boundaries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResetTimes {
    pub minute: u64,
    pub hour: u64,
    pub day: u64,
}

impl ResetTimes {
    pub fn at(now_ms: u64) -> Self {
        Self {
            minute: next_boundary_secs(now_ms, MINUTE_MS),
            hour: next_boundary_secs(now_ms, HOUR_MS),
            day: next_boundary_secs(now_ms, DAY_MS),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Admit,
    /// Over a window limit but still inside the minute burst allowance.
    AdmitBurst,
    Reject,
}

impl Verdict {
    pub fn is_admitted(self) -> bool {
        !matches!(self, Verdict::Reject)
    }
}

/// Window limits plus the burst allowance applied on top of the minute limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowPolicy {
    pub per_minute: u32,
    pub per_hour: u32,
    pub per_day: u32,
    pub burst_allowance: u32,
}

impl Default for WindowPolicy {
    fn default() -> Self {
        Self {
            per_minute: 60,
            per_hour: 1000,
            per_day: 10000,
            burst_allowance: 10,
        }
    }
}

impl WindowPolicy {
    pub fn new(per_minute: u32, per_hour: u32, per_day: u32) -> Self {
        Self {
            per_minute,
            per_hour,
            per_day,
            ..Self::default()
        }
    }

    pub fn with_burst_allowance(mut self, burst: u32) -> Self {
        self.burst_allowance = burst;
        self
    }

    pub fn limits(&self) -> WindowCounts {
        WindowCounts {
            minute: self.per_minute,
            hour: self.per_hour,
            day: self.per_day,
        }
    }

    /// Decide on a call given the counts observed before it.
    pub fn evaluate(&self, counts: &WindowCounts) -> Verdict {
        let limit_reached = counts.minute >= self.per_minute
            || counts.hour >= self.per_hour
            || counts.day >= self.per_day;
        if !limit_reached {
            return Verdict::Admit;
        }
        if counts.minute < self.per_minute.saturating_add(self.burst_allowance) {
            Verdict::AdmitBurst
        } else {
            Verdict::Reject
        }
    }
}

/// Outcome of one admission check. Recomputed on every call, never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub counts: WindowCounts,
    pub limits: WindowCounts,
    pub burst_used: bool,
    pub reset_at: ResetTimes,
    pub decided_at_ms: u64,
    /// The history store failed and the call was let through.
    pub degraded: bool,
}

impl RateLimitDecision {
    fn from_admission(admission: Admission, policy: &WindowPolicy, now_ms: u64) -> Self {
        Self {
            allowed: admission.verdict.is_admitted(),
            counts: admission.counts,
            limits: policy.limits(),
            burst_used: admission.verdict == Verdict::AdmitBurst,
            reset_at: ResetTimes::at(now_ms),
            decided_at_ms: now_ms,
            degraded: false,
        }
    }

    fn fail_open(policy: &WindowPolicy, now_ms: u64) -> Self {
        Self {
            allowed: true,
            counts: WindowCounts::default(),
            limits: policy.limits(),
            burst_used: false,
            reset_at: ResetTimes::at(now_ms),
            decided_at_ms: now_ms,
            degraded: true,
        }
    }

    /// Calls left in each window before the nominal limit (burst not included).
    pub fn remaining(&self) -> WindowCounts {
        WindowCounts {
            minute: self.limits.minute.saturating_sub(self.counts.minute),
            hour: self.limits.hour.saturating_sub(self.counts.hour),
            day: self.limits.day.saturating_sub(self.counts.day),
        }
    }

    /// Seconds until the minute window resets, only for rejected calls.
    pub fn retry_after_seconds(&self) -> Option<u64> {
        if self.allowed {
            return None;
        }
        let now_secs = self.decided_at_ms / 1000;
        Some(self.reset_at.minute.saturating_sub(now_secs).max(1))
    }
}

#[derive(Debug, Clone)]
pub struct RateLimiterSnapshot {
    pub policy: WindowPolicy,
    pub store: &'static str,
    /// `None` when the store could not be reached.
    pub buckets: Option<usize>,
    pub checks: u64,
}

/// Multi-window sliding limiter.
///
/// - Buckets are keyed by `"{identifier}:{endpoint}"` and created lazily
/// - Store failures and timeouts fail open
/// - Every `sweep_every` checks the store drops idle buckets inline
pub struct RateLimiter {
    policy: WindowPolicy,
    store: Arc<dyn HistoryStore>,
    clock: Arc<dyn Clock>,
    store_timeout: Duration,
    sweep_every: u64,
    checks: AtomicU64,
}

impl RateLimiter {
    /// In-process limiter on the system clock.
    pub fn new(policy: WindowPolicy) -> Self {
        Self::with_store(
            policy,
            Arc::new(MemoryHistoryStore::new()),
            Arc::new(SystemClock::new()),
        )
    }

    pub fn with_store(
        policy: WindowPolicy,
        store: Arc<dyn HistoryStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            policy,
            store,
            clock,
            store_timeout: Duration::from_millis(250),
            sweep_every: 1000,
            checks: AtomicU64::new(0),
        }
    }

    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    /// Run housekeeping every `n` checks (0 disables it).
    pub fn with_sweep_every(mut self, n: u64) -> Self {
        self.sweep_every = n;
        self
    }

    pub fn policy(&self) -> &WindowPolicy {
        &self.policy
    }

    pub async fn check_and_record(&self, identifier: &str, endpoint: &str) -> RateLimitDecision {
        let bucket = format!("{}:{}", identifier, endpoint);
        let now = self.clock.now_ms();

        let result = match tokio::time::timeout(
            self.store_timeout,
            self.store.check_and_record(&bucket, now, &self.policy),
        )
        .await
        {
            Ok(r) => r,
            Err(_) => Err(TierError::Timeout(self.store_timeout)),
        };

        let decision = match result {
            Ok(admission) => RateLimitDecision::from_admission(admission, &self.policy, now),
            Err(e) => {
                tracing::warn!(bucket = %bucket, store = self.store.name(), error = %e, "history store failed, admitting");
                RateLimitDecision::fail_open(&self.policy, now)
            }
        };

        if decision.burst_used {
            tracing::debug!(bucket = %bucket, minute = decision.counts.minute, "admitted on burst allowance");
        } else if !decision.allowed {
            tracing::debug!(bucket = %bucket, minute = decision.counts.minute, "rejected");
        }

        let n = self.checks.fetch_add(1, Ordering::Relaxed) + 1;
        if self.sweep_every > 0 && n % self.sweep_every == 0 {
            self.sweep().await;
        }

        decision
    }

    /// Drop buckets with no history inside the day window. Returns the number removed.
    pub async fn sweep(&self) -> usize {
        let now = self.clock.now_ms();
        match tokio::time::timeout(self.store_timeout, self.store.sweep(now)).await {
            Ok(Ok(removed)) => {
                if removed > 0 {
                    tracing::debug!(removed, "swept idle rate-limit buckets");
                }
                removed
            }
            Ok(Err(e)) => {
                tracing::warn!(store = self.store.name(), error = %e, "history sweep failed");
                0
            }
            Err(_) => {
                tracing::warn!(store = self.store.name(), "history sweep timed out");
                0
            }
        }
    }

    pub async fn snapshot(&self) -> RateLimiterSnapshot {
        let buckets = match tokio::time::timeout(self.store_timeout, self.store.bucket_count()).await {
            Ok(Ok(n)) => Some(n),
            _ => None,
        };
        RateLimiterSnapshot {
            policy: self.policy,
            store: self.store.name(),
            buckets,
            checks: self.checks.load(Ordering::Relaxed),
        }
    }
}
