//! Millisecond clocks used by the limiter and the cache.
//!
//! Everything time-dependent in the gateway reads "now" through [`Clock`] so
//! tests can drive windows and TTLs deterministically with [`ManualClock`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub const MINUTE_MS: u64 = 60_000;
pub const HOUR_MS: u64 = 3_600_000;
pub const DAY_MS: u64 = 86_400_000;

/// Source of wall-clock milliseconds since the unix epoch.
///
/// Implementations must never go backwards within a process.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> u64;
}

/// System clock clamped to be monotonic.
///
/// Wall time can step backwards (NTP adjustments); the last observed value is
/// kept and reads never return less than it.
#[derive(Debug, Default)]
pub struct SystemClock {
    last: AtomicU64,
}

impl SystemClock {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        let wall = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        let prev = self.last.fetch_max(wall, Ordering::AcqRel);
        prev.max(wall)
    }
}

/// Hand-driven clock for tests and simulations.
#[derive(Debug)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(start_ms: u64) -> Self {
        Self {
            now: AtomicU64::new(start_ms),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.now.fetch_add(by.as_millis() as u64, Ordering::AcqRel);
    }

    /// Moves the clock to `ms`. Earlier values are ignored.
    pub fn set(&self, ms: u64) {
        self.now.fetch_max(ms, Ordering::AcqRel);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::Acquire)
    }
}

/// Start of the next `period_ms`-aligned boundary after `now_ms`, in unix seconds.
pub fn next_boundary_secs(now_ms: u64, period_ms: u64) -> u64 {
    ((now_ms / period_ms) + 1) * period_ms / 1000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_advances() {
        let clock = ManualClock::new(1_000);
        clock.advance(Duration::from_secs(2));
        assert_eq!(clock.now_ms(), 3_000);
        clock.set(500);
        assert_eq!(clock.now_ms(), 3_000);
    }

    #[test]
    fn test_system_clock_is_monotonic() {
        let clock = SystemClock::new();
        let a = clock.now_ms();
        let b = clock.now_ms();
        assert!(b >= a);
    }

    #[test]
    fn test_next_boundary() {
        // 00:00:30 -> next minute at 60s, next hour at 3600s
        assert_eq!(next_boundary_secs(30_000, MINUTE_MS), 60);
        assert_eq!(next_boundary_secs(30_000, HOUR_MS), 3_600);
        assert_eq!(next_boundary_secs(60_000, MINUTE_MS), 120);
        assert_eq!(next_boundary_secs(DAY_MS - 1, DAY_MS), 86_400);
    }
}
