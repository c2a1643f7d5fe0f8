//! Cache tier implementations.

use crate::clock::{Clock, SystemClock};
use crate::error::TierError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// Contract for the shared, TTL-capable remote tier.
///
/// Any call may fail or hang; callers wrap them in a timeout and treat every
/// error as "tier absent".
#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, TierError>;
    async fn set_ex(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), TierError>;
    async fn del(&self, key: &str) -> Result<bool, TierError>;
    /// Keys matching a glob pattern (`*`, `?`, `[..]`, `\` escapes).
    async fn scan(&self, pattern: &str) -> Result<Vec<String>, TierError>;
    async fn ping(&self) -> Result<(), TierError>;
    fn name(&self) -> &'static str;
}

/// TTL in milliseconds, saturating instead of wrapping for huge durations.
pub(crate) fn ttl_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX)
}

/// Expiry argument for a millisecond `PSETEX`-style store, which rejects 0.
/// Matches the in-process tier to the millisecond.
#[cfg_attr(not(feature = "redis"), allow(dead_code))]
pub(crate) fn remote_expiry_millis(ttl: Duration) -> u64 {
    ttl_millis(ttl).max(1)
}

#[derive(Clone)]
struct RemoteEntry {
    data: Vec<u8>,
    expires_at_ms: u64,
}

/// Process-local stand-in for a remote store.
///
/// Several `TieredCache`s can share one instance to behave like gateway
/// replicas talking to the same Redis.
pub struct InMemoryRemoteStore {
    entries: Mutex<HashMap<String, RemoteEntry>>,
    clock: Arc<dyn Clock>,
}

impl InMemoryRemoteStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock::new()))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock,
        }
    }

    pub fn len(&self) -> usize {
        let now = self.clock.now_ms();
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|e| e.expires_at_ms > now)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryRemoteStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteStore for InMemoryRemoteStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, TierError> {
        let now = self.clock.now_ms();
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        match entries.get(key) {
            Some(e) if e.expires_at_ms > now => Ok(Some(e.data.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set_ex(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), TierError> {
        let expires_at_ms = self.clock.now_ms().saturating_add(ttl_millis(ttl));
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                key.to_string(),
                RemoteEntry {
                    data: value.to_vec(),
                    expires_at_ms,
                },
            );
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<bool, TierError> {
        Ok(self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key)
            .is_some())
    }

    async fn scan(&self, pattern: &str) -> Result<Vec<String>, TierError> {
        let now = self.clock.now_ms();
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let mut keys: Vec<String> = entries
            .iter()
            .filter(|(k, e)| e.expires_at_ms > now && glob_match(pattern, k))
            .map(|(k, _)| k.clone())
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn ping(&self) -> Result<(), TierError> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        "in-memory-remote"
    }
}

/// Escape glob metacharacters so `s` matches literally inside a SCAN pattern.
pub fn escape_glob(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Minimal Redis-style glob: `*`, `?`, `\x` escapes and `[...]` classes.
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    glob_at(&p, &t)
}

fn glob_at(p: &[char], t: &[char]) -> bool {
    match p.first() {
        None => t.is_empty(),
        Some('*') => (0..=t.len()).any(|i| glob_at(&p[1..], &t[i..])),
        Some('?') => !t.is_empty() && glob_at(&p[1..], &t[1..]),
        Some('\\') if p.len() > 1 => t.first() == Some(&p[1]) && glob_at(&p[2..], &t[1..]),
        Some('[') => {
            let Some(close) = p.iter().position(|&c| c == ']') else {
                return t.first() == Some(&'[') && glob_at(&p[1..], &t[1..]);
            };
            match t.first() {
                Some(c) if p[1..close].contains(c) => glob_at(&p[close + 1..], &t[1..]),
                _ => false,
            }
        }
        Some(c) => t.first() == Some(c) && glob_at(&p[1..], &t[1..]),
    }
}

#[derive(Debug, Clone)]
struct MemoryEntry {
    data: Vec<u8>,
    stored_at_ms: u64,
    ttl: Duration,
    last_access_ms: u64,
    /// Logical access order; breaks `last_access_ms` ties deterministically.
    access_tick: u64,
}

impl MemoryEntry {
    fn is_expired(&self, now_ms: u64) -> bool {
        now_ms.saturating_sub(self.stored_at_ms) >= ttl_millis(self.ttl)
    }
}

#[derive(Debug, Default)]
struct TierState {
    entries: HashMap<String, MemoryEntry>,
    tick: u64,
}

impl TierState {
    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }
}

/// Result of a `MemoryTier::insert`.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct InsertOutcome {
    /// Keys evicted to make room, least recently used first.
    pub evicted: Vec<String>,
}

/// Capacity-bounded in-process tier with TTL and batched LRU eviction.
pub struct MemoryTier {
    state: Mutex<TierState>,
    max_entries: usize,
}

impl MemoryTier {
    pub fn new(max_entries: usize) -> Self {
        Self {
            state: Mutex::new(TierState::default()),
            max_entries: max_entries.max(1),
        }
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    pub fn get(&self, key: &str, now_ms: u64) -> Option<Vec<u8>> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let tick = state.next_tick();
        let entry = state.entries.get_mut(key)?;
        if entry.is_expired(now_ms) {
            state.entries.remove(key);
            return None;
        }
        entry.last_access_ms = now_ms;
        entry.access_tick = tick;
        Some(entry.data.clone())
    }

    /// Insert or overwrite. A new key arriving at capacity first evicts the
    /// least recently used tenth of the tier (at least one entry) in one batch.
    pub fn insert(&self, key: &str, data: Vec<u8>, ttl: Duration, now_ms: u64) -> InsertOutcome {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let mut outcome = InsertOutcome::default();
        if !state.entries.contains_key(key) && state.entries.len() >= self.max_entries {
            outcome.evicted = Self::evict_batch(&mut state.entries);
        }
        let tick = state.next_tick();
        state.entries.insert(
            key.to_string(),
            MemoryEntry {
                data,
                stored_at_ms: now_ms,
                ttl,
                last_access_ms: now_ms,
                access_tick: tick,
            },
        );
        outcome
    }

    fn evict_batch(entries: &mut HashMap<String, MemoryEntry>) -> Vec<String> {
        let batch = entries.len().div_ceil(10).max(1);
        let mut order: Vec<(u64, u64, &String)> = entries
            .iter()
            .map(|(k, e)| (e.last_access_ms, e.access_tick, k))
            .collect();
        // partial selection keeps the batch O(n)
        if batch < order.len() {
            order.select_nth_unstable(batch - 1);
            order.truncate(batch);
        }
        order.sort_unstable();
        let victims: Vec<String> = order.into_iter().map(|(_, _, k)| k.clone()).collect();
        for k in &victims {
            entries.remove(k);
        }
        victims
    }

    pub fn remove(&self, key: &str) -> bool {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .remove(key)
            .is_some()
    }

    /// Remove every key containing `substring`; returns the removed keys.
    pub fn remove_matching(&self, substring: &str) -> Vec<String> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let matched: Vec<String> = state
            .entries
            .keys()
            .filter(|k| k.contains(substring))
            .cloned()
            .collect();
        for k in &matched {
            state.entries.remove(k);
        }
        matched
    }

    /// Physically present entries, expired ones included.
    pub fn len(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .clear();
    }
}
