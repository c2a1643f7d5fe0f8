//! Per-resource cost and hit-rate accounting.

use crate::resilience::RateLimitDecision;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, PoisonError};

fn percentage(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0.0 {
        numerator / denominator * 100.0
    } else {
        0.0
    }
}

/// Running totals for one logical resource (e.g. a model name).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CostRecord {
    pub requests_total: u64,
    pub cache_hits: u64,
    pub failures: u64,
    pub cost_incurred: f64,
    pub cost_saved: f64,
}

impl CostRecord {
    /// Saved cost relative to what was actually paid. 0 when nothing was paid.
    pub fn cost_reduction_percentage(&self) -> f64 {
        percentage(self.cost_saved, self.cost_incurred)
    }

    /// Saved cost as a share of what would have been paid without the cache.
    pub fn savings_share_percentage(&self) -> f64 {
        percentage(self.cost_saved, self.cost_saved + self.cost_incurred)
    }

    pub fn hit_rate(&self) -> f64 {
        if self.requests_total == 0 {
            0.0
        } else {
            self.cache_hits as f64 / self.requests_total as f64
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdmissionCounters {
    pub admitted: u64,
    pub burst_admitted: u64,
    pub rejected: u64,
    /// Admitted because the history store was unavailable.
    pub degraded: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceSnapshot {
    #[serde(flatten)]
    pub record: CostRecord,
    pub cost_reduction_percentage: f64,
    pub savings_share_percentage: f64,
    pub hit_rate: f64,
}

impl From<&CostRecord> for ResourceSnapshot {
    fn from(record: &CostRecord) -> Self {
        Self {
            record: record.clone(),
            cost_reduction_percentage: record.cost_reduction_percentage(),
            savings_share_percentage: record.savings_share_percentage(),
            hit_rate: record.hit_rate(),
        }
    }
}

/// Point-in-time aggregate, the unit handed to metrics sinks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CostSnapshot {
    pub total_cost: f64,
    pub total_saved: f64,
    pub total_requests: u64,
    pub total_hits: u64,
    pub total_failures: u64,
    pub cost_reduction_percentage: f64,
    pub savings_share_percentage: f64,
    pub hit_rate: f64,
    pub admission: AdmissionCounters,
    pub per_resource: BTreeMap<String, ResourceSnapshot>,
}

impl CostSnapshot {
    /// Flat `name -> value` view for scrape/push metrics backends.
    pub fn to_flat_map(&self) -> BTreeMap<String, f64> {
        let mut m = BTreeMap::new();
        m.insert("cost.incurred".into(), self.total_cost);
        m.insert("cost.saved".into(), self.total_saved);
        m.insert("cost.reduction_pct".into(), self.cost_reduction_percentage);
        m.insert("cost.savings_share_pct".into(), self.savings_share_percentage);
        m.insert("requests.total".into(), self.total_requests as f64);
        m.insert("requests.cache_hits".into(), self.total_hits as f64);
        m.insert("requests.failures".into(), self.total_failures as f64);
        m.insert("requests.hit_rate".into(), self.hit_rate);
        m.insert("admission.admitted".into(), self.admission.admitted as f64);
        m.insert("admission.burst_admitted".into(), self.admission.burst_admitted as f64);
        m.insert("admission.rejected".into(), self.admission.rejected as f64);
        m.insert("admission.degraded".into(), self.admission.degraded as f64);
        for (name, r) in &self.per_resource {
            m.insert(format!("resource.{name}.requests"), r.record.requests_total as f64);
            m.insert(format!("resource.{name}.cache_hits"), r.record.cache_hits as f64);
            m.insert(format!("resource.{name}.failures"), r.record.failures as f64);
            m.insert(format!("resource.{name}.cost_incurred"), r.record.cost_incurred);
            m.insert(format!("resource.{name}.cost_saved"), r.record.cost_saved);
            m.insert(format!("resource.{name}.reduction_pct"), r.cost_reduction_percentage);
            m.insert(format!("resource.{name}.hit_rate"), r.hit_rate);
        }
        m
    }
}

#[derive(Debug, Default)]
struct TrackerState {
    resources: HashMap<String, CostRecord>,
    admission: AdmissionCounters,
}

/// Accumulates call outcomes. Counters only grow; they live as long as the process.
#[derive(Debug, Default)]
pub struct CostTracker {
    state: Mutex<TrackerState>,
}

/// Invalid estimates (negative, NaN, infinite) are booked as zero.
pub(crate) fn sanitize_cost(resource: &str, cost: f64) -> f64 {
    if cost.is_finite() && cost >= 0.0 {
        cost
    } else {
        tracing::warn!(resource, cost, "ignoring invalid cost estimate");
        0.0
    }
}

impl CostTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a served call. `cost` is what was paid on a miss, or the
    /// estimate of the avoided call on a cache hit.
    pub fn record_outcome(&self, resource: &str, cost: f64, was_cache_hit: bool) {
        let cost = sanitize_cost(resource, cost);
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let record = state.resources.entry(resource.to_string()).or_default();
        record.requests_total += 1;
        if was_cache_hit {
            record.cache_hits += 1;
            record.cost_saved += cost;
        } else {
            record.cost_incurred += cost;
        }
    }

    pub fn record_failure(&self, resource: &str) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let record = state.resources.entry(resource.to_string()).or_default();
        record.requests_total += 1;
        record.failures += 1;
    }

    pub fn record_admission(&self, decision: &RateLimitDecision) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let a = &mut state.admission;
        if !decision.allowed {
            a.rejected += 1;
            return;
        }
        a.admitted += 1;
        if decision.burst_used {
            a.burst_admitted += 1;
        }
        if decision.degraded {
            a.degraded += 1;
        }
    }

    pub fn record(&self, resource: &str) -> Option<CostRecord> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .resources
            .get(resource)
            .cloned()
    }

    pub fn snapshot(&self) -> CostSnapshot {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let mut total = CostRecord::default();
        let mut per_resource = BTreeMap::new();
        for (name, r) in &state.resources {
            total.requests_total += r.requests_total;
            total.cache_hits += r.cache_hits;
            total.failures += r.failures;
            total.cost_incurred += r.cost_incurred;
            total.cost_saved += r.cost_saved;
            per_resource.insert(name.clone(), ResourceSnapshot::from(r));
        }
        CostSnapshot {
            total_cost: total.cost_incurred,
            total_saved: total.cost_saved,
            total_requests: total.requests_total,
            total_hits: total.cache_hits,
            total_failures: total.failures,
            cost_reduction_percentage: total.cost_reduction_percentage(),
            savings_share_percentage: total.savings_share_percentage(),
            hit_rate: total.hit_rate(),
            admission: state.admission,
            per_resource,
        }
    }
}
