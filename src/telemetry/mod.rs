//! 成本与指标模块：按资源统计请求、缓存命中与节省的成本。
//!
//! # Cost and Metrics Module
//!
//! Every gateway call ends up here: admissions, cache hits and misses,
//! handler failures, and the money spent or saved per logical resource.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`CostTracker`] | Thread-safe accumulator of per-resource counters |
//! | [`CostSnapshot`] | Aggregated totals and ratios, flattenable for metrics backends |
//! | [`MetricsSink`] | Trait for snapshot destinations (push cadence) |
//! | [`NoopMetricsSink`] | Default sink, collects nothing |
//! | [`InMemoryMetricsSink`] | Bounded in-memory sink for tests |
//! | [`LogMetricsSink`] | Emits snapshots as `tracing` events |
//! | [`CompositeMetricsSink`] | Multi-destination fan-out |
//!
//! Ratios tolerate zero denominators: they read as `0.0`, never as an error.

mod cost;
mod sink;

pub(crate) use cost::sanitize_cost;
pub use cost::{AdmissionCounters, CostRecord, CostSnapshot, CostTracker, ResourceSnapshot};
pub use sink::{
    CompositeMetricsSink, InMemoryMetricsSink, LogMetricsSink, MetricsSink, NoopMetricsSink,
};
