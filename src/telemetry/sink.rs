//! Metrics sinks: destinations for [`CostSnapshot`]s.

use super::cost::CostSnapshot;
use crate::Result;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

#[async_trait]
pub trait MetricsSink: Send + Sync {
    async fn publish(&self, snapshot: &CostSnapshot) -> Result<()>;

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Discards everything.
pub struct NoopMetricsSink;

#[async_trait]
impl MetricsSink for NoopMetricsSink {
    async fn publish(&self, _snapshot: &CostSnapshot) -> Result<()> {
        Ok(())
    }
}

/// Keeps the last `max` snapshots, for tests and local inspection.
pub struct InMemoryMetricsSink {
    snapshots: Mutex<VecDeque<CostSnapshot>>,
    max_snapshots: usize,
}

impl InMemoryMetricsSink {
    pub fn new(max: usize) -> Self {
        Self {
            snapshots: Mutex::new(VecDeque::new()),
            max_snapshots: max.max(1),
        }
    }

    pub fn latest(&self) -> Option<CostSnapshot> {
        self.snapshots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .back()
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.snapshots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl MetricsSink for InMemoryMetricsSink {
    async fn publish(&self, snapshot: &CostSnapshot) -> Result<()> {
        let mut snapshots = self.snapshots.lock().unwrap_or_else(PoisonError::into_inner);
        snapshots.push_back(snapshot.clone());
        while snapshots.len() > self.max_snapshots {
            snapshots.pop_front();
        }
        Ok(())
    }
}

/// Emits each snapshot as one structured `tracing` event.
pub struct LogMetricsSink {
    target: String,
}

impl LogMetricsSink {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
        }
    }
}

impl Default for LogMetricsSink {
    fn default() -> Self {
        Self::new("gateway.metrics")
    }
}

#[async_trait]
impl MetricsSink for LogMetricsSink {
    async fn publish(&self, snapshot: &CostSnapshot) -> Result<()> {
        let flat = serde_json::to_string(&snapshot.to_flat_map())?;
        tracing::info!(
            sink = %self.target,
            requests = snapshot.total_requests,
            hit_rate = snapshot.hit_rate,
            cost_saved = snapshot.total_saved,
            metrics = %flat,
            "gateway metrics"
        );
        Ok(())
    }
}

/// Fans out to several sinks; one failing sink does not stop the others.
#[derive(Default)]
pub struct CompositeMetricsSink {
    sinks: Vec<Arc<dyn MetricsSink>>,
}

impl CompositeMetricsSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_sink(mut self, sink: Arc<dyn MetricsSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

#[async_trait]
impl MetricsSink for CompositeMetricsSink {
    async fn publish(&self, snapshot: &CostSnapshot) -> Result<()> {
        for s in &self.sinks {
            if let Err(e) = s.publish(snapshot).await {
                tracing::warn!(error = %e, "metrics sink failed");
            }
        }
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        for s in &self.sinks {
            let _ = s.close().await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_sink_is_bounded() {
        let sink = InMemoryMetricsSink::new(2);
        for n in 0..3u64 {
            let snap = CostSnapshot {
                total_requests: n,
                ..Default::default()
            };
            sink.publish(&snap).await.unwrap();
        }
        assert_eq!(sink.len(), 2);
        assert_eq!(sink.latest().unwrap().total_requests, 2);
    }

    #[tokio::test]
    async fn test_composite_fans_out() {
        let a = Arc::new(InMemoryMetricsSink::new(10));
        let b = Arc::new(InMemoryMetricsSink::new(10));
        let composite = CompositeMetricsSink::new()
            .add_sink(a.clone())
            .add_sink(Arc::new(NoopMetricsSink))
            .add_sink(b.clone())
            .add_sink(Arc::new(LogMetricsSink::default()));
        composite.publish(&CostSnapshot::default()).await.unwrap();
        composite.close().await.unwrap();
        assert_eq!((a.len(), b.len()), (1, 1));
    }
}
