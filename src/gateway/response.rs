//! Responses and the admission fields surfaced with them.

use crate::resilience::{RateLimitDecision, ResetTimes, WindowCounts};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    ServedFromCache,
    ServedFresh,
}

impl Outcome {
    pub fn is_cached(self) -> bool {
        matches!(self, Outcome::ServedFromCache)
    }
}

/// Admission metadata for one call, ready to be turned into response headers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdmissionHeaders {
    pub allowed: bool,
    pub limit: WindowCounts,
    pub remaining: WindowCounts,
    pub reset_at: ResetTimes,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_seconds: Option<u64>,
    pub burst_used: bool,
    pub cached: bool,
    pub processing_time_ms: u64,
}

impl AdmissionHeaders {
    pub fn from_decision(decision: &RateLimitDecision, cached: bool, processing_time_ms: u64) -> Self {
        Self {
            allowed: decision.allowed,
            limit: decision.limits,
            remaining: decision.remaining(),
            reset_at: decision.reset_at,
            retry_after_seconds: decision.retry_after_seconds(),
            burst_used: decision.burst_used,
            cached,
            processing_time_ms,
        }
    }

    /// HTTP header rendering. The unsuffixed `X-RateLimit-*` trio reports the
    /// minute window; `-Hour` and `-Day` variants carry the others.
    pub fn header_pairs(&self) -> Vec<(String, String)> {
        let mut out = vec![
            ("X-RateLimit-Limit".to_string(), self.limit.minute.to_string()),
            ("X-RateLimit-Remaining".to_string(), self.remaining.minute.to_string()),
            ("X-RateLimit-Reset".to_string(), self.reset_at.minute.to_string()),
            ("X-RateLimit-Limit-Hour".to_string(), self.limit.hour.to_string()),
            ("X-RateLimit-Remaining-Hour".to_string(), self.remaining.hour.to_string()),
            ("X-RateLimit-Reset-Hour".to_string(), self.reset_at.hour.to_string()),
            ("X-RateLimit-Limit-Day".to_string(), self.limit.day.to_string()),
            ("X-RateLimit-Remaining-Day".to_string(), self.remaining.day.to_string()),
            ("X-RateLimit-Reset-Day".to_string(), self.reset_at.day.to_string()),
        ];
        if self.burst_used {
            out.push(("X-RateLimit-Burst".to_string(), "used".to_string()));
        }
        if let Some(secs) = self.retry_after_seconds {
            out.push(("Retry-After".to_string(), secs.to_string()));
        }
        if self.allowed {
            let cache = if self.cached { "HIT" } else { "MISS" };
            out.push(("X-Cache".to_string(), cache.to_string()));
        }
        out.push((
            "X-Processing-Time-Ms".to_string(),
            self.processing_time_ms.to_string(),
        ));
        out
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayResponse {
    pub request_id: String,
    pub body: serde_json::Value,
    pub outcome: Outcome,
    pub admission: AdmissionHeaders,
}

impl GatewayResponse {
    pub fn is_cached(&self) -> bool {
        self.outcome.is_cached()
    }
}
