//! Gateway configuration: defaults, YAML files and `GATEWAY_*` environment overrides.

use crate::cache::CacheConfig;
use crate::resilience::WindowPolicy;
use crate::{Error, ErrorContext, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

const ENV_PREFIX: &str = "GATEWAY_";

fn default_requests_per_minute() -> u32 {
    60
}
fn default_requests_per_hour() -> u32 {
    1000
}
fn default_requests_per_day() -> u32 {
    10000
}
fn default_burst_allowance() -> u32 {
    10
}
fn default_ttl_seconds() -> u64 {
    3600
}
fn default_max_cache_entries() -> usize {
    10_000
}
fn default_compression_threshold_bytes() -> usize {
    1024
}
fn default_true() -> bool {
    true
}
fn default_remote_timeout_ms() -> u64 {
    250
}
fn default_sweep_every_calls() -> u64 {
    1000
}
fn default_key_prefix() -> String {
    "gateway".into()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_requests_per_minute")]
    pub requests_per_minute: u32,
    #[serde(default = "default_requests_per_hour")]
    pub requests_per_hour: u32,
    #[serde(default = "default_requests_per_day")]
    pub requests_per_day: u32,
    #[serde(default = "default_burst_allowance")]
    pub burst_allowance: u32,

    #[serde(default = "default_true")]
    pub cache_enabled: bool,
    #[serde(default = "default_ttl_seconds")]
    pub default_ttl_seconds: u64,
    /// Per-endpoint TTL overrides, keyed by endpoint.
    #[serde(default)]
    pub endpoint_ttl_seconds: HashMap<String, u64>,
    #[serde(default = "default_max_cache_entries")]
    pub max_cache_entries: usize,
    #[serde(default = "default_compression_threshold_bytes")]
    pub compression_threshold_bytes: usize,
    #[serde(default)]
    pub compression_enabled: bool,

    /// Request headers that take part in cache keys (case-insensitive).
    #[serde(default)]
    pub vary_headers: Vec<String>,
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
    #[serde(default = "default_remote_timeout_ms")]
    pub remote_timeout_ms: u64,
    #[serde(default = "default_sweep_every_calls")]
    pub sweep_every_calls: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redis_url: Option<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: default_requests_per_minute(),
            requests_per_hour: default_requests_per_hour(),
            requests_per_day: default_requests_per_day(),
            burst_allowance: default_burst_allowance(),
            cache_enabled: true,
            default_ttl_seconds: default_ttl_seconds(),
            endpoint_ttl_seconds: HashMap::new(),
            max_cache_entries: default_max_cache_entries(),
            compression_threshold_bytes: default_compression_threshold_bytes(),
            compression_enabled: false,
            vary_headers: Vec::new(),
            key_prefix: default_key_prefix(),
            remote_timeout_ms: default_remote_timeout_ms(),
            sweep_every_calls: default_sweep_every_calls(),
            redis_url: None,
        }
    }
}

impl GatewayConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limits(mut self, per_minute: u32, per_hour: u32, per_day: u32) -> Self {
        self.requests_per_minute = per_minute;
        self.requests_per_hour = per_hour;
        self.requests_per_day = per_day;
        self
    }

    pub fn with_burst_allowance(mut self, burst: u32) -> Self {
        self.burst_allowance = burst;
        self
    }

    pub fn with_default_ttl(mut self, seconds: u64) -> Self {
        self.default_ttl_seconds = seconds;
        self
    }

    pub fn with_endpoint_ttl(mut self, endpoint: impl Into<String>, seconds: u64) -> Self {
        self.endpoint_ttl_seconds.insert(endpoint.into(), seconds);
        self
    }

    pub fn with_max_cache_entries(mut self, max: usize) -> Self {
        self.max_cache_entries = max;
        self
    }

    pub fn with_compression(mut self, enabled: bool, threshold_bytes: usize) -> Self {
        self.compression_enabled = enabled;
        self.compression_threshold_bytes = threshold_bytes;
        self
    }

    pub fn with_cache_enabled(mut self, enabled: bool) -> Self {
        self.cache_enabled = enabled;
        self
    }

    pub fn with_vary_header(mut self, header: impl Into<String>) -> Self {
        self.vary_headers.push(header.into());
        self
    }

    pub fn with_remote_timeout(mut self, timeout: Duration) -> Self {
        self.remote_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_sweep_every_calls(mut self, n: u64) -> Self {
        self.sweep_every_calls = n;
        self
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let cfg: Self = serde_yaml::from_str(yaml)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml_str(&content)
    }

    /// Defaults overlaid with `GATEWAY_*` variables from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::default().overlay_env(|name| std::env::var(name).ok())
    }

    /// Apply `GATEWAY_<FIELD>` overrides read through `lookup`.
    pub fn overlay_env<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |field: &str| lookup(&format!("{}{}", ENV_PREFIX, field.to_uppercase()));

        if let Some(v) = get("requests_per_minute") {
            self.requests_per_minute = parse_env("requests_per_minute", &v)?;
        }
        if let Some(v) = get("requests_per_hour") {
            self.requests_per_hour = parse_env("requests_per_hour", &v)?;
        }
        if let Some(v) = get("requests_per_day") {
            self.requests_per_day = parse_env("requests_per_day", &v)?;
        }
        if let Some(v) = get("burst_allowance") {
            self.burst_allowance = parse_env("burst_allowance", &v)?;
        }
        if let Some(v) = get("cache_enabled") {
            self.cache_enabled = parse_env("cache_enabled", &v)?;
        }
        if let Some(v) = get("default_ttl_seconds") {
            self.default_ttl_seconds = parse_env("default_ttl_seconds", &v)?;
        }
        if let Some(v) = get("max_cache_entries") {
            self.max_cache_entries = parse_env("max_cache_entries", &v)?;
        }
        if let Some(v) = get("compression_threshold_bytes") {
            self.compression_threshold_bytes = parse_env("compression_threshold_bytes", &v)?;
        }
        if let Some(v) = get("compression_enabled") {
            self.compression_enabled = parse_env("compression_enabled", &v)?;
        }
        if let Some(v) = get("vary_headers") {
            self.vary_headers = v
                .split(',')
                .map(|h| h.trim().to_string())
                .filter(|h| !h.is_empty())
                .collect();
        }
        if let Some(v) = get("key_prefix") {
            self.key_prefix = v;
        }
        if let Some(v) = get("remote_timeout_ms") {
            self.remote_timeout_ms = parse_env("remote_timeout_ms", &v)?;
        }
        if let Some(v) = get("sweep_every_calls") {
            self.sweep_every_calls = parse_env("sweep_every_calls", &v)?;
        }
        if let Some(v) = get("redis_url") {
            self.redis_url = Some(v).filter(|u| !u.trim().is_empty());
        }

        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        let nonzero = [
            ("requests_per_minute", self.requests_per_minute as u64),
            ("requests_per_hour", self.requests_per_hour as u64),
            ("requests_per_day", self.requests_per_day as u64),
            ("default_ttl_seconds", self.default_ttl_seconds),
            ("max_cache_entries", self.max_cache_entries as u64),
            ("remote_timeout_ms", self.remote_timeout_ms),
        ];
        for (field, value) in nonzero {
            if value == 0 {
                return Err(Error::configuration_with_context(
                    "value must be greater than zero",
                    ErrorContext::new()
                        .with_field_path(field)
                        .with_source("config"),
                ));
            }
        }
        if let Some((endpoint, _)) = self.endpoint_ttl_seconds.iter().find(|(_, ttl)| **ttl == 0) {
            return Err(Error::configuration_with_context(
                "endpoint TTL must be greater than zero",
                ErrorContext::new()
                    .with_field_path(format!("endpoint_ttl_seconds.{}", endpoint))
                    .with_source("config"),
            ));
        }
        Ok(())
    }

    pub fn window_policy(&self) -> WindowPolicy {
        WindowPolicy::new(
            self.requests_per_minute,
            self.requests_per_hour,
            self.requests_per_day,
        )
        .with_burst_allowance(self.burst_allowance)
    }

    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig::new()
            .with_enabled(self.cache_enabled)
            .with_ttl(Duration::from_secs(self.default_ttl_seconds))
            .with_max_entries(self.max_cache_entries)
            .with_key_prefix(self.key_prefix.clone())
            .with_remote_timeout(self.remote_timeout())
            .with_compression(self.compression_enabled, self.compression_threshold_bytes)
    }

    pub fn remote_timeout(&self) -> Duration {
        Duration::from_millis(self.remote_timeout_ms)
    }

    /// TTL for responses from `endpoint`: the override if present, else the default.
    pub fn ttl_for(&self, endpoint: &str) -> Duration {
        let secs = self
            .endpoint_ttl_seconds
            .get(endpoint)
            .copied()
            .unwrap_or(self.default_ttl_seconds);
        Duration::from_secs(secs)
    }
}

fn parse_env<T: std::str::FromStr>(field: &str, raw: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    raw.trim().parse::<T>().map_err(|e| {
        Error::configuration_with_context(
            format!("invalid value {:?}", raw),
            ErrorContext::new()
                .with_field_path(format!("{}{}", ENV_PREFIX, field.to_uppercase()))
                .with_details(e.to_string())
                .with_source("config"),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let c = GatewayConfig::default();
        assert_eq!(
            (c.requests_per_minute, c.requests_per_hour, c.requests_per_day, c.burst_allowance),
            (60, 1000, 10000, 10)
        );
        assert_eq!(c.compression_threshold_bytes, 1024);
        assert!(!c.compression_enabled);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn test_yaml_partial_overrides() {
        let yaml = r#"
requests_per_minute: 3
burst_allowance: 1
compression_enabled: true
endpoint_ttl_seconds:
  /v1/lessons: 120
vary_headers: [accept-language]
"#;
        let c = GatewayConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(c.requests_per_minute, 3);
        assert_eq!(c.requests_per_hour, 1000);
        assert_eq!(c.ttl_for("/v1/lessons"), Duration::from_secs(120));
        assert_eq!(c.ttl_for("/v1/other"), Duration::from_secs(3600));
        assert_eq!(c.window_policy().burst_allowance, 1);
        assert!(c.cache_config().compression_enabled);
    }

    #[test]
    fn test_env_overlay() {
        let env: HashMap<&str, &str> = [
            ("GATEWAY_REQUESTS_PER_MINUTE", "5"),
            ("GATEWAY_VARY_HEADERS", "accept-language, x-tenant"),
            ("GATEWAY_COMPRESSION_ENABLED", "true"),
        ]
        .into_iter()
        .collect();
        let c = GatewayConfig::default()
            .overlay_env(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(c.requests_per_minute, 5);
        assert_eq!(c.vary_headers, vec!["accept-language", "x-tenant"]);
        assert!(c.compression_enabled);
    }

    #[test]
    fn test_env_parse_error_names_variable() {
        let err = GatewayConfig::default()
            .overlay_env(|k| (k == "GATEWAY_BURST_ALLOWANCE").then(|| "lots".to_string()))
            .unwrap_err();
        let ctx = err.context().unwrap();
        assert_eq!(ctx.field_path.as_deref(), Some("GATEWAY_BURST_ALLOWANCE"));
    }

    #[test]
    fn test_validation_rejects_zero() {
        let err = GatewayConfig::from_yaml_str("max_cache_entries: 0").unwrap_err();
        assert!(matches!(err, Error::Configuration { .. }));
        assert!(GatewayConfig::default()
            .with_endpoint_ttl("/x", 0)
            .validate()
            .is_err());
    }
}
