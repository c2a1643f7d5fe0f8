//! Cache key normalization.

use crate::gateway::GatewayRequest;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

static NON_WORD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^\p{L}\p{N}\s]").expect("static pattern"));
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("static pattern"));

/// Leading phrases that do not change what is being asked for.
const NULL_PREFIXES: &[&str] = &[
    "introduction to ",
    "intro to ",
    "basics of ",
    "fundamentals of ",
    "overview of ",
    "a guide to ",
    "guide to ",
    "learn ",
];

const SEPARATOR: &str = "|";

/// A normalized cache key: a plain namespace (usually the endpoint) plus a digest.
///
/// The namespace stays readable so families can be busted with
/// `TieredCache::invalidate_pattern`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    pub namespace: String,
    pub hash: String,
}

impl CacheKey {
    pub fn new(namespace: impl Into<String>, hash: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            hash: hash.into(),
        }
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.namespace, self.hash)
    }
}

fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

/// Canonical form of a free-text topic.
///
/// Lowercases, drops punctuation, collapses whitespace and strips null
/// prefixes until none is left. Applying it twice yields the same string.
pub fn canonical_topic(raw: &str) -> String {
    let lowered = raw.to_lowercase();
    let stripped = NON_WORD.replace_all(&lowered, "");
    let mut topic = WHITESPACE.replace_all(stripped.trim(), " ").into_owned();

    loop {
        let before = topic.len();
        for prefix in NULL_PREFIXES {
            if let Some(rest) = topic.strip_prefix(prefix) {
                topic = rest.trim_start().to_string();
            }
        }
        if topic.len() == before {
            break;
        }
    }
    topic
}

/// Deterministic, side-effect free key derivation.
#[derive(Debug, Clone, Default)]
pub struct KeyNormalizer {
    salt: Option<String>,
}

impl KeyNormalizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Salt mixed into every digest. Changing it retires the whole key space.
    pub fn with_salt(mut self, salt: impl Into<String>) -> Self {
        self.salt = Some(salt.into());
        self
    }

    /// 64-char hex digest of `topic | variant | locale` after canonicalization.
    pub fn normalize(&self, raw_topic: &str, variant: &str, locale: &str) -> String {
        let mut joined = [
            canonical_topic(raw_topic),
            variant.trim().to_lowercase(),
            locale.trim().to_lowercase(),
        ]
        .join(SEPARATOR);
        if let Some(ref s) = self.salt {
            joined.push_str(SEPARATOR);
            joined.push_str(s);
        }
        sha256_hex(&joined)
    }

    /// Key for a gateway request: method, endpoint, the `vary_headers` that are
    /// present, and either the normalized semantic query or the JSON body.
    pub fn request_key(&self, request: &GatewayRequest, vary_headers: &[String]) -> CacheKey {
        let headers: BTreeMap<String, &str> = vary_headers
            .iter()
            .map(|h| h.to_lowercase())
            .filter_map(|h| request.header(&h).map(|v| (h, v.trim())))
            .collect();

        let payload = match request.query {
            Some(ref q) => serde_json::Value::String(self.normalize(&q.topic, &q.variant, &q.locale)),
            None => request.body.clone(),
        };

        let mut parts: BTreeMap<&str, serde_json::Value> = BTreeMap::new();
        parts.insert("method", request.method.as_str().into());
        parts.insert("endpoint", request.endpoint.clone().into());
        parts.insert("headers", serde_json::json!(headers));
        parts.insert("payload", payload);
        if let Some(ref s) = self.salt {
            parts.insert("salt", s.clone().into());
        }
        // serde_json object keys are sorted, so nested bodies are canonical too
        let canonical = serde_json::to_string(&parts).unwrap_or_default();
        CacheKey::new(request.endpoint.clone(), sha256_hex(&canonical))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::GatewayRequest;

    #[test]
    fn test_prefix_insensitive() {
        let n = KeyNormalizer::new();
        assert_eq!(
            n.normalize("Introduction to Algebra", "lesson", "en"),
            n.normalize("algebra", "lesson", "en")
        );
        assert_eq!(
            n.normalize("  Learn   the Basics of   ALGEBRA!! ", "lesson", "en"),
            n.normalize("the basics of algebra", "lesson", "en")
        );
        assert_eq!(
            n.normalize("A guide to: learn Algebra?", "lesson", "EN "),
            n.normalize("algebra", "lesson", "en")
        );
    }

    #[test]
    fn test_canonical_topic_idempotent() {
        for raw in [
            "Introduction to learn Rust",
            "guide to   guide to  C++",
            "¿Qué es Álgebra?",
            "learn",
            "",
        ] {
            let once = canonical_topic(raw);
            assert_eq!(canonical_topic(&once), once, "input: {raw:?}");
        }
        assert_eq!(canonical_topic("Introduction to learn Rust"), "rust");
        assert_eq!(canonical_topic("learn"), "learn");
        assert_eq!(canonical_topic("¿Qué es Álgebra?"), "qué es álgebra");
    }

    #[test]
    fn test_digest_shape_and_discrimination() {
        let n = KeyNormalizer::new();
        let k = n.normalize("algebra", "lesson", "en");
        assert_eq!(k.len(), 64);
        assert!(k.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(k, n.normalize("algebra", "quiz", "en"));
        assert_ne!(k, n.normalize("algebra", "lesson", "fr"));
        assert_ne!(k, KeyNormalizer::new().with_salt("v2").normalize("algebra", "lesson", "en"));
    }

    #[test]
    fn test_request_key_ignores_body_field_order_and_unlisted_headers() {
        let n = KeyNormalizer::new();
        let vary = vec!["Accept-Language".to_string()];
        let a = GatewayRequest::get("/v1/lessons")
            .with_body(serde_json::json!({"a": 1, "b": {"x": true, "y": null}}))
            .with_header("accept-language", "en")
            .with_header("x-request-id", "1");
        let b = GatewayRequest::get("/v1/lessons")
            .with_body(serde_json::json!({"b": {"y": null, "x": true}, "a": 1}))
            .with_header("Accept-Language", "en")
            .with_header("x-request-id", "2");
        assert_eq!(n.request_key(&a, &vary), n.request_key(&b, &vary));

        let c = a.clone().with_header("accept-language", "de");
        assert_ne!(n.request_key(&a, &vary), n.request_key(&c, &vary));
        assert!(n.request_key(&a, &vary).to_string().starts_with("/v1/lessons:"));
    }

    #[test]
    fn test_request_key_uses_semantic_query() {
        let n = KeyNormalizer::new();
        let a = GatewayRequest::post("/v1/generate").with_query("Introduction to Algebra", "lesson", "en");
        let b = GatewayRequest::post("/v1/generate").with_query("algebra", "lesson", "en");
        assert_eq!(n.request_key(&a, &[]), n.request_key(&b, &[]));
    }
}
