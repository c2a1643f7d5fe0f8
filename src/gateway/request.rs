//! Requests entering the gateway and the handler seam they are forwarded to.

use crate::{Error, ErrorContext};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

const ANONYMOUS: &str = "anonymous";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Head,
    Options,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Options => "OPTIONS",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        }
    }

    /// Methods whose responses may be cached without an explicit override.
    pub fn is_side_effect_free(&self) -> bool {
        matches!(self, Method::Get | Method::Head)
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "GET" => Ok(Method::Get),
            "HEAD" => Ok(Method::Head),
            "OPTIONS" => Ok(Method::Options),
            "POST" => Ok(Method::Post),
            "PUT" => Ok(Method::Put),
            "PATCH" => Ok(Method::Patch),
            "DELETE" => Ok(Method::Delete),
            other => Err(Error::validation_with_context(
                format!("unsupported method {:?}", other),
                ErrorContext::new()
                    .with_field_path("method")
                    .with_source("gateway"),
            )),
        }
    }
}

/// Free-text request for generated content: topic, variant (e.g. "lesson",
/// "quiz") and locale. Keys derive from the normalized topic, not the raw text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SemanticQuery {
    pub topic: String,
    pub variant: String,
    pub locale: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayRequest {
    pub method: Method,
    pub endpoint: String,
    /// Logical resource the cost is booked against. Defaults to the endpoint.
    pub resource: Option<String>,
    /// Explicit caller id (API key, user id). Wins over client address headers.
    pub caller: Option<String>,
    /// Header names are stored lower-cased.
    pub headers: BTreeMap<String, String>,
    pub body: serde_json::Value,
    pub query: Option<SemanticQuery>,
    side_effect_free: Option<bool>,
}

impl GatewayRequest {
    pub fn new(method: Method, endpoint: impl Into<String>) -> Self {
        Self {
            method,
            endpoint: endpoint.into(),
            resource: None,
            caller: None,
            headers: BTreeMap::new(),
            body: serde_json::Value::Null,
            query: None,
            side_effect_free: None,
        }
    }

    pub fn get(endpoint: impl Into<String>) -> Self {
        Self::new(Method::Get, endpoint)
    }

    pub fn post(endpoint: impl Into<String>) -> Self {
        Self::new(Method::Post, endpoint)
    }

    pub fn with_resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = Some(resource.into());
        self
    }

    pub fn with_caller(mut self, caller: impl Into<String>) -> Self {
        self.caller = Some(caller.into());
        self
    }

    pub fn with_header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.headers
            .insert(name.as_ref().to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        self.body = body;
        self
    }

    pub fn with_query(
        mut self,
        topic: impl Into<String>,
        variant: impl Into<String>,
        locale: impl Into<String>,
    ) -> Self {
        self.query = Some(SemanticQuery {
            topic: topic.into(),
            variant: variant.into(),
            locale: locale.into(),
        });
        self
    }

    /// Mark a non-GET call (e.g. a POST that only generates content) as safe
    /// to cache, or opt a GET out of caching.
    pub fn side_effect_free(mut self, value: bool) -> Self {
        self.side_effect_free = Some(value);
        self
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn resource(&self) -> &str {
        self.resource.as_deref().unwrap_or(&self.endpoint)
    }

    /// Rate-limit identifier: explicit caller, then `x-real-ip`, then the first
    /// `x-forwarded-for` hop, then `"anonymous"`.
    pub fn caller_identity(&self) -> String {
        let non_empty = |s: &str| {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        };
        self.caller
            .as_deref()
            .and_then(non_empty)
            .or_else(|| self.header("x-real-ip").and_then(non_empty))
            .or_else(|| {
                self.header("x-forwarded-for")
                    .and_then(|v| v.split(',').find_map(non_empty))
            })
            .unwrap_or_else(|| ANONYMOUS.to_string())
    }

    pub fn is_cacheable(&self) -> bool {
        self.side_effect_free
            .unwrap_or_else(|| self.method.is_side_effect_free())
    }
}

/// What a handler returns: the response body and the estimated cost of producing it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandlerOutput {
    pub body: serde_json::Value,
    pub cost: f64,
}

impl HandlerOutput {
    pub fn new(body: serde_json::Value, cost: f64) -> Self {
        Self { body, cost }
    }
}

/// The expensive, billable operation the gateway protects.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn invoke(&self, request: &GatewayRequest) -> anyhow::Result<HandlerOutput>;
}
