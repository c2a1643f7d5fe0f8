use crate::gateway::AdmissionHeaders;
use crate::resilience::RateLimitDecision;
use std::time::Duration;
use thiserror::Error;

/// Structured error context for better error handling and debugging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorContext {
    /// Field path or configuration key that caused the error (e.g., "requests_per_minute")
    pub field_path: Option<String>,
    /// Additional context about the error (e.g., expected range, actual value)
    pub details: Option<String>,
    /// Source of the error (e.g., "config", "gateway")
    pub source: Option<String>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self {
            field_path: None,
            details: None,
            source: None,
        }
    }

    pub fn with_field_path(mut self, path: impl Into<String>) -> Self {
        self.field_path = Some(path.into());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

impl Default for ErrorContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Failure of an infrastructure tier (remote cache, shared history store).
///
/// Never surfaced by the gateway: every `TierError` degrades to "tier absent".
#[derive(Debug, Clone, Error)]
pub enum TierError {
    #[error("tier unavailable: {0}")]
    Unavailable(String),

    #[error("tier timed out after {0:?}")]
    Timeout(Duration),

    #[error("tier backend error: {0}")]
    Backend(String),
}

/// Unified error type for the gateway.
#[derive(Debug, Error)]
pub enum Error {
    #[error("admission rejected: retry after {}s", .0.retry_after_seconds().unwrap_or(0))]
    AdmissionRejected(Box<RateLimitDecision>),

    #[error("handler failed: {0}")]
    Handler(#[source] anyhow::Error),

    #[error("Configuration error: {message}{}", format_context(.context))]
    Configuration {
        message: String,
        context: ErrorContext,
    },

    #[error("Validation error: {message}{}", format_context(.context))]
    Validation {
        message: String,
        context: ErrorContext,
    },

    #[error("Runtime error: {message}{}", format_context(.context))]
    Runtime {
        message: String,
        context: ErrorContext,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

// Helper function to format error context for display
fn format_context(ctx: &ErrorContext) -> String {
    let mut parts = Vec::new();
    if let Some(ref field) = ctx.field_path {
        parts.push(format!("field: {}", field));
    }
    if let Some(ref details) = ctx.details {
        parts.push(format!("details: {}", details));
    }
    if let Some(ref source) = ctx.source {
        parts.push(format!("source: {}", source));
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!(" ({})", parts.join(", "))
    }
}

impl Error {
    /// Create a new runtime error with structured context
    pub fn runtime_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Runtime {
            message: msg.into(),
            context,
        }
    }

    /// Create a new validation error with structured context
    pub fn validation_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Validation {
            message: msg.into(),
            context,
        }
    }

    /// Create a new configuration error with structured context
    pub fn configuration_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Configuration {
            message: msg.into(),
            context,
        }
    }

    /// Extract error context if available
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            Error::Configuration { context, .. }
            | Error::Validation { context, .. }
            | Error::Runtime { context, .. } => Some(context),
            _ => None,
        }
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, Error::AdmissionRejected(_))
    }

    /// The limiter decision behind an `AdmissionRejected` error.
    pub fn decision(&self) -> Option<&RateLimitDecision> {
        match self {
            Error::AdmissionRejected(d) => Some(d),
            _ => None,
        }
    }

    /// Admission fields for a rejected call, ready to be rendered as headers.
    pub fn admission_headers(&self) -> Option<AdmissionHeaders> {
        self.decision()
            .map(|d| AdmissionHeaders::from_decision(d, false, 0))
    }
}
