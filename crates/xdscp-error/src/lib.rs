// SPDX-License-Identifier: MIT OR Apache-2.0
//! Shared error taxonomy for the control plane.
//!
//! Every crate in the workspace funnels its leaf errors into [`XdscpError`]
//! at its public boundary, the way a typed local error converts into one
//! umbrella error the HTTP layer can render consistently.

use std::collections::BTreeMap;
use std::error::Error as StdError;
use std::fmt;

/// Broad grouping of an [`ErrorCode`], used for metrics tagging and
/// dispatch in the HTTP layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ErrorCategory {
    Load,
    Render,
    Deserialise,
    Auth,
    Source,
    Cache,
    Timeout,
    Queue,
    Config,
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorCategory::Load => "load",
            ErrorCategory::Render => "render",
            ErrorCategory::Deserialise => "deserialise",
            ErrorCategory::Auth => "auth",
            ErrorCategory::Source => "source",
            ErrorCategory::Cache => "cache",
            ErrorCategory::Timeout => "timeout",
            ErrorCategory::Queue => "queue",
            ErrorCategory::Config => "config",
            ErrorCategory::Internal => "internal",
        };
        f.write_str(s)
    }
}

/// The recognised error kinds from the error handling design (section 7).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// A Loadable could not retrieve or deserialise its value and no
    /// default was configured.
    LoadError,
    /// A template raised or produced output that wasn't a resource map.
    RenderError,
    /// Rendered template text failed to parse as YAML/JSON.
    DeserialiseError,
    /// The encrypted auth field was malformed or invalid.
    AuthError,
    /// A source implementation returned an error while polling.
    SourceError,
    /// The remote cache backend was unavailable.
    CacheError,
    /// A render subprocess exceeded its wall-clock budget and was killed.
    TimeoutError,
    /// A registration arrived while the render queue was at capacity.
    QueueFull,
    /// Configuration failed to load or validate.
    ConfigError,
    /// Anything that doesn't fit the above; should be rare.
    InternalError,
}

impl ErrorCode {
    /// The category this code belongs to.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            ErrorCode::LoadError => ErrorCategory::Load,
            ErrorCode::RenderError => ErrorCategory::Render,
            ErrorCode::DeserialiseError => ErrorCategory::Deserialise,
            ErrorCode::AuthError => ErrorCategory::Auth,
            ErrorCode::SourceError => ErrorCategory::Source,
            ErrorCode::CacheError => ErrorCategory::Cache,
            ErrorCode::TimeoutError => ErrorCategory::Timeout,
            ErrorCode::QueueFull => ErrorCategory::Queue,
            ErrorCode::ConfigError => ErrorCategory::Config,
            ErrorCode::InternalError => ErrorCategory::Internal,
        }
    }

    /// The HTTP status this error kind maps to at the outward request
    /// boundary, per section 6/7 of the spec.
    #[must_use]
    pub fn http_status(&self) -> u16 {
        match self {
            ErrorCode::AuthError => 400,
            ErrorCode::DeserialiseError => 400,
            ErrorCode::QueueFull => 429,
            ErrorCode::LoadError
            | ErrorCode::RenderError
            | ErrorCode::SourceError
            | ErrorCode::CacheError
            | ErrorCode::TimeoutError
            | ErrorCode::ConfigError
            | ErrorCode::InternalError => 500,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::LoadError => "LOAD_ERROR",
            ErrorCode::RenderError => "RENDER_ERROR",
            ErrorCode::DeserialiseError => "DESERIALISE_ERROR",
            ErrorCode::AuthError => "AUTH_ERROR",
            ErrorCode::SourceError => "SOURCE_ERROR",
            ErrorCode::CacheError => "CACHE_ERROR",
            ErrorCode::TimeoutError => "TIMEOUT_ERROR",
            ErrorCode::QueueFull => "QUEUE_FULL",
            ErrorCode::ConfigError => "CONFIG_ERROR",
            ErrorCode::InternalError => "INTERNAL_ERROR",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The umbrella error type carried across crate boundaries.
///
/// Mirrors the shape consumed by the HTTP layer: a stable code, a
/// human-readable message, optional structured context (never tracebacks —
/// those stay in logs), and an optional wrapped cause for `source()`.
pub struct XdscpError {
    code: ErrorCode,
    message: String,
    source: Option<Box<dyn StdError + Send + Sync>>,
    context: BTreeMap<String, serde_json::Value>,
}

impl XdscpError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            source: None,
            context: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_context(mut self, key: impl Into<String>, value: impl serde::Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.context.insert(key.into(), v);
        }
        self
    }

    #[must_use]
    pub fn with_source(mut self, source: impl StdError + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    #[must_use]
    pub fn code(&self) -> ErrorCode {
        self.code
    }

    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        self.code.category()
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    #[must_use]
    pub fn context(&self) -> &BTreeMap<String, serde_json::Value> {
        &self.context
    }
}

impl fmt::Debug for XdscpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("XdscpError")
            .field("code", &self.code)
            .field("message", &self.message)
            .field("context", &self.context)
            .finish()
    }
}

impl fmt::Display for XdscpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.context.is_empty() {
            write!(f, "[{}] {}", self.code, self.message)
        } else {
            let ctx = serde_json::to_string(&self.context).unwrap_or_default();
            write!(f, "[{}] {} {ctx}", self.code, self.message)
        }
    }
}

impl StdError for XdscpError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source.as_ref().map(|e| e.as_ref() as &(dyn StdError + 'static))
    }
}

/// Serialisable snapshot of an [`XdscpError`] without the opaque source,
/// suitable for crossing the worker/web HTTP boundary.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct XdscpErrorDto {
    pub code: ErrorCode,
    pub message: String,
    pub context: BTreeMap<String, serde_json::Value>,
}

impl From<&XdscpError> for XdscpErrorDto {
    fn from(e: &XdscpError) -> Self {
        Self {
            code: e.code,
            message: e.message.clone(),
            context: e.context.clone(),
        }
    }
}
