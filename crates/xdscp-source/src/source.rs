//! The pluggable Source capability.

use async_trait::async_trait;
use serde_json::Value;
use xdscp_error::XdscpError;

/// A pluggable upstream: produces a list of instances tagged with the
/// scope they belong to. Instances are kept as an opaque JSON tree — the
/// poller and modifiers never assume a fixed schema.
#[async_trait]
pub trait Source: Send + Sync {
    async fn get(&self) -> Result<Vec<Value>, XdscpError>;

    fn scope(&self) -> &str;
}

/// A fixed, in-memory source — used for tests and `inline`-style static
/// configuration.
pub struct InlineSource {
    scope: String,
    instances: Vec<Value>,
}

impl InlineSource {
    #[must_use]
    pub fn new(scope: impl Into<String>, instances: Vec<Value>) -> Self {
        Self { scope: scope.into(), instances }
    }
}

#[async_trait]
impl Source for InlineSource {
    async fn get(&self) -> Result<Vec<Value>, XdscpError> {
        Ok(self.instances.clone())
    }

    fn scope(&self) -> &str {
        &self.scope
    }
}

/// Re-reads a JSON or YAML file of instances on every poll. The bundled
/// `file` source kind — useful for instance lists maintained by another
/// process (a deploy tool, a service registry dump) that this crate
/// doesn't need to speak to directly.
pub struct FileSource {
    scope: String,
    path: String,
}

impl FileSource {
    #[must_use]
    pub fn new(scope: impl Into<String>, path: impl Into<String>) -> Self {
        Self { scope: scope.into(), path: path.into() }
    }
}

#[async_trait]
impl Source for FileSource {
    async fn get(&self) -> Result<Vec<Value>, XdscpError> {
        let raw = tokio::fs::read(&self.path)
            .await
            .map_err(|e| XdscpError::new(xdscp_error::ErrorCode::SourceError, format!("read source file {:?}", self.path)).with_source(e))?;
        let value: Value = if self.path.ends_with(".json") {
            serde_json::from_slice(&raw)
                .map_err(|e| XdscpError::new(xdscp_error::ErrorCode::SourceError, "source file is not valid json").with_source(e))?
        } else {
            serde_yaml::from_slice(&raw)
                .map_err(|e| XdscpError::new(xdscp_error::ErrorCode::SourceError, "source file is not valid yaml").with_source(e))?
        };
        match value {
            Value::Array(items) => Ok(items),
            other => Err(XdscpError::new(xdscp_error::ErrorCode::SourceError, format!("source file {:?} did not contain a list, got {other:?}", self.path))),
        }
    }

    fn scope(&self) -> &str {
        &self.scope
    }
}
