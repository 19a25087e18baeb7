//! Build-time registry backing `sources[].type`, `modifiers`, and
//! `global_modifiers` configuration names (design note, section 9): each
//! plugin kind is a value of a sum type implementing the capability;
//! registration is a static table keyed by name, resolved at startup
//! rather than imported at runtime.

use crate::modifier::{GlobalModifier, Modifier};
use crate::source::{FileSource, InlineSource, Source};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use xdscp_error::{ErrorCode, XdscpError};

/// Constructs a [`Source`] from a source config's opaque `config` blob and
/// its `scope` tag.
pub type SourceFactory = Arc<dyn Fn(&str, &Value) -> Result<Box<dyn Source>, XdscpError> + Send + Sync>;
pub type ModifierFactory = Arc<dyn Fn(&Value) -> Result<Box<dyn Modifier>, XdscpError> + Send + Sync>;
pub type GlobalModifierFactory = Arc<dyn Fn(&Value) -> Result<Box<dyn GlobalModifier>, XdscpError> + Send + Sync>;

/// Maps `sources[].type`, `modifiers[]`, and `global_modifiers[]` names to
/// the factory that builds the corresponding capability. Bundled with the
/// `inline` and `file` source kinds; everything else — every modifier, and
/// any additional source kind — is registered by the embedding
/// application before startup.
#[derive(Clone)]
pub struct PluginRegistry {
    sources: BTreeMap<String, SourceFactory>,
    modifiers: BTreeMap<String, ModifierFactory>,
    global_modifiers: BTreeMap<String, GlobalModifierFactory>,
}

impl PluginRegistry {
    /// A registry pre-populated with the bundled `inline` and `file`
    /// source kinds. No modifiers are bundled — modifier logic is always
    /// application-specific.
    #[must_use]
    pub fn with_bundled_sources() -> Self {
        let mut reg = Self::empty();
        reg.register_source("inline", Arc::new(build_inline_source));
        reg.register_source("file", Arc::new(build_file_source));
        reg
    }

    #[must_use]
    pub fn empty() -> Self {
        Self { sources: BTreeMap::new(), modifiers: BTreeMap::new(), global_modifiers: BTreeMap::new() }
    }

    pub fn register_source(&mut self, name: impl Into<String>, factory: SourceFactory) -> &mut Self {
        self.sources.insert(name.into(), factory);
        self
    }

    pub fn register_modifier(&mut self, name: impl Into<String>, factory: ModifierFactory) -> &mut Self {
        self.modifiers.insert(name.into(), factory);
        self
    }

    pub fn register_global_modifier(&mut self, name: impl Into<String>, factory: GlobalModifierFactory) -> &mut Self {
        self.global_modifiers.insert(name.into(), factory);
        self
    }

    pub fn build_source(&self, kind: &str, scope: &str, config: &Value) -> Result<Box<dyn Source>, XdscpError> {
        let factory = self
            .sources
            .get(kind)
            .ok_or_else(|| XdscpError::new(ErrorCode::ConfigError, format!("no source kind registered for {kind:?}")))?;
        factory(scope, config)
    }

    pub fn build_modifier(&self, name: &str, config: &Value) -> Result<Box<dyn Modifier>, XdscpError> {
        let factory = self
            .modifiers
            .get(name)
            .ok_or_else(|| XdscpError::new(ErrorCode::ConfigError, format!("no modifier registered for {name:?}")))?;
        factory(config)
    }

    pub fn build_global_modifier(&self, name: &str, config: &Value) -> Result<Box<dyn GlobalModifier>, XdscpError> {
        let factory = self
            .global_modifiers
            .get(name)
            .ok_or_else(|| XdscpError::new(ErrorCode::ConfigError, format!("no global modifier registered for {name:?}")))?;
        factory(config)
    }
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::with_bundled_sources()
    }
}

fn build_inline_source(scope: &str, config: &Value) -> Result<Box<dyn Source>, XdscpError> {
    let instances = config
        .get("instances")
        .and_then(Value::as_array)
        .cloned()
        .ok_or_else(|| XdscpError::new(ErrorCode::ConfigError, "inline source config missing `instances` array"))?;
    Ok(Box::new(InlineSource::new(scope, instances)))
}

fn build_file_source(scope: &str, config: &Value) -> Result<Box<dyn Source>, XdscpError> {
    let path = config
        .get("path")
        .and_then(Value::as_str)
        .ok_or_else(|| XdscpError::new(ErrorCode::ConfigError, "file source config missing `path` string"))?;
    Ok(Box::new(FileSource::new(scope, path)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn inline_kind_builds_a_working_source() {
        let registry = PluginRegistry::with_bundled_sources();
        let source = registry
            .build_source("inline", "default", &json!({"instances": [{"name": "a"}]}))
            .unwrap();
        assert_eq!(source.get().await.unwrap(), vec![json!({"name": "a"})]);
    }

    #[test]
    fn unknown_source_kind_is_config_error() {
        let registry = PluginRegistry::with_bundled_sources();
        let err = registry.build_source("carrier-pigeon", "default", &json!({})).unwrap_err();
        assert_eq!(err.code(), ErrorCode::ConfigError);
    }

    #[test]
    fn unregistered_modifier_name_is_config_error() {
        let registry = PluginRegistry::with_bundled_sources();
        let err = registry.build_modifier("uppercase", &json!({})).unwrap_err();
        assert_eq!(err.code(), ErrorCode::ConfigError);
    }
}
