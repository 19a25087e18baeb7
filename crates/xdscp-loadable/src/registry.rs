//! Build-time registry backing the `module` protocol.
//!
//! The original system resolved `module://pkg.sub:symbol` by importing
//! arbitrary code at runtime. Rust has no equivalent without giving up
//! static dispatch, so callers register named providers ahead of time —
//! the config file still names them by string, but the set of valid names
//! is fixed at compile time (see REDESIGN FLAGS in the specification).

use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use xdscp_error::{ErrorCode, XdscpError};

/// A value provider registered under a name for the `module://` protocol.
pub type ModuleProvider = Arc<dyn Fn() -> Result<Value, XdscpError> + Send + Sync>;

/// Maps `module://<name>` paths to a provider function, and `package-data://<name>`
/// paths to an embedded value.
#[derive(Default, Clone)]
pub struct LoadRegistry {
    modules: BTreeMap<String, ModuleProvider>,
    package_data: BTreeMap<String, Value>,
}

impl LoadRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_module(&mut self, name: impl Into<String>, provider: ModuleProvider) -> &mut Self {
        self.modules.insert(name.into(), provider);
        self
    }

    pub fn register_package_data(&mut self, name: impl Into<String>, value: Value) -> &mut Self {
        self.package_data.insert(name.into(), value);
        self
    }

    pub fn resolve_module(&self, name: &str) -> Result<Value, XdscpError> {
        self.modules
            .get(name)
            .ok_or_else(|| XdscpError::new(ErrorCode::LoadError, format!("no module provider registered for {name:?}")))
            .and_then(|p| p())
    }

    pub fn resolve_package_data(&self, name: &str) -> Result<Value, XdscpError> {
        self.package_data
            .get(name)
            .cloned()
            .ok_or_else(|| XdscpError::new(ErrorCode::LoadError, format!("no package data registered for {name:?}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn resolves_registered_module() {
        let mut reg = LoadRegistry::new();
        reg.register_module("greeting", Arc::new(|| Ok(json!("hi"))));
        assert_eq!(reg.resolve_module("greeting").unwrap(), json!("hi"));
    }

    #[test]
    fn missing_module_is_load_error() {
        let reg = LoadRegistry::new();
        let err = reg.resolve_module("nope").unwrap_err();
        assert_eq!(err.code(), ErrorCode::LoadError);
    }
}
