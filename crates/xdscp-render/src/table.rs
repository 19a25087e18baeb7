//! Template selection by longest matching envoy-version prefix (section
//! 4.8, step 1).

use std::collections::BTreeMap;
use xdscp_core::{ResourceType, TemplateSpec};
use xdscp_error::{ErrorCode, XdscpError};

pub const DEFAULT_VERSION_KEY: &str = "default";

/// `templates.<version>.<resource_type>`, as parsed out of [`xdscp_config::XdscpConfig`].
#[derive(Clone, Debug, Default)]
pub struct TemplateTable {
    versions: BTreeMap<String, BTreeMap<ResourceType, TemplateSpec>>,
}

impl TemplateTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, version_key: impl Into<String>, resource_type: ResourceType, spec: TemplateSpec) {
        self.versions.entry(version_key.into()).or_default().insert(resource_type, spec);
    }

    /// Select the template registered for `resource_type` under the
    /// longest version key that is a dotted prefix of `envoy_version`,
    /// falling back to `"default"`. Errors if the resource type is not
    /// registered under the selected version at all.
    pub fn select(&self, envoy_version: &str, resource_type: ResourceType) -> Result<&TemplateSpec, XdscpError> {
        let segments: Vec<&str> = envoy_version.split('.').collect();

        let mut best: Option<(&str, usize)> = None;
        for key in self.versions.keys() {
            if key == DEFAULT_VERSION_KEY {
                continue;
            }
            let key_segments: Vec<&str> = key.split('.').collect();
            if key_segments.len() <= segments.len() && key_segments == segments[..key_segments.len()] {
                if best.is_none_or(|(_, len)| key_segments.len() > len) {
                    best = Some((key, key_segments.len()));
                }
            }
        }

        let selected_key = best.map(|(k, _)| k).unwrap_or(DEFAULT_VERSION_KEY);
        let by_type = self.versions.get(selected_key).ok_or_else(|| {
            XdscpError::new(ErrorCode::ConfigError, format!("no template table registered for envoy version {envoy_version:?} or default"))
        })?;
        by_type.get(&resource_type).ok_or_else(|| {
            XdscpError::new(
                ErrorCode::ConfigError,
                format!("resource type {resource_type} not registered under template version {selected_key:?}"),
            )
        })
    }
}
