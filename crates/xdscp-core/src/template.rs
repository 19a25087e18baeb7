//! A lazily loaded renderable used by the Render Pipeline.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Output of a render: either free text (to be deserialised by the caller
/// as YAML/JSON) or a ready-made resource list.
#[derive(Clone, Debug, PartialEq)]
pub enum TemplateOutput {
    Text(String),
    Resources(Vec<Value>),
}

/// A renderable template. Both flavours expose the same version contract:
/// `version` is a CRC32 of the canonical `source` text, so a Jinja template
/// and an equivalent compiled module template hash identically as long as
/// their source text matches.
#[derive(Clone, Debug, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TemplateSpec {
    /// Jinja-style text template, compiled lazily on first render.
    Text { source: String },
    /// A named entry in the build-time module registry (`xdscp-render`
    /// resolves `module_path` against it). `source` is still carried for
    /// version hashing and display purposes.
    Module { module_path: String, source: String },
}

impl TemplateSpec {
    #[must_use]
    pub fn source(&self) -> &str {
        match self {
            TemplateSpec::Text { source } | TemplateSpec::Module { source, .. } => source,
        }
    }

    /// CRC32 of the canonical source text — stable regardless of template
    /// flavour, per the invariant in section 8 of the spec this crate
    /// implements.
    #[must_use]
    pub fn version(&self) -> u32 {
        crc32fast::hash(self.source().as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_depends_only_on_source_text() {
        let text = TemplateSpec::Text { source: "resources: []".to_string() };
        let module = TemplateSpec::Module {
            module_path: "pkg::builder".to_string(),
            source: "resources: []".to_string(),
        };
        assert_eq!(text.version(), module.version());
    }

    #[test]
    fn version_changes_with_source() {
        let a = TemplateSpec::Text { source: "a".to_string() };
        let b = TemplateSpec::Text { source: "b".to_string() };
        assert_ne!(a.version(), b.version());
    }
}
