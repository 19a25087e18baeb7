//! The Render Pipeline proper (section 4.8): selects a template, builds a
//! context, renders, filters, annotates, and version-hashes the result.

use crate::engine::render;
use crate::render_context::{build_render_context, DEFAULT_CIPHER_SUITES};
use crate::table::TemplateTable;
use std::collections::BTreeMap;
use xdscp_core::{filter_by_requested_names, type_url, ContextResult, DiscoveryRequest, Entry, SourceData};
use xdscp_error::XdscpError;
use xdscp_loadable::LoadRegistry;

/// Everything the pipeline needs that doesn't change per-request.
pub struct RenderPipeline {
    table: TemplateTable,
    registry: LoadRegistry,
}

impl RenderPipeline {
    #[must_use]
    pub fn new(table: TemplateTable, registry: LoadRegistry) -> Self {
        Self { table, registry }
    }

    /// Render a single discovery request into a cacheable [`Entry`].
    ///
    /// `source_data` is accepted for parity with the spec's stated inputs
    /// (the matched instance data feeding the template) even though this
    /// implementation folds matching into the caller's responsibility —
    /// templates read it, when needed, out of `context_values`.
    pub fn render_entry(
        &self,
        request: &DiscoveryRequest,
        _source_data: &SourceData,
        context_values: &BTreeMap<String, ContextResult>,
    ) -> Result<Entry, XdscpError> {
        let envoy_version = request.node.envoy_version();
        let spec = self.table.select(&envoy_version, request.resource_type)?;

        let ctx = build_render_context(request, context_values, DEFAULT_CIPHER_SUITES);
        let rendered = render(spec, &ctx, &self.registry)?;

        let filtered = filter_by_requested_names(rendered, &request.resource_names);

        let annotated: Vec<_> = filtered
            .into_iter()
            .map(|mut resource| {
                if resource.get("@type").is_none() {
                    if let Some(url) = type_url(request.api_version, request.resource_type) {
                        if let Some(obj) = resource.as_object_mut() {
                            obj.insert("@type".to_string(), serde_json::Value::String(url.to_string()));
                        }
                    }
                }
                resource
            })
            .collect();

        let canonical = serde_json::to_string(&annotated)
            .map_err(|e| XdscpError::new(xdscp_error::ErrorCode::InternalError, "rendered resources not serialisable").with_source(e))?;
        let version_info = format!("{:x}", crc32fast::hash(canonical.as_bytes()));

        let text = serde_json::to_string(&serde_json::json!({"version_info": version_info, "resources": annotated}))
            .map_err(|e| XdscpError::new(xdscp_error::ErrorCode::InternalError, "entry body not serialisable").with_source(e))?;

        Ok(Entry::new(text, version_info, request.node.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use xdscp_core::{ApiVersion, Node, ResourceType, TemplateSpec};

    fn request() -> DiscoveryRequest {
        DiscoveryRequest {
            node: Node::new("p1", "c1"),
            version_info: String::new(),
            resource_names: vec![],
            api_version: ApiVersion::V3,
            resource_type: ResourceType::Clusters,
            desired_controlplane: None,
            is_internal_request: false,
        }
    }

    fn pipeline_with(source: &str) -> RenderPipeline {
        let mut table = TemplateTable::new();
        table.insert("default", ResourceType::Clusters, TemplateSpec::Text { source: source.to_string() });
        RenderPipeline::new(table, LoadRegistry::new())
    }

    #[test]
    fn annotates_missing_type_and_computes_version() {
        let pipeline = pipeline_with("resources:\n  - name: c1\n");
        let entry = pipeline.render_entry(&request(), &SourceData::new(), &BTreeMap::new()).unwrap();
        assert!(entry.text.contains("type.googleapis.com/envoy.config.cluster.v3.Cluster"));
        assert!(!entry.version.is_empty());
    }

    #[test]
    fn version_is_stable_for_identical_output() {
        let pipeline = pipeline_with("resources:\n  - name: c1\n");
        let a = pipeline.render_entry(&request(), &SourceData::new(), &BTreeMap::new()).unwrap();
        let b = pipeline.render_entry(&request(), &SourceData::new(), &BTreeMap::new()).unwrap();
        assert_eq!(a.version, b.version);
    }

    #[test]
    fn empty_source_renders_empty_resources() {
        let pipeline = pipeline_with("resources: []\n");
        let entry = pipeline.render_entry(&request(), &SourceData::new(), &BTreeMap::new()).unwrap();
        assert!(entry.text.contains("\"resources\":[]"));
    }

    #[test]
    fn filters_by_requested_resource_names() {
        let pipeline = pipeline_with("resources:\n  - name: a\n  - name: b\n");
        let mut req = request();
        req.resource_names = vec!["a".to_string()];
        let entry = pipeline.render_entry(&req, &SourceData::new(), &BTreeMap::new()).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&entry.text).unwrap();
        assert_eq!(parsed["resources"].as_array().unwrap().len(), 1);
    }
}
