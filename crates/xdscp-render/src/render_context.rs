//! Render context construction (section 4.8, step 2).

use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use xdscp_core::{ContextResult, DiscoveryRequest};

/// Cipher suites presented to external requests under the `crypto` key.
/// The actual cryptographic helper endpoints are an external collaborator
/// this crate never implements (see the out-of-scope list) — this is the
/// fixed, conservative default a caller can override by constructing the
/// context with its own value.
pub const DEFAULT_CIPHER_SUITES: &[&str] = &[
    "ECDHE-ECDSA-AES128-GCM-SHA256",
    "ECDHE-RSA-AES128-GCM-SHA256",
    "ECDHE-ECDSA-AES256-GCM-SHA384",
    "ECDHE-RSA-AES256-GCM-SHA384",
];

/// Build the JSON object handed to a template as its render context:
/// `{discovery_request, host_header, resource_names, crypto,
/// __hide_from_ui?, ...context_values}`.
#[must_use]
pub fn build_render_context(
    request: &DiscoveryRequest,
    context_values: &BTreeMap<String, ContextResult>,
    cipher_suites: &[&str],
) -> Value {
    let mut ctx = Map::new();
    ctx.insert("discovery_request".to_string(), serde_json::to_value(request).unwrap_or(Value::Null));
    ctx.insert("host_header".to_string(), request.desired_controlplane.clone().map_or(Value::Null, Value::String));
    ctx.insert(
        "resource_names".to_string(),
        Value::Array(request.resource_names.iter().cloned().map(Value::String).collect()),
    );

    if request.is_internal_request {
        ctx.insert("crypto".to_string(), json!({"enabled": false, "cipher_suites": []}));
        ctx.insert("__hide_from_ui".to_string(), Value::Bool(true));
    } else {
        ctx.insert("crypto".to_string(), json!({"enabled": true, "cipher_suites": cipher_suites}));
    }

    for (name, result) in context_values {
        ctx.insert(name.clone(), result.data.clone());
    }

    Value::Object(ctx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use xdscp_core::Node;

    fn request(internal: bool) -> DiscoveryRequest {
        DiscoveryRequest {
            node: Node::new("p1", "c1"),
            version_info: String::new(),
            resource_names: vec!["a".to_string()],
            api_version: xdscp_core::ApiVersion::V3,
            resource_type: xdscp_core::ResourceType::Clusters,
            desired_controlplane: Some("envoy.internal".to_string()),
            is_internal_request: internal,
        }
    }

    #[test]
    fn internal_request_gets_disabled_crypto_and_redactor() {
        let req = request(true);
        let ctx = build_render_context(&req, &BTreeMap::new(), DEFAULT_CIPHER_SUITES);
        assert_eq!(ctx["crypto"]["enabled"], json!(false));
        assert_eq!(ctx["__hide_from_ui"], json!(true));
    }

    #[test]
    fn external_request_gets_real_cipher_container_and_no_redactor() {
        let req = request(false);
        let ctx = build_render_context(&req, &BTreeMap::new(), DEFAULT_CIPHER_SUITES);
        assert_eq!(ctx["crypto"]["enabled"], json!(true));
        assert!(!ctx["crypto"]["cipher_suites"].as_array().unwrap().is_empty());
        assert!(ctx.get("__hide_from_ui").is_none());
    }

    #[test]
    fn context_values_are_merged_in() {
        let req = request(false);
        let mut values = BTreeMap::new();
        values.insert("region_map".to_string(), ContextResult::ready("region_map", json!({"us": 1})));
        let ctx = build_render_context(&req, &values, DEFAULT_CIPHER_SUITES);
        assert_eq!(ctx["region_map"], json!({"us": 1}));
    }
}
