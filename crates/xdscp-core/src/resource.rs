//! Rendered xDS resources: an ordered, name-bearing list.

use serde_json::Value;

/// A single rendered resource. Kept as an opaque JSON object — the renderer
/// only ever needs to read `name` and `@type`, everything else is payload
/// the proxy interprets.
pub type Resource = Value;

/// An ordered list of resources, as produced by a render and as sent on the
/// wire inside a Discovery Response.
pub type Resources = Vec<Resource>;

/// Resolve the name used for "requested resources" filtering: `name`, or
/// the Envoy-specific `cluster_name` fallback used by some resource kinds.
#[must_use]
pub fn resource_name(resource: &Resource) -> Option<&str> {
    resource
        .get("name")
        .and_then(Value::as_str)
        .or_else(|| resource.get("cluster_name").and_then(Value::as_str))
}

/// Keep only resources named in `requested`; an empty `requested` list means
/// "all resources pass".
#[must_use]
pub fn filter_by_requested_names(resources: Resources, requested: &[String]) -> Resources {
    if requested.is_empty() {
        return resources;
    }
    resources
        .into_iter()
        .filter(|r| resource_name(r).is_some_and(|n| requested.iter().any(|want| want == n)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_requested_keeps_everything() {
        let resources = vec![json!({"name": "a"}), json!({"name": "b"})];
        assert_eq!(filter_by_requested_names(resources.clone(), &[]), resources);
    }

    #[test]
    fn non_empty_requested_filters_by_name() {
        let resources = vec![json!({"name": "a"}), json!({"name": "b"})];
        let filtered = filter_by_requested_names(resources, &["a".to_string()]);
        assert_eq!(filtered, vec![json!({"name": "a"})]);
    }

    #[test]
    fn falls_back_to_cluster_name() {
        let r = json!({"cluster_name": "c1"});
        assert_eq!(resource_name(&r), Some("c1"));
    }
}
