//! Template rendering (section 4.8, step 3): text templates render through
//! Jinja then deserialise as YAML/JSON; module templates resolve directly
//! to a resource list.

use serde_json::Value;
use xdscp_core::{Resources, TemplateSpec};
use xdscp_error::{ErrorCode, XdscpError};
use xdscp_loadable::LoadRegistry;

/// Render `spec` against `context`, producing the ordered resource list
/// before filtering or annotation.
pub fn render(spec: &TemplateSpec, context: &Value, registry: &LoadRegistry) -> Result<Resources, XdscpError> {
    match spec {
        TemplateSpec::Text { source } => render_text(source, context),
        TemplateSpec::Module { module_path, .. } => render_module(module_path, registry),
    }
}

fn render_text(source: &str, context: &Value) -> Result<Resources, XdscpError> {
    let mut env = minijinja::Environment::new();
    env.add_template("render", source)
        .map_err(|e| XdscpError::new(ErrorCode::RenderError, "template failed to compile").with_source(e))?;
    let tmpl = env
        .get_template("render")
        .map_err(|e| XdscpError::new(ErrorCode::RenderError, "template not found after compilation").with_source(e))?;
    let rendered = tmpl
        .render(context)
        .map_err(|e| XdscpError::new(ErrorCode::RenderError, "template raised during render").with_source(e))?;

    let value: Value = serde_yaml::from_str(&rendered)
        .map_err(|e| XdscpError::new(ErrorCode::DeserialiseError, "rendered template text is not valid yaml/json").with_source(e))?;

    resources_from_output(value)
}

fn render_module(module_path: &str, registry: &LoadRegistry) -> Result<Resources, XdscpError> {
    let value = registry.resolve_module(module_path)?;
    resources_from_output(value)
}

/// A rendered value is either a bare array of resources, or an object
/// carrying them under `resources`.
fn resources_from_output(value: Value) -> Result<Resources, XdscpError> {
    match value {
        Value::Array(items) => Ok(items),
        Value::Object(mut map) => match map.remove("resources") {
            Some(Value::Array(items)) => Ok(items),
            Some(_) => Err(XdscpError::new(ErrorCode::RenderError, "`resources` key did not contain a list")),
            None => Err(XdscpError::new(ErrorCode::RenderError, "template output is an object with no `resources` key")),
        },
        Value::Null => Ok(Vec::new()),
        other => Err(XdscpError::new(ErrorCode::RenderError, format!("template produced non-dict output: {other:?}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    #[test]
    fn renders_text_template_to_resource_list() {
        let spec = TemplateSpec::Text {
            source: "resources:\n  - name: {{ discovery_request.node.cluster }}\n".to_string(),
        };
        let ctx = json!({"discovery_request": {"node": {"cluster": "svc-a"}}});
        let resources = render(&spec, &ctx, &LoadRegistry::new()).unwrap();
        assert_eq!(resources, vec![json!({"name": "svc-a"})]);
    }

    #[test]
    fn renders_bare_array_template() {
        let spec = TemplateSpec::Text { source: "[{name: a}, {name: b}]".to_string() };
        let resources = render(&spec, &json!({}), &LoadRegistry::new()).unwrap();
        assert_eq!(resources.len(), 2);
    }

    #[test]
    fn module_template_resolves_through_registry() {
        let mut registry = LoadRegistry::new();
        registry.register_module("pkg::builder", Arc::new(|| Ok(json!([{"name": "m"}]))));
        let spec = TemplateSpec::Module { module_path: "pkg::builder".to_string(), source: String::new() };
        let resources = render(&spec, &json!({}), &registry).unwrap();
        assert_eq!(resources, vec![json!({"name": "m"})]);
    }

    #[test]
    fn empty_source_list_renders_empty_array() {
        let spec = TemplateSpec::Text { source: "resources: []".to_string() };
        let resources = render(&spec, &json!({}), &LoadRegistry::new()).unwrap();
        assert!(resources.is_empty());
    }

    #[test]
    fn non_dict_output_is_render_error() {
        let spec = TemplateSpec::Text { source: "\"just a string\"".to_string() };
        let err = render(&spec, &json!({}), &LoadRegistry::new()).unwrap_err();
        assert_eq!(err.code(), ErrorCode::RenderError);
    }
}
