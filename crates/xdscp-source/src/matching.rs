//! Node-to-instance matching (section 4.6).

use serde_json::Value;
use xdscp_core::Node;

/// Extract a dotted path from a [`Node`]'s serialised form, e.g.
/// `"locality.region"` or `"metadata.team"`.
#[must_use]
pub fn node_match_value(node: &Node, node_key: &str) -> Value {
    let serialised = serde_json::to_value(node).unwrap_or(Value::Null);
    dotted_get(&serialised, node_key)
}

/// Extract a dotted path out of an instance's JSON tree.
#[must_use]
pub fn instance_match_value(instance: &Value, source_key: &str) -> Value {
    dotted_get(instance, source_key)
}

fn dotted_get(root: &Value, path: &str) -> Value {
    let mut current = root;
    for segment in path.split('.') {
        match current.get(segment) {
            Some(v) => current = v,
            None => return Value::Null,
        }
    }
    current.clone()
}

/// Wildcard value matching anything, and debug-mode empty node values.
const WILDCARD: &str = "*";

/// Does `node_value` match `source_value`? An instance matches iff: the
/// source value contains the node value (string containment, or array
/// membership), they're equal, either side is the wildcard `"*"`, or
/// `debug` mode is on and the node value is empty.
#[must_use]
pub fn matches(node_value: &Value, source_value: &Value, debug: bool) -> bool {
    if is_wildcard(node_value) || is_wildcard(source_value) {
        return true;
    }
    if node_value == source_value {
        return true;
    }
    if contains(source_value, node_value) {
        return true;
    }
    if debug && is_empty(node_value) {
        return true;
    }
    false
}

fn is_wildcard(v: &Value) -> bool {
    v.as_str() == Some(WILDCARD)
}

fn is_empty(v: &Value) -> bool {
    matches!(v, Value::Null) || v.as_str() == Some("")
}

fn contains(haystack: &Value, needle: &Value) -> bool {
    match haystack {
        Value::String(s) => needle.as_str().is_some_and(|n| !n.is_empty() && s.contains(n)),
        Value::Array(items) => items.contains(needle),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn wildcard_on_either_side_matches() {
        assert!(matches(&json!("*"), &json!("anything"), false));
        assert!(matches(&json!("foo"), &json!("*"), false));
    }

    #[test]
    fn equality_matches() {
        assert!(matches(&json!("foo"), &json!("foo"), false));
    }

    #[test]
    fn containment_matches() {
        assert!(matches(&json!("foo"), &json!(["foo", "bar"]), false));
        assert!(matches(&json!("oo"), &json!("foobar"), false));
    }

    #[test]
    fn debug_empty_node_value_matches() {
        assert!(matches(&Value::Null, &json!("anything"), true));
        assert!(!matches(&Value::Null, &json!("anything"), false));
    }

    #[test]
    fn unrelated_values_do_not_match() {
        assert!(!matches(&json!("foo"), &json!("bar"), false));
    }

    #[test]
    fn dotted_get_walks_nested_objects() {
        let v = json!({"locality": {"region": "us-east"}});
        assert_eq!(dotted_get(&v, "locality.region"), json!("us-east"));
    }
}
