//! The Source Poller's held snapshot of upstream instance data.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// The scope that holds instances with no explicit resource-type family.
pub const DEFAULT_SCOPE: &str = "default";

/// A mapping from scope name to the ordered list of instances polled for
/// that scope. Equality is structural (`derive(PartialEq)`) so diffing two
/// snapshots is just `==`, per the data model invariant.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceData {
    scopes: BTreeMap<String, Vec<Value>>,
}

impl SourceData {
    #[must_use]
    pub fn new() -> Self {
        Self { scopes: BTreeMap::new() }
    }

    /// Replace (or create) the instance list for a scope, preserving the
    /// order instances arrived in from the source.
    pub fn set_scope(&mut self, scope: impl Into<String>, instances: Vec<Value>) {
        self.scopes.insert(scope.into(), instances);
    }

    #[must_use]
    pub fn scope(&self, scope: &str) -> &[Value] {
        self.scopes.get(scope).map_or(&[], |v| v.as_slice())
    }

    #[must_use]
    pub fn default_scope(&self) -> &[Value] {
        self.scope(DEFAULT_SCOPE)
    }

    pub fn scopes(&self) -> impl Iterator<Item = (&str, &[Value])> {
        self.scopes.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.scopes.values().all(Vec::is_empty)
    }
}

/// The field-level diff entry emitted for observability when a poll
/// produces a different [`SourceData`] than the one currently held.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum DiffOp {
    Add { path: String, value: Value },
    Remove { path: String, value: Value },
    Change { path: String, before: Value, after: Value },
}

/// Compute a structural, field-level diff between two snapshots. Purely for
/// observability — the poller always replaces `current` wholesale on
/// change, this never drives behaviour.
#[must_use]
pub fn diff(before: &SourceData, after: &SourceData) -> Vec<DiffOp> {
    let mut ops = Vec::new();
    let mut scopes: Vec<&String> = before.scopes.keys().chain(after.scopes.keys()).collect();
    scopes.sort();
    scopes.dedup();

    for scope in scopes {
        let empty = Vec::new();
        let before_list = before.scopes.get(scope).unwrap_or(&empty);
        let after_list = after.scopes.get(scope).unwrap_or(&empty);
        let max = before_list.len().max(after_list.len());
        for i in 0..max {
            let path = format!("{scope}[{i}]");
            match (before_list.get(i), after_list.get(i)) {
                (Some(b), Some(a)) if b != a => ops.push(DiffOp::Change {
                    path,
                    before: b.clone(),
                    after: a.clone(),
                }),
                (Some(_), Some(_)) => {}
                (Some(b), None) => ops.push(DiffOp::Remove { path, value: b.clone() }),
                (None, Some(a)) => ops.push(DiffOp::Add { path, value: a.clone() }),
                (None, None) => {}
            }
        }
    }
    ops
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn equality_is_structural() {
        let mut a = SourceData::new();
        a.set_scope(DEFAULT_SCOPE, vec![json!({"name": "x"})]);
        let mut b = SourceData::new();
        b.set_scope(DEFAULT_SCOPE, vec![json!({"name": "x"})]);
        assert_eq!(a, b);
    }

    #[test]
    fn diff_reports_add_and_change() {
        let mut before = SourceData::new();
        before.set_scope(DEFAULT_SCOPE, vec![json!({"name": "a", "v": 1})]);
        let mut after = SourceData::new();
        after.set_scope(DEFAULT_SCOPE, vec![json!({"name": "a", "v": 2}), json!({"name": "b"})]);
        let ops = diff(&before, &after);
        assert!(ops.iter().any(|o| matches!(o, DiffOp::Change { .. })));
        assert!(ops.iter().any(|o| matches!(o, DiffOp::Add { .. })));
    }

    #[test]
    fn empty_source_data_is_empty() {
        assert!(SourceData::new().is_empty());
    }
}
