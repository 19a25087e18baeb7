//! The result side of a Template Context task — the scheduling half lives
//! in `xdscp-context`, which depends on this crate for the shared shape.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Lifecycle state of a named context entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContextState {
    Pending,
    Ready,
    Failed,
}

/// The current value (or failure) of a named context task, as injected into
/// render contexts.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ContextResult {
    pub name: String,
    pub data: Value,
    pub state: ContextState,
}

impl ContextResult {
    #[must_use]
    pub fn pending(name: impl Into<String>) -> Self {
        Self { name: name.into(), data: Value::Null, state: ContextState::Pending }
    }

    #[must_use]
    pub fn ready(name: impl Into<String>, data: Value) -> Self {
        Self { name: name.into(), data, state: ContextState::Ready }
    }

    #[must_use]
    pub fn failed(name: impl Into<String>, error: impl std::fmt::Display) -> Self {
        Self { name: name.into(), data: Value::String(error.to_string()), state: ContextState::Failed }
    }

    /// Checksum of `repr(data)`, used to detect whether a refresh actually
    /// changed anything before firing the debounced `NEW_CONTEXT` signal.
    #[must_use]
    pub fn content_hash(&self) -> u32 {
        crc32fast::hash(self.data.to_string().as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn content_hash_stable_for_equal_data() {
        let a = ContextResult::ready("x", json!({"a": 1}));
        let b = ContextResult::ready("x", json!({"a": 1}));
        assert_eq!(a.content_hash(), b.content_hash());
    }

    #[test]
    fn content_hash_changes_with_data() {
        let a = ContextResult::ready("x", json!({"a": 1}));
        let b = ContextResult::ready("x", json!({"a": 2}));
        assert_ne!(a.content_hash(), b.content_hash());
    }
}
