//! Proxy identity as carried on every discovery request.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Locality hint reported by the proxy, as Envoy's `core.Locality` does.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct Locality {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_zone: Option<String>,
}

/// The structured `{major,minor,patch}` form of a build version.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct BuildVersionTuple {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

/// Proxy identity: cluster membership, locality, opaque metadata, and the
/// two historical representations of a build version.
///
/// `cluster` must be non-empty — callers construct via [`Node::new`], which
/// enforces it is never blank.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct Node {
    pub id: String,
    pub cluster: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locality: Option<Locality>,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
    /// Legacy slashed form, e.g. `"envoy/1.22.3/RELEASE/...".`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_version: Option<String>,
    /// Structured form reported by newer proxies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent_build_version: Option<BuildVersionTuple>,
}

/// Sentinel returned by [`Node::envoy_version`] when no build version can be
/// parsed. Parsing never fails outright — it degrades to this value.
pub const DEFAULT_ENVOY_VERSION: &str = "default";

impl Node {
    /// Construct a `Node`, falling back to `"unknown"` for a blank cluster
    /// rather than panicking — the invariant is enforced by never producing
    /// an empty string, not by rejecting the caller.
    pub fn new(id: impl Into<String>, cluster: impl Into<String>) -> Self {
        let cluster = cluster.into();
        Self {
            id: id.into(),
            cluster: if cluster.trim().is_empty() {
                "unknown".to_string()
            } else {
                cluster
            },
            locality: None,
            metadata: BTreeMap::new(),
            build_version: None,
            user_agent_build_version: None,
        }
    }

    /// Derive the dotted `major.minor.patch` envoy version used to select a
    /// template table entry, preferring the structured tuple over the
    /// legacy slashed string. Falls back to [`DEFAULT_ENVOY_VERSION`] when
    /// neither form parses.
    #[must_use]
    pub fn envoy_version(&self) -> String {
        if let Some(tuple) = self.user_agent_build_version {
            if tuple != (BuildVersionTuple { major: 0, minor: 0, patch: 0 }) {
                return format!("{}.{}.{}", tuple.major, tuple.minor, tuple.patch);
            }
        }
        if let Some(slashed) = &self.build_version {
            if let Some(v) = parse_slashed_version(slashed) {
                return v;
            }
        }
        DEFAULT_ENVOY_VERSION.to_string()
    }
}

/// Parse `"envoy/1.22.3/RELEASE/BoringSSL"` into `"1.22.3"`. Any shape that
/// doesn't contain a dotted version segment yields `None`.
fn parse_slashed_version(slashed: &str) -> Option<String> {
    slashed
        .split('/')
        .find(|segment| segment.split('.').all(|p| p.parse::<u32>().is_ok()) && segment.contains('.'))
        .map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cluster_never_empty() {
        let n = Node::new("id-1", "   ");
        assert_eq!(n.cluster, "unknown");
    }

    #[test]
    fn envoy_version_prefers_structured_tuple() {
        let mut n = Node::new("id", "svc");
        n.user_agent_build_version = Some(BuildVersionTuple { major: 1, minor: 22, patch: 3 });
        n.build_version = Some("envoy/1.20.0/RELEASE".to_string());
        assert_eq!(n.envoy_version(), "1.22.3");
    }

    #[test]
    fn envoy_version_falls_through_zero_sentinel_tuple() {
        let mut n = Node::new("id", "svc");
        n.user_agent_build_version = Some(BuildVersionTuple { major: 0, minor: 0, patch: 0 });
        n.build_version = Some("envoy/1.20.1/RELEASE/BoringSSL".to_string());
        assert_eq!(n.envoy_version(), "1.20.1");
    }

    #[test]
    fn envoy_version_parses_legacy_slashed_form() {
        let mut n = Node::new("id", "svc");
        n.build_version = Some("envoy/1.20.1/RELEASE/BoringSSL".to_string());
        assert_eq!(n.envoy_version(), "1.20.1");
    }

    #[test]
    fn envoy_version_defaults_on_garbage() {
        let mut n = Node::new("id", "svc");
        n.build_version = Some("not-a-version-at-all".to_string());
        assert_eq!(n.envoy_version(), DEFAULT_ENVOY_VERSION);
    }

    #[test]
    fn envoy_version_defaults_when_absent() {
        let n = Node::new("id", "svc");
        assert_eq!(n.envoy_version(), DEFAULT_ENVOY_VERSION);
    }
}
