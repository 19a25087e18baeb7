//! The inbound Discovery Request and its fingerprinting.

use crate::node::Node;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A client's Discovery Request: the Node plus the version it currently
/// holds, the resources it is asking about, and server-populated fields
/// that never cross the wire from the client itself.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct DiscoveryRequest {
    pub node: Node,
    #[serde(default)]
    pub version_info: String,
    /// Empty means "all resources of this type".
    #[serde(default)]
    pub resource_names: Vec<String>,

    // --- server-populated, never trusted from the wire ---
    #[serde(default)]
    pub api_version: ApiVersion,
    #[serde(default)]
    pub resource_type: ResourceType,
    /// The `Host` header the proxy connected through, forwarded into the
    /// render context as `host_header`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desired_controlplane: Option<String>,
    #[serde(default)]
    pub is_internal_request: bool,
}

/// xDS transport major version.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ApiVersion {
    #[default]
    V2,
    V3,
}

impl std::fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ApiVersion::V2 => "v2",
            ApiVersion::V3 => "v3",
        })
    }
}

/// The resource families a template can be registered under.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceType {
    #[default]
    Listeners,
    Clusters,
    Routes,
    Endpoints,
    Secrets,
    ScopedRoutes,
    /// v3-only.
    Runtime,
}

impl std::fmt::Display for ResourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ResourceType::Listeners => "listeners",
            ResourceType::Clusters => "clusters",
            ResourceType::Routes => "routes",
            ResourceType::Endpoints => "endpoints",
            ResourceType::Secrets => "secrets",
            ResourceType::ScopedRoutes => "scoped-routes",
            ResourceType::Runtime => "runtime",
        };
        f.write_str(s)
    }
}

impl DiscoveryRequest {
    /// Compute the cache fingerprint: sort `hash_rules` (each a JMESPath
    /// expression into the serialised request), concatenate
    /// `rule=repr(value)` for each, and SHA-256 the result.
    ///
    /// Rule sorting makes the fingerprint independent of the order
    /// `hash_rules` was configured in — a stable fingerprint is the whole
    /// point of this function.
    pub fn cache_key(&self, hash_rules: &[String]) -> Result<String, xdscp_error::XdscpError> {
        let mut sorted_rules: Vec<&String> = hash_rules.iter().collect();
        sorted_rules.sort();

        let serialised = serde_json::to_value(self)
            .map_err(|e| xdscp_error::XdscpError::new(xdscp_error::ErrorCode::InternalError, "request not serialisable").with_source(e))?;

        let mut hasher = Sha256::new();
        for rule in sorted_rules {
            let expr = jmespath::compile(rule).map_err(|e| {
                xdscp_error::XdscpError::new(xdscp_error::ErrorCode::ConfigError, format!("invalid hash rule {rule:?}: {e}"))
            })?;
            let value = expr
                .search(serialised.clone())
                .map_err(|e| xdscp_error::XdscpError::new(xdscp_error::ErrorCode::InternalError, format!("hash rule {rule:?} failed: {e}")))?;
            hasher.update(rule.as_bytes());
            hasher.update(b"=");
            hasher.update(value.to_string().as_bytes());
            hasher.update(b"\0");
        }
        Ok(format!("{:x}", hasher.finalize()))
    }
}
