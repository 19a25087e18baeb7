// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
//! Configuration schema, loading, and validation for the xDS control plane.
//!
//! [`XdscpConfig`] is the root shape: `sources`, `templates`,
//! `template_context`, `matching`, `modifiers`/`global_modifiers`, and
//! `cache`, as laid out in section 6 of the control-plane specification.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Errors raised while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    #[error("failed to parse config: {reason}")]
    ParseError { reason: String },

    #[error("config validation failed: {reasons:?}")]
    ValidationError { reasons: Vec<String> },
}

/// A Loadable address: `{protocol, path, serialization, interval?,
/// retry_policy?}`, or the legacy `"<proto>[+<ser>]://<path>"` string form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum LoadableConfig {
    Structured {
        protocol: String,
        path: String,
        #[serde(default)]
        serialization: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        interval: Option<TaskInterval>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        retry_policy: Option<RetryPolicy>,
    },
    Legacy(String),
}

/// Either a plain seconds interval or a cron expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum TaskInterval {
    Seconds(u64),
    Cron(String),
}

/// Retry behaviour for a Loadable or context task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct RetryPolicy {
    #[serde(default = "default_num_retries")]
    pub num_retries: u32,
    #[serde(default = "default_retry_interval")]
    pub interval_seconds: u64,
}

fn default_num_retries() -> u32 {
    3
}
fn default_retry_interval() -> u64 {
    5
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { num_retries: default_num_retries(), interval_seconds: default_retry_interval() }
    }
}

/// One entry under `sources: [...]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SourceConfig {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub config: serde_json::Value,
}

/// One entry under `templates.<version>.<resource_type>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TemplateEntryConfig {
    pub path: String,
    #[serde(default)]
    pub depends_on: Vec<String>,
}

/// `template_context.context.<name>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ContextEntryConfig {
    #[serde(flatten)]
    pub load: LoadableConfig,
}

/// `template_context` block.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TemplateContextConfig {
    #[serde(default)]
    pub context: BTreeMap<String, ContextEntryConfig>,
}

/// `matching` block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct MatchingConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub node_key: String,
    pub source_key: String,
    #[serde(default)]
    pub debug: bool,
}

fn default_true() -> bool {
    true
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self { enabled: true, node_key: "cluster".into(), source_key: "cluster".into(), debug: false }
    }
}

/// `cache` block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CacheConfig {
    pub local_fs_path: String,
    #[serde(default)]
    pub remote_backend: Option<RemoteBackendConfig>,
    #[serde(default)]
    pub hash_rules: Vec<String>,
    #[serde(default = "default_read_timeout")]
    pub read_timeout_secs: u64,
    #[serde(default)]
    pub local_ttl_secs: Option<u64>,
    #[serde(default = "default_provisional_ttl")]
    pub provisional_ttl_secs: u64,
    #[serde(default = "default_compaction_threshold")]
    pub compaction_threshold: usize,
}

fn default_read_timeout() -> u64 {
    15
}
fn default_provisional_ttl() -> u64 {
    30
}
fn default_compaction_threshold() -> usize {
    100
}

/// Object-storage remote cache configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RemoteBackendConfig {
    pub bucket: String,
    #[serde(default)]
    pub prefix: String,
    #[serde(default)]
    pub endpoint: Option<String>,
}

/// Root configuration document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct XdscpConfig {
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
    #[serde(default)]
    pub templates: BTreeMap<String, BTreeMap<String, TemplateEntryConfig>>,
    #[serde(default)]
    pub template_context: TemplateContextConfig,
    #[serde(default)]
    pub matching: MatchingConfig,
    #[serde(default)]
    pub modifiers: Vec<String>,
    #[serde(default)]
    pub global_modifiers: Vec<String>,
    pub cache: CacheConfig,
    #[serde(default = "default_render_timeout")]
    pub render_timeout_secs: u64,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    /// HTTP status used to signal "client already current". Defaults to
    /// 304, configurable per section 6.
    #[serde(default = "default_no_change_status")]
    pub no_change_status: u16,
}

fn default_render_timeout() -> u64 {
    60
}
fn default_queue_capacity() -> usize {
    10
}
fn default_poll_interval() -> u64 {
    500
}
fn default_no_change_status() -> u16 {
    304
}

/// Load a config document from a TOML file on disk.
pub fn load_from_file(path: &Path) -> Result<XdscpConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
        path: path.display().to_string(),
    })?;
    parse_toml(&content)
}

/// Parse a config document from a TOML string.
pub fn parse_toml(content: &str) -> Result<XdscpConfig, ConfigError> {
    toml::from_str(content).map_err(|e| ConfigError::ParseError { reason: e.to_string() })
}

/// Semantic validation beyond what serde enforces: non-empty cluster keys,
/// at least one hash rule (an empty `hash_rules` list would fingerprint
/// every request identically), and a sane queue capacity.
pub fn validate(config: &XdscpConfig) -> Result<(), ConfigError> {
    let mut errors = Vec::new();

    if config.cache.hash_rules.is_empty() {
        errors.push("cache.hash_rules must not be empty".to_string());
    }
    if config.queue_capacity == 0 {
        errors.push("queue_capacity must be at least 1".to_string());
    }
    if config.render_timeout_secs == 0 {
        errors.push("render_timeout_secs must be at least 1".to_string());
    }
    for (version, types) in &config.templates {
        if types.is_empty() {
            errors.push(format!("templates.{version} has no resource types registered"));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationError { reasons: errors })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_toml() -> &'static str {
        r#"
        [[sources]]
        type = "inline"
        scope = "default"
        config = { instances = [] }

        [cache]
        local_fs_path = "/tmp/xdscp-cache"
        hash_rules = ["node.cluster"]
        "#
    }

    #[test]
    fn parses_minimal_config() {
        let cfg = parse_toml(minimal_toml()).unwrap();
        assert_eq!(cfg.sources.len(), 1);
        assert_eq!(cfg.cache.local_fs_path, "/tmp/xdscp-cache");
        assert_eq!(cfg.queue_capacity, 10);
        assert_eq!(cfg.no_change_status, 304);
    }

    #[test]
    fn validate_rejects_empty_hash_rules() {
        let mut cfg = parse_toml(minimal_toml()).unwrap();
        cfg.cache.hash_rules.clear();
        let err = validate(&cfg).unwrap_err();
        match err {
            ConfigError::ValidationError { reasons } => {
                assert!(reasons.iter().any(|r| r.contains("hash_rules")));
            }
            _ => panic!("expected ValidationError"),
        }
    }

    #[test]
    fn validate_accepts_minimal_config() {
        let cfg = parse_toml(minimal_toml()).unwrap();
        assert!(validate(&cfg).is_ok());
    }

    #[test]
    fn legacy_loadable_string_form_round_trips() {
        #[derive(Deserialize)]
        struct Wrapper {
            load: LoadableConfig,
        }
        let w: Wrapper = toml::from_str(r#"load = "file+yaml:///etc/xdscp/ctx.yaml""#).unwrap();
        match w.load {
            LoadableConfig::Legacy(s) => assert_eq!(s, "file+yaml:///etc/xdscp/ctx.yaml"),
            LoadableConfig::Structured { .. } => panic!("expected legacy form"),
        }
    }
}
