//! Parsed shape of a Loadable address.

use xdscp_config::LoadableConfig;

/// Bundled source protocols. `module` resolves a name against a
/// build-time [`crate::registry::ModuleRegistry`] rather than importing
/// arbitrary code at runtime — see the crate-level docs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Protocol {
    File,
    PackageData,
    Http,
    Env,
    Module,
    S3,
    Inline,
}

impl Protocol {
    fn parse(s: &str) -> Result<Self, String> {
        Ok(match s {
            "file" => Protocol::File,
            "package-data" => Protocol::PackageData,
            "http" | "https" => Protocol::Http,
            "env" => Protocol::Env,
            "module" => Protocol::Module,
            "s3" => Protocol::S3,
            "inline" => Protocol::Inline,
            other => return Err(format!("unknown loadable protocol {other:?}")),
        })
    }
}

/// Bundled deserialisers.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub enum Deserializer {
    #[default]
    Raw,
    Yaml,
    Json,
    String,
    Jinja,
}

impl Deserializer {
    fn parse(s: &str) -> Result<Self, String> {
        Ok(match s {
            "" | "raw" => Deserializer::Raw,
            "yaml" => Deserializer::Yaml,
            "json" => Deserializer::Json,
            "string" => Deserializer::String,
            "jinja" => Deserializer::Jinja,
            other => return Err(format!("unknown deserialiser {other:?}")),
        })
    }
}

/// The fully parsed, structured form of a Loadable address.
#[derive(Clone, Debug)]
pub struct LoadableSpec {
    pub protocol: Protocol,
    pub path: String,
    pub serialization: Deserializer,
    pub interval: Option<xdscp_config::TaskInterval>,
    pub retry_policy: Option<xdscp_config::RetryPolicy>,
}

/// Parse the legacy `"<proto>[+<ser>]://<path>"` string form, e.g.
/// `"file+yaml:///etc/xdscp/ctx.yaml"` or `"env://MY_VAR"`.
pub fn parse_legacy_string(s: &str) -> Result<LoadableSpec, String> {
    let (scheme, rest) = s.split_once("://").ok_or_else(|| format!("not a loadable URI: {s:?}"))?;
    let (proto_str, ser_str) = match scheme.split_once('+') {
        Some((p, ser)) => (p, ser),
        None => (scheme, ""),
    };
    Ok(LoadableSpec {
        protocol: Protocol::parse(proto_str)?,
        path: rest.to_string(),
        serialization: Deserializer::parse(ser_str)?,
        interval: None,
        retry_policy: None,
    })
}

/// Resolve a [`LoadableConfig`] (either form from the config file) into a
/// structured [`LoadableSpec`].
pub fn from_config(config: &LoadableConfig) -> Result<LoadableSpec, String> {
    match config {
        LoadableConfig::Legacy(s) => parse_legacy_string(s),
        LoadableConfig::Structured { protocol, path, serialization, interval, retry_policy } => Ok(LoadableSpec {
            protocol: Protocol::parse(protocol)?,
            path: path.clone(),
            serialization: Deserializer::parse(serialization)?,
            interval: interval.clone(),
            retry_policy: *retry_policy,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_legacy_with_serialisation() {
        let spec = parse_legacy_string("file+yaml:///etc/xdscp/ctx.yaml").unwrap();
        assert_eq!(spec.protocol, Protocol::File);
        assert_eq!(spec.serialization, Deserializer::Yaml);
        assert_eq!(spec.path, "/etc/xdscp/ctx.yaml");
    }

    #[test]
    fn parses_legacy_without_serialisation() {
        let spec = parse_legacy_string("env://MY_VAR").unwrap();
        assert_eq!(spec.protocol, Protocol::Env);
        assert_eq!(spec.serialization, Deserializer::Raw);
        assert_eq!(spec.path, "MY_VAR");
    }

    #[test]
    fn rejects_unknown_protocol() {
        assert!(parse_legacy_string("carrier-pigeon://x").is_err());
    }
}
