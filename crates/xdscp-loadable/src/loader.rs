//! Protocol fetch + deserialiser dispatch — the `load(default)` operation.

use crate::registry::LoadRegistry;
use crate::spec::{Deserializer, LoadableSpec, Protocol};
use serde_json::Value;
use xdscp_error::{ErrorCode, XdscpError};

/// Everything a [`LoadableSpec`] might need to actually fetch its value:
/// the module/package-data registry and a shared HTTP client. Constructed
/// once at startup and passed explicitly — no global singleton.
#[derive(Clone)]
pub struct LoadContext {
    pub registry: LoadRegistry,
    http: reqwest::Client,
}

impl LoadContext {
    #[must_use]
    pub fn new(registry: LoadRegistry) -> Self {
        Self { registry, http: reqwest::Client::new() }
    }
}

impl Default for LoadContext {
    fn default() -> Self {
        Self::new(LoadRegistry::new())
    }
}

/// Fetch and deserialise `spec`. On any failure, returns `default` if
/// supplied; otherwise surfaces [`ErrorCode::LoadError`].
pub async fn load(spec: &LoadableSpec, ctx: &LoadContext, default: Option<Value>) -> Result<Value, XdscpError> {
    match fetch_and_deserialize(spec, ctx).await {
        Ok(v) => Ok(v),
        Err(e) => default.ok_or(e),
    }
}

async fn fetch_and_deserialize(spec: &LoadableSpec, ctx: &LoadContext) -> Result<Value, XdscpError> {
    match spec.protocol {
        Protocol::Inline => deserialize(spec.path.as_bytes(), &spec.serialization),
        Protocol::Env => {
            let raw = std::env::var(&spec.path)
                .map_err(|e| load_error(spec, e))?;
            deserialize(raw.as_bytes(), &spec.serialization)
        }
        Protocol::File => {
            let raw = tokio::fs::read(&spec.path).await.map_err(|e| load_error(spec, e))?;
            deserialize(&raw, &spec.serialization)
        }
        Protocol::Http => {
            let resp = ctx
                .http
                .get(&spec.path)
                .send()
                .await
                .map_err(|e| load_error(spec, e))?
                .error_for_status()
                .map_err(|e| load_error(spec, e))?;
            let raw = resp.bytes().await.map_err(|e| load_error(spec, e))?;
            deserialize(&raw, &spec.serialization)
        }
        Protocol::Module => ctx.registry.resolve_module(&spec.path),
        Protocol::PackageData => ctx.registry.resolve_package_data(&spec.path),
        Protocol::S3 => {
            let (bucket, key) = spec
                .path
                .split_once('/')
                .ok_or_else(|| XdscpError::new(ErrorCode::LoadError, format!("s3 path {:?} missing bucket/key separator", spec.path)))?;
            let store = object_store::aws::AmazonS3Builder::from_env()
                .with_bucket_name(bucket)
                .build()
                .map_err(|e| load_error(spec, e))?;
            let object_path = object_store::path::Path::from(key);
            let get = object_store::ObjectStore::get(&store, &object_path)
                .await
                .map_err(|e| load_error(spec, e))?;
            let bytes = get.bytes().await.map_err(|e| load_error(spec, e))?;
            deserialize(&bytes, &spec.serialization)
        }
    }
}

fn load_error(spec: &LoadableSpec, cause: impl std::error::Error + Send + Sync + 'static) -> XdscpError {
    XdscpError::new(ErrorCode::LoadError, format!("failed to load {:?}", spec.path)).with_source(cause)
}

fn deserialize(raw: &[u8], how: &Deserializer) -> Result<Value, XdscpError> {
    match how {
        Deserializer::Raw => Ok(Value::String(String::from_utf8_lossy(raw).into_owned())),
        Deserializer::String => Ok(Value::String(String::from_utf8_lossy(raw).into_owned())),
        Deserializer::Json => serde_json::from_slice(raw)
            .map_err(|e| XdscpError::new(ErrorCode::DeserialiseError, "invalid json").with_source(e)),
        Deserializer::Yaml => serde_yaml::from_slice(raw)
            .map_err(|e| XdscpError::new(ErrorCode::DeserialiseError, "invalid yaml").with_source(e)),
        Deserializer::Jinja => {
            // Compiling as a template just validates the source parses;
            // the value handed back is the canonical source text itself.
            let src = String::from_utf8_lossy(raw).into_owned();
            let mut env = minijinja::Environment::new();
            env.add_template("inline", &src)
                .map_err(|e| XdscpError::new(ErrorCode::DeserialiseError, "invalid jinja template").with_source(e))?;
            Ok(Value::String(src))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::parse_legacy_string;
    use serde_json::json;

    #[tokio::test]
    async fn inline_protocol_returns_literal_path() {
        let spec = parse_legacy_string("inline:///hello").unwrap();
        let ctx = LoadContext::default();
        let v = load(&spec, &ctx, None).await.unwrap();
        assert_eq!(v, json!("/hello"));
    }

    #[tokio::test]
    async fn env_protocol_reads_and_deserialises_json() {
        unsafe {
            std::env::set_var("XDSCP_TEST_LOADABLE", r#"{"a":1}"#);
        }
        let spec = LoadableSpec {
            protocol: Protocol::Env,
            path: "XDSCP_TEST_LOADABLE".to_string(),
            serialization: Deserializer::Json,
            interval: None,
            retry_policy: None,
        };
        let ctx = LoadContext::default();
        let v = load(&spec, &ctx, None).await.unwrap();
        assert_eq!(v, json!({"a": 1}));
    }

    #[tokio::test]
    async fn missing_env_var_falls_back_to_default() {
        let spec = LoadableSpec {
            protocol: Protocol::Env,
            path: "XDSCP_DEFINITELY_NOT_SET".to_string(),
            serialization: Deserializer::Raw,
            interval: None,
            retry_policy: None,
        };
        let ctx = LoadContext::default();
        let v = load(&spec, &ctx, Some(json!("fallback"))).await.unwrap();
        assert_eq!(v, json!("fallback"));
    }

    #[tokio::test]
    async fn missing_env_var_without_default_is_load_error() {
        let spec = LoadableSpec {
            protocol: Protocol::Env,
            path: "XDSCP_DEFINITELY_NOT_SET_EITHER".to_string(),
            serialization: Deserializer::Raw,
            interval: None,
            retry_policy: None,
        };
        let ctx = LoadContext::default();
        let err = load(&spec, &ctx, None).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::LoadError);
    }
}
