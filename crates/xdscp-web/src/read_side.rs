//! The blocking read: compute a fingerprint, read the cache, register
//! with the worker on miss, and poll until the render lands or the read
//! times out (section 4.10).

use reqwest::StatusCode;
use std::time::{Duration, Instant};
use tracing::warn;
use xdscp_cache::DualCache;
use xdscp_core::{DiscoveryRequest, Entry};
use xdscp_error::{ErrorCode, XdscpError};

/// Everything the read side needs: the cache it reads from, the worker
/// it registers new clients with, and the fingerprinting rules that turn
/// a request into a cache key.
pub struct ReadSide {
    cache: std::sync::Arc<DualCache>,
    http: reqwest::Client,
    worker_url: String,
    hash_rules: Vec<String>,
    poll_interval: Duration,
    read_timeout: Duration,
}

impl ReadSide {
    #[must_use]
    pub fn new(cache: std::sync::Arc<DualCache>, worker_url: impl Into<String>, hash_rules: Vec<String>, poll_interval: Duration, read_timeout: Duration) -> Self {
        Self {
            cache,
            http: reqwest::Client::new(),
            worker_url: worker_url.into(),
            hash_rules,
            poll_interval,
            read_timeout,
        }
    }

    #[must_use]
    pub fn fingerprint(&self, request: &DiscoveryRequest) -> Result<String, XdscpError> {
        request.cache_key(&self.hash_rules)
    }

    /// The full blocking-read flow. Returns `Ok(None)` when nothing ever
    /// landed before `read_timeout` elapsed ("no resources" per section
    /// 4.10), never an error for that case.
    pub async fn get_or_register(&self, request: &DiscoveryRequest) -> Result<Option<Entry>, XdscpError> {
        let fingerprint = self.fingerprint(request)?;

        if let Some(entry) = self.read_cache(&fingerprint).await? {
            return Ok(Some(entry));
        }

        self.register_with_backoff(request).await?;

        let deadline = Instant::now() + self.read_timeout;
        loop {
            if let Some(entry) = self.read_cache(&fingerprint).await? {
                return Ok(Some(entry));
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    async fn read_cache(&self, fingerprint: &str) -> Result<Option<Entry>, XdscpError> {
        let Some(bytes) = self.cache.get(fingerprint).await? else {
            return Ok(None);
        };
        let entry: Entry = serde_json::from_slice(&bytes)
            .map_err(|e| XdscpError::new(ErrorCode::DeserialiseError, "cached entry is not valid").with_source(e))?;
        Ok(Some(entry))
    }

    /// `PUT /client` with exponential backoff on 429, a fixed retry delay
    /// on any other non-success status, bounded overall by `read_timeout`.
    async fn register_with_backoff(&self, request: &DiscoveryRequest) -> Result<(), XdscpError> {
        let deadline = Instant::now() + self.read_timeout;
        let mut backoff = Duration::from_millis(100);

        loop {
            let resp = self
                .http
                .put(format!("{}/client", self.worker_url))
                .json(&serde_json::json!({"request": request}))
                .send()
                .await;

            match resp {
                Ok(r) if r.status() == StatusCode::OK || r.status() == StatusCode::ACCEPTED => return Ok(()),
                Ok(r) if r.status() == StatusCode::TOO_MANY_REQUESTS => {
                    warn!(backoff_ms = backoff.as_millis() as u64, "worker registration rate-limited, backing off");
                    if Instant::now() + backoff >= deadline {
                        return Err(XdscpError::new(ErrorCode::QueueFull, "worker registration still rate-limited at read timeout"));
                    }
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(self.read_timeout);
                }
                Ok(r) => {
                    warn!(status = r.status().as_u16(), "unexpected registration response, retrying after fixed delay");
                    if Instant::now() >= deadline {
                        return Err(XdscpError::new(ErrorCode::SourceError, "worker registration failed before read timeout"));
                    }
                    tokio::time::sleep(Duration::from_millis(250)).await;
                }
                Err(e) => {
                    if Instant::now() >= deadline {
                        return Err(XdscpError::new(ErrorCode::SourceError, "failed to reach worker for registration").with_source(e));
                    }
                    tokio::time::sleep(Duration::from_millis(250)).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xdscp_cache::LocalCache;
    use xdscp_core::{ApiVersion, Node, ResourceType};

    fn sample_request() -> DiscoveryRequest {
        DiscoveryRequest {
            node: Node::new("p1", "c1"),
            version_info: String::new(),
            resource_names: vec![],
            api_version: ApiVersion::V3,
            resource_type: ResourceType::Clusters,
            desired_controlplane: None,
            is_internal_request: false,
        }
    }

    #[tokio::test]
    async fn cache_hit_returns_entry_without_registering() {
        let dir = tempfile::tempdir().unwrap();
        let local = std::sync::Arc::new(LocalCache::new(dir.path()).unwrap());
        let cache = std::sync::Arc::new(DualCache::new(local, None, Duration::from_secs(30)));
        let read_side = ReadSide::new(cache.clone(), "http://unreachable.invalid:0", vec!["node.cluster".into()], Duration::from_millis(10), Duration::from_millis(50));

        let request = sample_request();
        let fingerprint = read_side.fingerprint(&request).unwrap();
        let entry = Entry::new("{}".to_string(), "v1".to_string(), request.node.clone());
        cache.set(&fingerprint, serde_json::to_vec(&entry).unwrap(), None).await.unwrap();

        let result = read_side.get_or_register(&request).await.unwrap();
        assert_eq!(result.unwrap().version, "v1");
    }

    #[tokio::test]
    async fn miss_with_unreachable_worker_times_out_to_none() {
        let dir = tempfile::tempdir().unwrap();
        let local = std::sync::Arc::new(LocalCache::new(dir.path()).unwrap());
        let cache = std::sync::Arc::new(DualCache::new(local, None, Duration::from_secs(30)));
        let read_side = ReadSide::new(cache, "http://127.0.0.1:1", vec!["node.cluster".into()], Duration::from_millis(10), Duration::from_millis(200));

        let result = read_side.get_or_register(&sample_request()).await;
        assert!(result.is_err() || result.unwrap().is_none());
    }
}
