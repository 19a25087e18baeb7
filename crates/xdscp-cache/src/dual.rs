//! Local-first read, optional remote fallback, write-through cache
//! (section 4.5).

use crate::backend::CacheBackend;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;
use xdscp_error::XdscpError;

/// Wraps a required local tier and an optional remote tier. When only
/// local is configured the dual layer collapses to a pass-through.
pub struct DualCache {
    local: Arc<dyn CacheBackend>,
    remote: Option<Arc<dyn CacheBackend>>,
    provisional_ttl: Duration,
}

impl DualCache {
    #[must_use]
    pub fn new(local: Arc<dyn CacheBackend>, remote: Option<Arc<dyn CacheBackend>>, provisional_ttl: Duration) -> Self {
        Self { local, remote, provisional_ttl }
    }

    /// Local first; on miss, fall back to remote and write the value back
    /// to local under a provisional TTL so a cold replica warms up without
    /// waiting for the worker to re-render.
    pub async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, XdscpError> {
        if let Some(hit) = self.local.get(key).await? {
            return Ok(Some(hit));
        }
        let Some(remote) = &self.remote else {
            return Ok(None);
        };
        match remote.get(key).await {
            Ok(Some(value)) => {
                if let Err(e) = self.local.set(key, value.clone(), Some(self.provisional_ttl)).await {
                    warn!(error = %e, "dual cache: write-back to local failed");
                }
                Ok(Some(value))
            }
            Ok(None) => Ok(None),
            Err(e) => {
                warn!(error = %e, "dual cache: remote read failed, treating as miss");
                Ok(None)
            }
        }
    }

    /// Write to local unconditionally; write to remote best-effort. Remote
    /// failure is logged and never fails the caller's request.
    pub async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<(), XdscpError> {
        self.local.set(key, value.clone(), ttl).await?;
        if let Some(remote) = &self.remote {
            if let Err(e) = remote.set(key, value, ttl).await {
                warn!(error = %e, "dual cache: remote write failed, continuing with local only");
            }
        }
        Ok(())
    }

    /// Delete from both; success iff the local delete succeeded.
    pub async fn delete(&self, key: &str) -> Result<(), XdscpError> {
        self.local.delete(key).await?;
        if let Some(remote) = &self.remote {
            if let Err(e) = remote.delete(key).await {
                warn!(error = %e, "dual cache: remote delete failed");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local::LocalCache;
    use crate::remote::RemoteCache;
    use object_store::memory::InMemory;

    #[tokio::test]
    async fn cold_replica_falls_back_to_remote_and_writes_back() {
        let remote = Arc::new(RemoteCache::new(Arc::new(InMemory::new()), "p", 100));
        remote.set("fp1", b"cached".to_vec(), None).await.unwrap();

        let local_dir = tempfile::tempdir().unwrap();
        let local: Arc<dyn CacheBackend> = Arc::new(LocalCache::new(local_dir.path()).unwrap());
        let dual = DualCache::new(local.clone(), Some(remote), Duration::from_secs(30));

        assert_eq!(dual.get("fp1").await.unwrap(), Some(b"cached".to_vec()));
        // Second read must hit local without touching remote.
        assert_eq!(local.get("fp1").await.unwrap(), Some(b"cached".to_vec()));
    }

    #[tokio::test]
    async fn local_only_collapses_cleanly() {
        let local_dir = tempfile::tempdir().unwrap();
        let local: Arc<dyn CacheBackend> = Arc::new(LocalCache::new(local_dir.path()).unwrap());
        let dual = DualCache::new(local, None, Duration::from_secs(30));
        dual.set("k", b"v".to_vec(), None).await.unwrap();
        assert_eq!(dual.get("k").await.unwrap(), Some(b"v".to_vec()));
    }

    #[tokio::test]
    async fn miss_on_both_tiers_returns_none() {
        let local_dir = tempfile::tempdir().unwrap();
        let local: Arc<dyn CacheBackend> = Arc::new(LocalCache::new(local_dir.path()).unwrap());
        let remote: Arc<dyn CacheBackend> = Arc::new(RemoteCache::new(Arc::new(InMemory::new()), "p", 100));
        let dual = DualCache::new(local, Some(remote), Duration::from_secs(30));
        assert_eq!(dual.get("nope").await.unwrap(), None);
    }
}
