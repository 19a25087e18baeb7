//! The Cache Backend capability contract (section 4.2).

use async_trait::async_trait;
use std::time::Duration;
use xdscp_error::XdscpError;

/// Get/set/enumerate over opaque blobs keyed by fingerprint. Implementations
/// must be safe for concurrent reads and writes; writes are last-writer-wins.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, XdscpError>;

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<(), XdscpError>;

    /// Optional in the protocol; the default emulates deletion with a
    /// zero-TTL overwrite of an empty value, as section 4.2 allows.
    async fn delete(&self, key: &str) -> Result<(), XdscpError> {
        self.set(key, Vec::new(), Some(Duration::ZERO)).await
    }

    async fn enumerate(&self, prefix: &str) -> Result<Vec<String>, XdscpError>;
}
