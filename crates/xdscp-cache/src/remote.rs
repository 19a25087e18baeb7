//! Object-storage-backed remote cache tier, with compaction of the
//! registration log (section 4.4).

use crate::backend::CacheBackend;
use async_trait::async_trait;
use chrono::Utc;
use object_store::path::Path as ObjectPath;
use object_store::ObjectStore;
use std::sync::Arc;
use std::time::Duration;
use xdscp_core::RegisteredClient;
use xdscp_error::{ErrorCode, XdscpError};

/// Prefix under which per-writer registration objects are written.
pub const REGISTRATIONS_PREFIX: &str = "registrations-";
/// Substring marking a compacted registration snapshot, so readers can
/// distinguish it from the per-writer logs it replaced.
pub const COMPACTED_MARKER: &str = "-compacted-";

const WIRE_FORMAT_VERSION: u8 = 1;

fn encode_versioned(value: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(value.len() + 1);
    out.push(WIRE_FORMAT_VERSION);
    out.extend_from_slice(value);
    out
}

fn decode_versioned(bytes: &[u8]) -> Result<&[u8], XdscpError> {
    match bytes.split_first() {
        Some((&WIRE_FORMAT_VERSION, rest)) => Ok(rest),
        Some((other, _)) => Err(XdscpError::new(ErrorCode::CacheError, format!("unsupported remote cache wire version {other}"))),
        None => Err(XdscpError::new(ErrorCode::CacheError, "empty remote cache object")),
    }
}

/// Remote (object-storage) cache tier.
pub struct RemoteCache {
    store: Arc<dyn ObjectStore>,
    prefix: String,
    compaction_threshold: usize,
}

impl RemoteCache {
    #[must_use]
    pub fn new(store: Arc<dyn ObjectStore>, prefix: impl Into<String>, compaction_threshold: usize) -> Self {
        Self { store, prefix: prefix.into(), compaction_threshold }
    }

    fn blob_path(&self, key: &str) -> ObjectPath {
        ObjectPath::from(format!("{}/{}", self.prefix, urlencoding::encode(key)))
    }

    fn registration_path(&self, client_id: &str) -> ObjectPath {
        // Zero-padded millis timestamp keeps lexicographic order equal to
        // timestamp order, as section 4.4 requires for compaction.
        let ts = Utc::now().timestamp_millis();
        ObjectPath::from(format!(
            "{}/{REGISTRATIONS_PREFIX}{ts:020}-{}",
            self.prefix,
            urlencoding::encode(client_id)
        ))
    }

    /// Register a client as its own object under a timestamped key so
    /// concurrent writers never collide.
    pub async fn register_client(&self, client: &RegisteredClient) -> Result<(), XdscpError> {
        let body = serde_json::to_vec(client)
            .map_err(|e| XdscpError::new(ErrorCode::InternalError, "serialise registration").with_source(e))?;
        let path = self.registration_path(&client.client_id);
        self.store
            .put(&path, encode_versioned(&body).into())
            .await
            .map_err(|e| XdscpError::new(ErrorCode::CacheError, "write remote registration").with_source(e))?;

        if self.registration_object_count().await? > self.compaction_threshold {
            self.compact_registrations().await?;
        }
        Ok(())
    }

    async fn registration_object_count(&self) -> Result<usize, XdscpError> {
        let prefix = ObjectPath::from(format!("{}/{REGISTRATIONS_PREFIX}", self.prefix));
        let mut stream = self.store.list(Some(&prefix));
        let mut count = 0usize;
        use futures::StreamExt;
        while let Some(item) = stream.next().await {
            if item.is_ok() {
                count += 1;
            }
        }
        Ok(count)
    }

    /// List all currently registered clients, reading per-writer logs and
    /// any compacted snapshot, deduplicating by `client_id` (last writer —
    /// by lexicographic/timestamp key order — wins). Tolerates transient
    /// missing objects: a `NotFound` between list and get is skipped
    /// rather than failing the whole listing.
    pub async fn list_clients(&self) -> Result<Vec<RegisteredClient>, XdscpError> {
        let prefix = ObjectPath::from(format!("{}/{REGISTRATIONS_PREFIX}", self.prefix));
        use futures::StreamExt;
        let mut entries: Vec<ObjectPath> = self
            .store
            .list(Some(&prefix))
            .filter_map(|r| async move { r.ok().map(|m| m.location) })
            .collect()
            .await;
        entries.sort();

        let mut by_id = std::collections::BTreeMap::new();
        for path in entries {
            match self.store.get(&path).await {
                Ok(result) => {
                    let bytes = result
                        .bytes()
                        .await
                        .map_err(|e| XdscpError::new(ErrorCode::CacheError, "read registration object").with_source(e))?;
                    let payload = decode_versioned(&bytes)?;
                    if path.as_ref().contains(COMPACTED_MARKER) {
                        let clients: Vec<RegisteredClient> = serde_json::from_slice(payload).map_err(|e| {
                            XdscpError::new(ErrorCode::InternalError, "deserialise compacted snapshot").with_source(e)
                        })?;
                        for c in clients {
                            by_id.insert(c.client_id.clone(), c);
                        }
                    } else {
                        let client: RegisteredClient = serde_json::from_slice(payload)
                            .map_err(|e| XdscpError::new(ErrorCode::InternalError, "deserialise registration").with_source(e))?;
                        by_id.insert(client.client_id.clone(), client);
                    }
                }
                Err(object_store::Error::NotFound { .. }) => continue,
                Err(e) => return Err(XdscpError::new(ErrorCode::CacheError, "list remote registrations").with_source(e)),
            }
        }
        Ok(by_id.into_values().collect())
    }

    /// Collapse every per-writer registration object into one compacted
    /// snapshot and delete the originals.
    pub async fn compact_registrations(&self) -> Result<(), XdscpError> {
        let prefix = ObjectPath::from(format!("{}/{REGISTRATIONS_PREFIX}", self.prefix));
        use futures::StreamExt;
        let originals: Vec<ObjectPath> = self
            .store
            .list(Some(&prefix))
            .filter_map(|r| async move { r.ok().map(|m| m.location) })
            .collect()
            .await;

        let clients = self.list_clients().await?;
        let body = serde_json::to_vec(&clients)
            .map_err(|e| XdscpError::new(ErrorCode::InternalError, "serialise compacted snapshot").with_source(e))?;
        let ts = Utc::now().timestamp_millis();
        let compacted_path = ObjectPath::from(format!("{}/{REGISTRATIONS_PREFIX}{COMPACTED_MARKER}{ts:020}", self.prefix));
        self.store
            .put(&compacted_path, encode_versioned(&body).into())
            .await
            .map_err(|e| XdscpError::new(ErrorCode::CacheError, "write compacted snapshot").with_source(e))?;

        for path in originals {
            if path != compacted_path {
                let _ = self.store.delete(&path).await;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl CacheBackend for RemoteCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, XdscpError> {
        match self.store.get(&self.blob_path(key)).await {
            Ok(result) => {
                let bytes = result
                    .bytes()
                    .await
                    .map_err(|e| XdscpError::new(ErrorCode::CacheError, "read remote cache object").with_source(e))?;
                Ok(Some(decode_versioned(&bytes)?.to_vec()))
            }
            Err(object_store::Error::NotFound { .. }) => Ok(None),
            Err(e) => Err(XdscpError::new(ErrorCode::CacheError, "get remote cache object").with_source(e)),
        }
    }

    async fn set(&self, key: &str, value: Vec<u8>, _ttl: Option<Duration>) -> Result<(), XdscpError> {
        self.store
            .put(&self.blob_path(key), encode_versioned(&value).into())
            .await
            .map_err(|e| XdscpError::new(ErrorCode::CacheError, "set remote cache object").with_source(e))?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), XdscpError> {
        self.store
            .delete(&self.blob_path(key))
            .await
            .map_err(|e| XdscpError::new(ErrorCode::CacheError, "delete remote cache object").with_source(e))?;
        Ok(())
    }

    async fn enumerate(&self, prefix: &str) -> Result<Vec<String>, XdscpError> {
        use futures::StreamExt;
        let full_prefix = ObjectPath::from(format!("{}/{}", self.prefix, prefix));
        let keys: Vec<String> = self
            .store
            .list(Some(&full_prefix))
            .filter_map(|r| async move { r.ok().map(|m| m.location.to_string()) })
            .collect()
            .await;
        Ok(keys)
    }
}
