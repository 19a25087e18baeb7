//! The Source Poller's refresh loop (section 4.6).

use crate::matching::{instance_match_value, matches, node_match_value};
use crate::modifier::{apply_modifiers, GlobalModifier, Modifier};
use crate::source::Source;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{info, warn};
use xdscp_core::{diff, DiffOp, EventBus, Node, SourceData, Topic};

/// Matching configuration the poller consults each cycle.
#[derive(Clone, Debug)]
pub struct MatchingConfig {
    pub enabled: bool,
    pub node_key: String,
    pub source_key: String,
    pub debug: bool,
}

/// Retry/backoff configuration for source failures.
#[derive(Clone, Copy, Debug)]
pub struct PollerRetryConfig {
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub normal_interval: Duration,
}

impl Default for PollerRetryConfig {
    fn default() -> Self {
        Self { max_retries: 5, retry_delay: Duration::from_secs(1), normal_interval: Duration::from_secs(30) }
    }
}

/// The Source Poller: iterates configured sources, diffs the result
/// against what it currently holds, applies modifiers, and signals
/// `SourcesChanged` on the event bus when the snapshot actually changes.
pub struct Poller {
    sources: Vec<Box<dyn Source>>,
    global_modifiers: Vec<Box<dyn GlobalModifier>>,
    modifiers: Vec<Box<dyn Modifier>>,
    matching: MatchingConfig,
    retry: PollerRetryConfig,
    current: Arc<RwLock<SourceData>>,
    events: EventBus,
    retry_count: u32,
    last_backoff: Duration,
}

impl Poller {
    pub fn new(
        sources: Vec<Box<dyn Source>>,
        global_modifiers: Vec<Box<dyn GlobalModifier>>,
        modifiers: Vec<Box<dyn Modifier>>,
        matching: MatchingConfig,
        retry: PollerRetryConfig,
        events: EventBus,
    ) -> Self {
        Self {
            sources,
            global_modifiers,
            modifiers,
            matching,
            retry,
            current: Arc::new(RwLock::new(SourceData::new())),
            events,
            retry_count: 0,
            last_backoff: retry.retry_delay,
        }
    }

    #[must_use]
    pub fn snapshot_handle(&self) -> Arc<RwLock<SourceData>> {
        self.current.clone()
    }

    #[must_use]
    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    /// Run one poll cycle: fetch every source, apply modifiers, compare to
    /// the held snapshot, and swap it in on change. Returns the diff ops
    /// computed for observability (empty when unchanged).
    pub async fn poll_once(&mut self) -> Result<Vec<DiffOp>, xdscp_error::XdscpError> {
        let mut new_data = SourceData::new();
        for source in &self.sources {
            match source.get().await {
                Ok(instances) => {
                    let modified = apply_modifiers(&instances, &self.global_modifiers, &self.modifiers);
                    new_data.set_scope(source.scope(), modified);
                }
                Err(e) => {
                    self.retry_count += 1;
                    warn!(error = %e, scope = source.scope(), retry_count = self.retry_count, "source poll failed");
                    let backoff = self.retry.retry_delay * 2u32.saturating_pow(self.retry_count.saturating_sub(1));
                    self.last_backoff = backoff.min(self.retry.normal_interval);
                    if self.retry_count >= self.retry.max_retries {
                        warn!(scope = source.scope(), "source poller giving up retries for this cycle, resuming normal cadence");
                        self.retry_count = 0;
                    }
                    return Err(e);
                }
            }
        }

        self.retry_count = 0;

        let current = self.current.read().await.clone();
        if new_data == current {
            info!("sources.unchanged");
            return Ok(Vec::new());
        }

        let ops = diff(&current, &new_data);
        {
            let mut guard = self.current.write().await;
            *guard = new_data;
        }
        self.events.publish(Topic::SourcesChanged);
        Ok(ops)
    }

    /// Run `poll_once` forever. A successful cycle sleeps the normal
    /// cadence; a failed cycle sleeps exactly once, for the single capped
    /// backoff `poll_once` just computed — never both.
    pub async fn run_forever(&mut self) {
        loop {
            match self.poll_once().await {
                Ok(_) => tokio::time::sleep(self.retry.normal_interval).await,
                Err(_) => tokio::time::sleep(self.last_backoff).await,
            }
        }
    }
}

/// Match a node against every instance across every scope of `data`,
/// returning only the instances that match (or all of them, if matching is
/// globally disabled).
#[must_use]
pub fn match_node(node: &Node, data: &SourceData, config: &MatchingConfig) -> SourceData {
    let mut out = SourceData::new();
    if !config.enabled {
        for (scope, instances) in data.scopes() {
            out.set_scope(scope, instances.to_vec());
        }
        return out;
    }

    let node_value = node_match_value(node, &config.node_key);
    for (scope, instances) in data.scopes() {
        let kept: Vec<_> = instances
            .iter()
            .filter(|inst| {
                let source_value = instance_match_value(inst, &config.source_key);
                matches(&node_value, &source_value, config.debug)
            })
            .cloned()
            .collect();
        out.set_scope(scope, kept);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::InlineSource;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicU32, Ordering};
    use xdscp_core::DEFAULT_SCOPE;

    fn matching() -> MatchingConfig {
        MatchingConfig { enabled: true, node_key: "cluster".into(), source_key: "example".into(), debug: false }
    }

    #[tokio::test]
    async fn wildcard_cluster_matches_everything() {
        let mut data = SourceData::new();
        data.set_scope(
            DEFAULT_SCOPE,
            vec![json!({"name": "a", "example": "foo"}), json!({"name": "b", "example": "foo"}), json!({"name": "c", "example": "baz"})],
        );
        let node = Node::new("p", "*");
        let matched = match_node(&node, &data, &matching());
        assert_eq!(matched.default_scope().len(), 3);
    }

    #[tokio::test]
    async fn cluster_filter_keeps_only_matching_instances() {
        let mut data = SourceData::new();
        data.set_scope(
            DEFAULT_SCOPE,
            vec![json!({"name": "a", "example": "foo"}), json!({"name": "b", "example": "foo"}), json!({"name": "c", "example": "baz"})],
        );
        let node = Node::new("p", "foo");
        let matched = match_node(&node, &data, &matching());
        let names: Vec<_> = matched.default_scope().iter().map(|v| v["name"].clone()).collect();
        assert_eq!(names, vec![json!("a"), json!("b")]);
    }

    struct FlakySource {
        attempts: AtomicU32,
        scope: String,
    }

    #[async_trait]
    impl Source for FlakySource {
        async fn get(&self) -> Result<Vec<Value>, xdscp_error::XdscpError> {
            let n = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
            if n <= 2 {
                return Err(xdscp_error::XdscpError::new(xdscp_error::ErrorCode::SourceError, "flaky"));
            }
            Ok(vec![json!({"name": "ok"})])
        }
        fn scope(&self) -> &str {
            &self.scope
        }
    }

    #[tokio::test]
    async fn retries_then_succeeds_and_resets_count() {
        let source = FlakySource { attempts: AtomicU32::new(0), scope: DEFAULT_SCOPE.to_string() };
        let retry = PollerRetryConfig { max_retries: 5, retry_delay: Duration::from_millis(1), normal_interval: Duration::from_millis(5) };
        let mut poller = Poller::new(vec![Box::new(source)], vec![], vec![], matching(), retry, EventBus::default());

        assert!(poller.poll_once().await.is_err());
        assert_eq!(poller.retry_count(), 1);
        assert!(poller.poll_once().await.is_err());
        assert_eq!(poller.retry_count(), 2);
        poller.poll_once().await.unwrap();
        assert_eq!(poller.retry_count(), 0);
    }

    #[tokio::test]
    async fn run_forever_sleeps_backoff_once_not_backoff_plus_normal_interval() {
        let source = FlakySource { attempts: AtomicU32::new(0), scope: DEFAULT_SCOPE.to_string() };
        let retry = PollerRetryConfig { max_retries: 5, retry_delay: Duration::from_millis(40), normal_interval: Duration::from_secs(10) };
        let mut poller = Poller::new(vec![Box::new(source)], vec![], vec![], matching(), retry, EventBus::default());

        // Two failing cycles (40ms, 80ms backoff) then a success. If
        // `run_forever` slept `backoff + normal_interval` on failure this
        // would take >10s and the timeout below would fire.
        tokio::time::timeout(Duration::from_secs(2), async {
            let snapshot = poller.snapshot_handle();
            tokio::spawn(async move { poller.run_forever().await });
            loop {
                if !snapshot.read().await.default_scope().is_empty() {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("run_forever took far longer than the expected backoff-only delay");
    }

    #[tokio::test]
    async fn unchanged_snapshot_does_not_republish() {
        let source = InlineSource::new(DEFAULT_SCOPE, vec![json!({"name": "a"})]);
        let retry = PollerRetryConfig::default();
        let mut poller = Poller::new(vec![Box::new(source)], vec![], vec![], matching(), retry, EventBus::default());
        let ops_first = poller.poll_once().await.unwrap();
        assert!(!ops_first.is_empty());
        let ops_second = poller.poll_once().await.unwrap();
        assert!(ops_second.is_empty());
    }
}
