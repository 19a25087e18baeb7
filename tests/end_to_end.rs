//! Cross-crate integration tests: a registered client's discovery request
//! flows from the worker's registration endpoint, through the render
//! queue and pipeline, into the dual cache, and back out through the
//! web read side — the path no single crate's unit tests exercise alone.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tower::ServiceExt;
use xdscp_cache::{DualCache, LocalCache};
use xdscp_context::TemplateContextScheduler;
use xdscp_core::{ApiVersion, DiscoveryRequest, EventBus, Node, ResourceType, SourceData, TemplateSpec};
use xdscp_loadable::{LoadContext, LoadRegistry};
use xdscp_queue::RenderQueue;
use xdscp_render::{RenderPipeline, TemplateTable};
use xdscp_source::{MatchingConfig, Poller, PollerRetryConfig};
use xdscp_worker::{RenderMode, Worker};

fn sample_request() -> DiscoveryRequest {
    DiscoveryRequest {
        node: Node::new("proxy-1", "foo"),
        version_info: String::new(),
        resource_names: vec![],
        api_version: ApiVersion::V3,
        resource_type: ResourceType::Clusters,
        desired_controlplane: None,
        is_internal_request: false,
    }
}

fn matching() -> MatchingConfig {
    MatchingConfig { enabled: false, node_key: "cluster".into(), source_key: "example".into(), debug: false }
}

async fn build_worker() -> (Arc<Worker>, Arc<DualCache>, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let local = Arc::new(LocalCache::new(dir.path()).unwrap());
    let cache = Arc::new(DualCache::new(local.clone(), None, Duration::from_secs(30)));

    let mut table = TemplateTable::new();
    table.insert("default", ResourceType::Clusters, TemplateSpec::Text { source: "resources:\n  - name: c1\n".to_string() });
    let pipeline = Arc::new(RenderPipeline::new(table, LoadRegistry::new()));

    let scheduler = Arc::new(TemplateContextScheduler::new(vec![], EventBus::default(), LoadContext::default()));
    let queue = Arc::new(RenderQueue::new(10));

    let worker = Arc::new(Worker::new(
        Arc::new(RwLock::new(SourceData::new())),
        scheduler.clone(),
        pipeline,
        queue,
        cache.clone(),
        local,
        EventBus::default(),
        vec!["node.cluster".to_string()],
        None,
        RenderMode::InProcess,
    ));

    let poller = Poller::new(vec![], vec![], vec![], matching(), PollerRetryConfig::default(), EventBus::default());
    worker.clone().spawn_background_tasks(poller, scheduler);

    (worker, cache, dir)
}

/// A `PUT /client` registration must be visible in the dual cache once the
/// queue driver has had a chance to drain it, without the caller ever
/// touching the render pipeline or queue directly.
#[tokio::test]
async fn registration_flows_through_queue_and_lands_in_cache() {
    let (worker, cache, _dir) = build_worker().await;

    let body = serde_json::to_vec(&serde_json::json!({"request": sample_request()})).unwrap();
    let response = worker
        .clone()
        .router()
        .oneshot(Request::builder().method("PUT").uri("/client").header("content-type", "application/json").body(Body::from(body)).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let fingerprint = sample_request().cache_key(&["node.cluster".to_string()]).unwrap();

    let mut cached = None;
    for _ in 0..50 {
        if let Some(bytes) = cache.get(&fingerprint).await.unwrap() {
            cached = Some(bytes);
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    let bytes = cached.expect("render queue driver should have rendered and cached the entry");
    let entry: xdscp_core::Entry = serde_json::from_slice(&bytes).unwrap();
    assert!(entry.text.contains("\"name\":\"c1\""));
}

/// The web read side serves an already-cached entry by fingerprint alone,
/// never contacting the worker at all — the fast path for a repeat poll.
#[tokio::test]
async fn web_read_side_serves_cached_entry_without_contacting_worker() {
    let (_worker, cache, _dir) = build_worker().await;

    let request = sample_request();
    let fingerprint = request.cache_key(&["node.cluster".to_string()]).unwrap();
    let entry = xdscp_core::Entry::new(
        serde_json::json!({"version_info": "v1", "resources": [{"name": "c1"}]}).to_string(),
        "v1".to_string(),
        request.node.clone(),
    );
    cache.set(&fingerprint, serde_json::to_vec(&entry).unwrap(), None).await.unwrap();

    let read_side =
        Arc::new(xdscp_web::ReadSide::new(cache, "http://127.0.0.1:1", vec!["node.cluster".to_string()], Duration::from_millis(10), Duration::from_millis(200)));
    let state = xdscp_web::WebState { read_side, no_change_status: 304 };

    let body = serde_json::to_vec(&request).unwrap();
    let response = xdscp_web::router(state)
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v3/discovery:clusters")
                .header("content-type", "application/json")
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(json["version_info"], "v1");
}

/// A repeat request whose `version_info` already matches the cached
/// version gets the configured no-change status with an empty body,
/// never a full resource payload.
#[tokio::test]
async fn matching_version_info_short_circuits_to_no_change_status() {
    let (_worker, cache, _dir) = build_worker().await;

    let mut request = sample_request();
    let fingerprint = request.cache_key(&["node.cluster".to_string()]).unwrap();
    let entry = xdscp_core::Entry::new(
        serde_json::json!({"version_info": "v1", "resources": [{"name": "c1"}]}).to_string(),
        "v1".to_string(),
        request.node.clone(),
    );
    cache.set(&fingerprint, serde_json::to_vec(&entry).unwrap(), None).await.unwrap();
    request.version_info = "v1".to_string();

    let read_side =
        Arc::new(xdscp_web::ReadSide::new(cache, "http://127.0.0.1:1", vec!["node.cluster".to_string()], Duration::from_millis(10), Duration::from_millis(200)));
    let state = xdscp_web::WebState { read_side, no_change_status: 304 };

    let body = serde_json::to_vec(&request).unwrap();
    let response = xdscp_web::router(state)
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v3/discovery:clusters")
                .header("content-type", "application/json")
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_MODIFIED);
}
