// SPDX-License-Identifier: MIT OR Apache-2.0
//! The Worker: the single long-running process that owns the Source
//! Poller, the Template Context Scheduler, the Render Pipeline, the
//! Render Queue, and the client registration endpoint (section 4.11).
#![deny(unsafe_code)]

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::put;
use axum::{Json, Router};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{error, info, warn};
use xdscp_cache::DualCache;
use xdscp_cache::LocalCache;
use xdscp_context::TemplateContextScheduler;
use xdscp_core::{DiscoveryRequest, EventBus, RegisteredClient, Topic};
use xdscp_error::XdscpError;
use xdscp_queue::RenderQueue;
use xdscp_render::{render_in_subprocess, RenderJob, RenderPipeline};
use xdscp_source::Poller;

/// How a single render is actually executed. Section 4.8 requires each
/// render to run isolated in its own process so a crashing or looping
/// template can't take the worker down; `InProcess` exists for tests and
/// embedders that accept that risk in exchange for not re-exec'ing a
/// binary per render.
#[derive(Clone)]
pub enum RenderMode {
    /// Call the pipeline directly in the worker's own process.
    InProcess,
    /// Re-exec `self_exe` as a `render-worker` child per render, reloading
    /// config from `config_path`, killed after `timeout`.
    Subprocess { self_exe: PathBuf, config_path: PathBuf, timeout: Duration },
}

/// Everything the worker owns for the lifetime of the process. Built once
/// at startup and shared behind an `Arc` with every background task and
/// the registration HTTP handler.
pub struct Worker {
    source_snapshot: Arc<RwLock<xdscp_core::SourceData>>,
    scheduler: Arc<TemplateContextScheduler>,
    pipeline: Arc<RenderPipeline>,
    queue: Arc<RenderQueue>,
    cache: Arc<DualCache>,
    registration_store: Arc<LocalCache>,
    registered: RwLock<BTreeMap<String, DiscoveryRequest>>,
    events: EventBus,
    hash_rules: Vec<String>,
    local_ttl: Option<Duration>,
    render_mode: RenderMode,
}

/// Outcome of a single `PUT /client` registration.
#[derive(Debug, Clone, Serialize)]
pub struct RegisterOutcome {
    pub client_id: String,
    pub newly_registered: bool,
}

impl Worker {
    pub fn new(
        poller_snapshot: Arc<RwLock<xdscp_core::SourceData>>,
        scheduler: Arc<TemplateContextScheduler>,
        pipeline: Arc<RenderPipeline>,
        queue: Arc<RenderQueue>,
        cache: Arc<DualCache>,
        registration_store: Arc<LocalCache>,
        events: EventBus,
        hash_rules: Vec<String>,
        local_ttl: Option<Duration>,
        render_mode: RenderMode,
    ) -> Self {
        Self {
            source_snapshot: poller_snapshot,
            scheduler,
            pipeline,
            queue,
            cache,
            registration_store,
            registered: RwLock::new(BTreeMap::new()),
            events,
            hash_rules,
            local_ttl,
            render_mode,
        }
    }

    /// Load persisted registrations back into the in-memory lookup used by
    /// the render-driver loops, so a restarted worker keeps fanning out
    /// `NEW_CONTEXT` renders to clients it already knew about.
    pub async fn hydrate_registrations(&self) -> Result<(), XdscpError> {
        let clients = self.registration_store.list_clients()?;
        let mut map = self.registered.write().await;
        for client in clients {
            map.insert(client.client_id, client.request);
        }
        Ok(())
    }

    /// Register a client, persist it, and enqueue its first render. Safe to
    /// call repeatedly for the same logical client — the queue's own
    /// dedup means a second registration before the first render finishes
    /// never produces two renders.
    pub async fn register(&self, request: DiscoveryRequest) -> Result<RegisterOutcome, XdscpError> {
        let client_id = request.cache_key(&self.hash_rules)?;

        let newly_registered = {
            let mut map = self.registered.write().await;
            let is_new = !map.contains_key(&client_id);
            map.insert(client_id.clone(), request.clone());
            is_new
        };

        if newly_registered {
            let persisted = self
                .registration_store
                .insert_client_if_absent(&RegisteredClient { client_id: client_id.clone(), request })?;
            if !persisted {
                warn!(client_id, "registration raced with a concurrent insert");
            }
        }

        self.queue.enqueue(client_id.clone()).await?;
        Ok(RegisterOutcome { client_id, newly_registered })
    }

    /// Render one already-registered client and write the result through
    /// to the cache. Used by the queue-draining driver.
    async fn render_and_cache(&self, client_id: &str) -> Result<(), XdscpError> {
        let request = {
            let map = self.registered.read().await;
            map.get(client_id).cloned()
        };
        let Some(request) = request else {
            warn!(client_id, "render queue held an id with no known registration");
            return Ok(());
        };

        let source_data = self.source_snapshot.read().await.clone();
        let context_values = self.scheduler.snapshot().await;

        let entry = match &self.render_mode {
            RenderMode::InProcess => self.pipeline.render_entry(&request, &source_data, &context_values)?,
            RenderMode::Subprocess { self_exe, config_path, timeout } => {
                let job = RenderJob { request, source_data, context_values };
                let config_arg = config_path.to_string_lossy();
                render_in_subprocess(self_exe, &["--config", &config_arg], &job, *timeout).await?
            }
        };

        let encoded = serde_json::to_vec(&entry)
            .map_err(|e| XdscpError::new(xdscp_error::ErrorCode::InternalError, "entry not serialisable").with_source(e))?;
        self.cache.set(client_id, encoded, self.local_ttl).await?;
        Ok(())
    }

    /// The driver that wakes on `NEW_CONTEXT` and enqueues a render for
    /// every currently registered client (section 4.11's broadcast path).
    async fn run_new_context_driver(self: Arc<Self>) {
        let mut rx = self.events.subscribe();
        loop {
            match rx.recv().await {
                Ok(Topic::NewContext) => {
                    let ids: Vec<String> = self.registered.read().await.keys().cloned().collect();
                    info!(count = ids.len(), "new_context: fanning out renders");
                    for id in ids {
                        if let Err(e) = self.queue.enqueue(id).await {
                            warn!(error = %e, "failed to enqueue broadcast render");
                        }
                    }
                }
                Ok(Topic::SourcesChanged) => {}
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    warn!(skipped = n, "new_context driver lagged behind the event bus");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => return,
            }
        }
    }

    /// The driver that drains the render queue forever.
    async fn run_queue_driver(self: Arc<Self>) {
        loop {
            let Some(client_id) = self.queue.dequeue().await else {
                tokio::time::sleep(Duration::from_millis(50)).await;
                continue;
            };
            if let Err(e) = self.render_and_cache(&client_id).await {
                error!(client_id, error = %e, "render failed");
            }
            self.queue.task_done(&client_id).await;
        }
    }

    /// Spawn every background loop the worker owns: the caller also owns
    /// the Poller and drives it separately since `poll_once` needs `&mut
    /// self` and the worker only ever reads its published snapshot.
    pub fn spawn_background_tasks(self: Arc<Self>, mut poller: Poller, scheduler: Arc<TemplateContextScheduler>) {
        tokio::spawn(async move {
            poller.run_forever().await;
        });
        tokio::spawn(async move {
            scheduler.run_forever().await;
        });
        tokio::spawn(self.clone().run_new_context_driver());
        tokio::spawn(self.run_queue_driver());
    }

    /// Like [`Self::spawn_background_tasks`], but the context scheduler
    /// only refreshes on the replica elected leader by `gate`. Use this
    /// when more than one worker replica polls the same sources and
    /// shares a cache, so they don't all hit upstream context sources
    /// independently.
    pub fn spawn_background_tasks_electing_leader(
        self: Arc<Self>,
        mut poller: Poller,
        scheduler: Arc<TemplateContextScheduler>,
        gate: Arc<xdscp_context::LeaderGate>,
        node_id: String,
    ) {
        tokio::spawn(async move {
            poller.run_forever().await;
        });
        tokio::spawn(scheduler.run_forever_if_leader(gate, node_id, Duration::from_secs(5), Duration::from_secs(20)));
        tokio::spawn(self.clone().run_new_context_driver());
        tokio::spawn(self.run_queue_driver());
    }

    /// Build the registration router: `PUT /client` deduplicates
    /// registrations and enqueues a render, returning 202 for a fresh
    /// registration and 200 for one that already existed.
    pub fn router(self: Arc<Self>) -> Router {
        Router::new().route("/client", put(handle_register)).with_state(self)
    }
}

/// `PUT /client` body: `{request: DiscoveryRequest}` (section 6).
#[derive(Debug, serde::Deserialize)]
struct RegisterBody {
    request: DiscoveryRequest,
}

async fn handle_register(State(worker): State<Arc<Worker>>, Json(body): Json<RegisterBody>) -> (StatusCode, Json<serde_json::Value>) {
    match worker.register(body.request).await {
        Ok(outcome) => {
            let status = if outcome.newly_registered { StatusCode::ACCEPTED } else { StatusCode::OK };
            (status, Json(serde_json::json!({"client_id": outcome.client_id})))
        }
        Err(e) if e.code() == xdscp_error::ErrorCode::QueueFull => {
            (StatusCode::TOO_MANY_REQUESTS, Json(serde_json::json!({"error": e.to_string()})))
        }
        Err(e) => (StatusCode::from_u16(e.code().http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR), Json(serde_json::json!({"error": e.to_string()}))),
    }
}
