//! The heap-driven refresh loop and debounced change notification
//! (section 4.7).

use crate::task::{seconds_til_next_run, ContextTask};
use std::collections::{BTreeMap, BinaryHeap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use xdscp_core::{ContextResult, EventBus, Topic};
use xdscp_loadable::LoadContext;

const DEBOUNCE: Duration = Duration::from_secs(3);

/// Heap entry: ordered by `due_at` only (monotonic clock), the task name is
/// payload.
struct HeapEntry {
    due_at: std::time::Instant,
    task_name: String,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.due_at == other.due_at
    }
}
impl Eq for HeapEntry {}
impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // BinaryHeap is a max-heap; we want earliest-due first, so reverse.
        other.due_at.cmp(&self.due_at)
    }
}

/// Maintains the set of named context tasks and their last-known results.
pub struct TemplateContextScheduler {
    tasks: BTreeMap<String, ContextTask>,
    results: Arc<RwLock<BTreeMap<String, ContextResult>>>,
    in_flight: Arc<Mutex<HashSet<String>>>,
    events: EventBus,
    debounce_handle: Arc<Mutex<Option<JoinHandle<()>>>>,
    load_ctx: LoadContext,
}

impl TemplateContextScheduler {
    #[must_use]
    pub fn new(tasks: Vec<ContextTask>, events: EventBus, load_ctx: LoadContext) -> Self {
        let mut map = BTreeMap::new();
        let mut results = BTreeMap::new();
        for t in tasks {
            results.insert(t.name.clone(), ContextResult::pending(t.name.clone()));
            map.insert(t.name.clone(), t);
        }
        Self {
            tasks: map,
            results: Arc::new(RwLock::new(results)),
            in_flight: Arc::new(Mutex::new(HashSet::new())),
            events,
            debounce_handle: Arc::new(Mutex::new(None)),
            load_ctx,
        }
    }

    #[must_use]
    pub fn results_handle(&self) -> Arc<RwLock<BTreeMap<String, ContextResult>>> {
        self.results.clone()
    }

    /// Snapshot the current results as a plain map, for render context
    /// construction.
    pub async fn snapshot(&self) -> BTreeMap<String, ContextResult> {
        self.results.read().await.clone()
    }

    /// Refresh a single task: retry up to `num_retries` times with
    /// `interval_seconds` between attempts, then record FAILED; a success
    /// records READY. Re-entering a task already in flight is a no-op.
    pub async fn refresh_task(&self, name: &str) {
        {
            let mut in_flight = self.in_flight.lock().expect("in_flight lock poisoned");
            if !in_flight.insert(name.to_string()) {
                return; // single-flight: already running
            }
        }

        let Some(task) = self.tasks.get(name).cloned() else {
            self.in_flight.lock().expect("in_flight lock poisoned").remove(name);
            return;
        };

        let previous_hash = self.results.read().await.get(name).map(ContextResult::content_hash);

        let mut last_err = None;
        let mut result = None;
        // `num_retries` retries in addition to the first attempt, not the
        // total attempt count.
        let attempts = task.retry_policy.num_retries.saturating_add(1);
        for attempt in 0..attempts {
            match xdscp_loadable::load(&task.spec, &self.load_ctx, None).await {
                Ok(value) => {
                    result = Some(ContextResult::ready(name, value));
                    break;
                }
                Err(e) => {
                    warn!(task = name, attempt, error = %e, "context task load failed");
                    last_err = Some(e);
                    if attempt + 1 < attempts {
                        tokio::time::sleep(Duration::from_secs(task.retry_policy.interval_seconds)).await;
                    }
                }
            }
        }
        let new_result = result.unwrap_or_else(|| {
            ContextResult::failed(name, last_err.map(|e| e.to_string()).unwrap_or_else(|| "unknown error".to_string()))
        });

        let changed = previous_hash != Some(new_result.content_hash());
        self.results.write().await.insert(name.to_string(), new_result);
        self.in_flight.lock().expect("in_flight lock poisoned").remove(name);

        if changed {
            self.schedule_debounced_publish();
        }
    }

    /// Cancel any pending debounced publish and schedule a new one 3
    /// seconds out, coalescing bursts of near-simultaneous changes into a
    /// single `NewContext` event.
    fn schedule_debounced_publish(&self) {
        let mut guard = self.debounce_handle.lock().expect("debounce lock poisoned");
        if let Some(handle) = guard.take() {
            handle.abort();
        }
        let events = self.events.clone();
        *guard = Some(tokio::spawn(async move {
            tokio::time::sleep(DEBOUNCE).await;
            events.publish(Topic::NewContext);
        }));
    }

    /// Like [`Self::run_forever`], but yields to a [`crate::LeaderGate`]
    /// first: multiple worker replicas can run this loop, and only the
    /// elected leader actually refreshes tasks, avoiding every replica
    /// hitting the same upstream sources independently. Heartbeats every
    /// `heartbeat_interval`; replicas last seen more than `dead_after` ago
    /// are pruned before each leadership check.
    pub async fn run_forever_if_leader(
        self: Arc<Self>,
        gate: Arc<crate::LeaderGate>,
        node_id: String,
        heartbeat_interval: Duration,
        dead_after: Duration,
    ) {
        let heartbeat_gate = gate.clone();
        let heartbeat_node = node_id.clone();
        tokio::spawn(async move {
            loop {
                heartbeat_gate.send_heartbeat(&heartbeat_node);
                heartbeat_gate.prune_dead_nodes(dead_after);
                tokio::time::sleep(heartbeat_interval).await;
            }
        });

        loop {
            if gate.is_leader(&node_id) {
                self.clone().run_forever().await;
                return;
            }
            tokio::time::sleep(heartbeat_interval).await;
        }
    }

    /// Drive the heap loop forever: pop the earliest-due task, sleep until
    /// due, re-push with its next due time, and spawn its refresh
    /// concurrently (fire-and-forget).
    pub async fn run_forever(self: Arc<Self>) {
        let mut heap: BinaryHeap<HeapEntry> = self
            .tasks
            .keys()
            .map(|name| HeapEntry { due_at: std::time::Instant::now(), task_name: name.clone() })
            .collect();

        loop {
            let Some(HeapEntry { due_at, task_name }) = heap.pop() else {
                return; // no tasks configured
            };
            let now = std::time::Instant::now();
            if due_at > now {
                tokio::time::sleep(due_at - now).await;
            }

            let secs = self
                .tasks
                .get(&task_name)
                .map(|t| seconds_til_next_run(&t.interval, chrono::Utc::now()))
                .unwrap_or(60)
                .max(0) as u64;
            heap.push(HeapEntry { due_at: std::time::Instant::now() + Duration::from_secs(secs), task_name: task_name.clone() });

            let this = self.clone();
            tokio::spawn(async move {
                this.refresh_task(&task_name).await;
            });
            info!(task = task_name, "context task refresh scheduled");
        }
    }
}
