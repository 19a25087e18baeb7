//! Leader election for the context-refresh loop across worker replicas
//! (supplementing, not replacing, the single-process scheduler): a
//! heartbeat table and a lowest-id-wins rule, modelled on the v2
//! prototype's leader gate.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Tracks which worker replicas are alive and decides which one runs the
/// context-refresh loop. Safe to share across tasks — every method takes
/// `&self`.
pub struct LeaderGate {
    heartbeats: Mutex<BTreeMap<String, Instant>>,
}

impl LeaderGate {
    #[must_use]
    pub fn new() -> Self {
        Self { heartbeats: Mutex::new(BTreeMap::new()) }
    }

    /// Record that `node_id` is alive as of now.
    pub fn send_heartbeat(&self, node_id: &str) {
        self.heartbeats.lock().expect("leader gate lock poisoned").insert(node_id.to_string(), Instant::now());
    }

    /// Drop any node whose last heartbeat is older than `timeout`.
    pub fn prune_dead_nodes(&self, timeout: Duration) {
        let now = Instant::now();
        self.heartbeats.lock().expect("leader gate lock poisoned").retain(|_, last_seen| now.duration_since(*last_seen) < timeout);
    }

    /// Whether `node_id` is the leader: the lexicographically lowest id
    /// among nodes that have ever sent a heartbeat and not since been
    /// pruned. A node that never heartbeat is never the leader.
    #[must_use]
    pub fn is_leader(&self, node_id: &str) -> bool {
        let heartbeats = self.heartbeats.lock().expect("leader gate lock poisoned");
        match heartbeats.keys().next() {
            Some(lowest) => lowest == node_id,
            None => false,
        }
    }
}

impl Default for LeaderGate {
    fn default() -> Self {
        Self::new()
    }
}
