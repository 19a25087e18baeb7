// SPDX-License-Identifier: MIT OR Apache-2.0
//! The Render Queue: a bounded, deduplicating queue keyed by `client_id`
//! (section 4.9).
//!
//! Enqueuing an id already queued is a no-op. Enqueuing an id that is
//! currently being rendered marks it to re-enter once that render
//! finishes, guaranteeing at most one in-flight render per id without
//! ever dropping a request for fresher data.
#![deny(unsafe_code)]

use std::collections::{HashSet, VecDeque};
use tokio::sync::Mutex;
use xdscp_error::{ErrorCode, XdscpError};

/// A bounded, deduplicating FIFO queue of client ids awaiting a render.
pub struct RenderQueue {
    inner: Mutex<Inner>,
    capacity: usize,
}

struct Inner {
    queued: VecDeque<String>,
    queued_set: HashSet<String>,
    in_flight: HashSet<String>,
    pending_again: HashSet<String>,
}

impl RenderQueue {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                queued: VecDeque::new(),
                queued_set: HashSet::new(),
                in_flight: HashSet::new(),
                pending_again: HashSet::new(),
            }),
            capacity,
        }
    }

    /// Enqueue `client_id`. No-op if already queued or in flight (in the
    /// in-flight case, it's marked to run again once the current render
    /// completes). Errors with [`ErrorCode::QueueFull`] only when the id
    /// is genuinely new and the queue is at capacity.
    pub async fn enqueue(&self, client_id: impl Into<String>) -> Result<(), XdscpError> {
        let client_id = client_id.into();
        let mut inner = self.inner.lock().await;

        if inner.in_flight.contains(&client_id) {
            inner.pending_again.insert(client_id);
            return Ok(());
        }
        if inner.queued_set.contains(&client_id) {
            return Ok(());
        }
        if inner.queued.len() >= self.capacity {
            return Err(XdscpError::new(ErrorCode::QueueFull, "render queue at capacity").with_context("client_id", &client_id));
        }
        inner.queued_set.insert(client_id.clone());
        inner.queued.push_back(client_id);
        Ok(())
    }

    /// Pop the next id to render, marking it in-flight.
    pub async fn dequeue(&self) -> Option<String> {
        let mut inner = self.inner.lock().await;
        let id = inner.queued.pop_front()?;
        inner.queued_set.remove(&id);
        inner.in_flight.insert(id.clone());
        Some(id)
    }

    /// Mark `client_id`'s render complete. If it was re-enqueued while in
    /// flight, push it back onto the queue now, bypassing the capacity
    /// check — this re-entry represents work already accounted for, not
    /// new backpressure.
    pub async fn task_done(&self, client_id: &str) {
        let mut inner = self.inner.lock().await;
        inner.in_flight.remove(client_id);
        if inner.pending_again.remove(client_id) {
            inner.queued_set.insert(client_id.to_string());
            inner.queued.push_back(client_id.to_string());
        }
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.queued.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn duplicate_enqueue_is_a_no_op() {
        let queue = RenderQueue::new(10);
        for _ in 0..5 {
            queue.enqueue("client_1").await.unwrap();
        }
        assert_eq!(queue.len().await, 1);
    }

    #[tokio::test]
    async fn full_queue_rejects_new_ids() {
        let queue = RenderQueue::new(1);
        queue.enqueue("a").await.unwrap();
        let err = queue.enqueue("b").await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::QueueFull);
    }

    #[tokio::test]
    async fn in_flight_id_reenters_after_task_done() {
        let queue = RenderQueue::new(10);
        queue.enqueue("client_1").await.unwrap();
        assert_eq!(queue.dequeue().await.unwrap(), "client_1");
        // Enqueued again while in flight: should not appear in the queue yet.
        queue.enqueue("client_1").await.unwrap();
        assert_eq!(queue.len().await, 0);
        queue.task_done("client_1").await;
        assert_eq!(queue.len().await, 1);
        assert_eq!(queue.dequeue().await.unwrap(), "client_1");
    }

    #[tokio::test]
    async fn fifo_among_distinct_ids() {
        let queue = RenderQueue::new(10);
        queue.enqueue("a").await.unwrap();
        queue.enqueue("b").await.unwrap();
        queue.enqueue("c").await.unwrap();
        assert_eq!(queue.dequeue().await.unwrap(), "a");
        assert_eq!(queue.dequeue().await.unwrap(), "b");
        assert_eq!(queue.dequeue().await.unwrap(), "c");
    }
}
