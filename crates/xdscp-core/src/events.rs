//! A small topic-based event bus breaking the poller/context/render
//! cyclic reference the original system had (design note, section 9):
//! components publish and subscribe by topic, none holds a reference to
//! another.

/// Topics components publish on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Topic {
    /// The Source Poller replaced its held [`crate::SourceData`] snapshot.
    SourcesChanged,
    /// The Template Context Scheduler's debounced publish fired.
    NewContext,
}

/// Thin wrapper over a broadcast channel. Cloning shares the same
/// underlying bus; every clone can publish and every subscriber sees every
/// publish that happens after it subscribed.
#[derive(Clone)]
pub struct EventBus {
    tx: tokio::sync::broadcast::Sender<Topic>,
}

impl EventBus {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = tokio::sync::broadcast::channel(capacity);
        Self { tx }
    }

    pub fn publish(&self, topic: Topic) {
        // No subscribers is a normal, not an error, state.
        let _ = self.tx.send(topic);
    }

    #[must_use]
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<Topic> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(64)
    }
}
