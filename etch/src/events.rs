//! Cache-change event fan-out.
//!
//! Subscribers each own a bounded queue. Publishing never waits: an event that does
//! not fit a subscriber's queue is dropped for that subscriber, and a subscriber whose
//! receiving side is gone is removed.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use etch_core::CacheEvent;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

/// Handle identifying one subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

type Subscribers = DashMap<SubscriberId, mpsc::Sender<CacheEvent>>;

/// Registry of event subscribers.
///
/// Cloning is cheap; clones share the same subscriber set.
#[derive(Clone)]
pub struct EventBroadcaster {
    subscribers: Arc<Subscribers>,
    next_id: Arc<AtomicU64>,
    buffer: usize,
}

impl EventBroadcaster {
    /// Creates a broadcaster whose subscribers buffer up to `buffer` events.
    pub fn new(buffer: usize) -> Self {
        Self {
            subscribers: Arc::new(DashMap::new()),
            next_id: Arc::new(AtomicU64::new(0)),
            buffer: buffer.max(1),
        }
    }

    /// Registers a new subscriber.
    pub fn subscribe(&self) -> Subscription {
        let id = SubscriberId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (sender, receiver) = mpsc::channel(self.buffer);
        self.subscribers.insert(id, sender);
        debug!(subscriber = id.0, "subscribed to cache events");
        Subscription {
            id,
            receiver,
            subscribers: self.subscribers.clone(),
        }
    }

    /// Removes exactly the subscriber `id`. Returns whether it was registered.
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        self.subscribers.remove(&id).is_some()
    }

    /// Number of registered subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Delivers `event` to every registered subscriber without waiting.
    pub fn publish(&self, event: CacheEvent) {
        let span = tracing::debug_span!("etch.events", kind = event.kind().as_str());
        let _entered = span.enter();

        // Snapshot the senders so no shard lock is held while delivering.
        let targets: Vec<_> = self
            .subscribers
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();

        for (id, sender) in targets {
            match sender.try_send(event.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    warn!(subscriber = id.0, resource = %event.resource(), "subscriber lagging, event dropped");
                    crate::metrics::record_dropped_event();
                }
                Err(TrySendError::Closed(_)) => {
                    self.subscribers.remove(&id);
                    debug!(subscriber = id.0, "removed closed subscriber");
                }
            }
        }
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new(64)
    }
}

/// Receiving side of a subscription. Dropping it unsubscribes.
pub struct Subscription {
    id: SubscriberId,
    receiver: mpsc::Receiver<CacheEvent>,
    subscribers: Arc<Subscribers>,
}

impl Subscription {
    /// Handle of this subscription.
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Waits for the next event. `None` once unsubscribed and drained.
    pub async fn recv(&mut self) -> Option<CacheEvent> {
        self.receiver.recv().await
    }

    /// Returns a buffered event, if any.
    pub fn try_recv(&mut self) -> Option<CacheEvent> {
        self.receiver.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.subscribers.remove(&self.id);
    }
}
