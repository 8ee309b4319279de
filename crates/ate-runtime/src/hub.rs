//! An in-memory [`EventProcessor`].
//!
//! Hosts with their own event bus implement [`EventProcessor`] directly.
//! `EventHub` covers the common case: subscribers keyed by id, matched on
//! source and event type, with optional async fan-out through a tokio task.

use crate::events::{same_subscriber, Event, EventProcessor, Subscriber};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Subscriber table with synchronous and queued delivery.
#[derive(Default)]
pub struct EventHub {
    subscribers: RwLock<HashMap<String, Arc<dyn Subscriber>>>,
}

impl EventHub {
    /// Create an empty hub.
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver `event` to every matching subscriber and return how many
    /// received it.
    ///
    /// A subscriber matches when its source and event type equal the
    /// event's, and its target is empty or equal to the event's target.
    /// Delivery happens on the calling thread, after the subscriber table
    /// has been released.
    pub fn post(&self, event: &Event) -> usize {
        let matching: Vec<Arc<dyn Subscriber>> = self
            .subscribers
            .read()
            .values()
            .filter(|sub| matches(sub.as_ref(), event))
            .cloned()
            .collect();

        for sub in &matching {
            sub.post(event);
        }
        debug!(
            source = %event.source,
            event = %event.event,
            delivered = matching.len(),
            "Posted event"
        );
        matching.len()
    }

    /// Number of registered subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Whether a subscriber with `id` is registered.
    pub fn is_subscribed(&self, id: &str) -> bool {
        self.subscribers.read().contains_key(id)
    }

    /// All registered ids, sorted.
    pub fn subscription_ids(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.subscribers.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Spawn a task that delivers queued events in order.
    ///
    /// Producers get fire-and-forget posting: sending never waits on a
    /// script. Each delivery runs on the blocking pool because script
    /// calls block. The task ends when every sender is dropped.
    pub fn spawn_dispatcher(hub: Arc<Self>) -> (mpsc::UnboundedSender<Event>, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::unbounded_channel::<Event>();
        let handle = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                let hub = Arc::clone(&hub);
                if let Err(e) = tokio::task::spawn_blocking(move || hub.post(&event)).await {
                    warn!("Event delivery task failed: {}", e);
                }
            }
            debug!("Event dispatcher stopped");
        });
        (tx, handle)
    }
}

impl EventProcessor for EventHub {
    fn subscribe(&self, subscriber: Arc<dyn Subscriber>) {
        let id = subscriber.id().to_string();
        let replaced = self.subscribers.write().insert(id.clone(), subscriber);
        debug!(subscription = %id, replaced = replaced.is_some(), "Subscribed");
    }

    fn unsubscribe(&self, id: &str) {
        if self.subscribers.write().remove(id).is_some() {
            debug!(subscription = %id, "Unsubscribed");
        }
    }

    fn withdraw(&self, subscriber: &Arc<dyn Subscriber>) {
        let id = subscriber.id();
        let mut subscribers = self.subscribers.write();
        let owned = subscribers
            .get(id)
            .is_some_and(|current| same_subscriber(current, subscriber));
        if owned {
            subscribers.remove(id);
            debug!(subscription = %id, "Withdrawn");
        } else {
            debug!(subscription = %id, "Not withdrawn, id belongs to another subscriber");
        }
    }
}

impl std::fmt::Debug for EventHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventHub")
            .field("subscribers", &self.subscription_ids())
            .finish()
    }
}

fn matches(sub: &dyn Subscriber, event: &Event) -> bool {
    sub.source() == event.source
        && sub.event_type() == event.event
        && (sub.target().is_empty() || sub.target() == event.target)
}
