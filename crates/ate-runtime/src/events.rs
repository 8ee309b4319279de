//! The event bridge between a host event processor and script callbacks.
//!
//! Scripts subscribe through `events:subscribe(...)`, which calls the
//! `events_subscribe` primitive. That registers a [`Subscription`] with the
//! host's [`EventProcessor`]. When the processor delivers an event, the
//! subscription serializes it and invokes `events:post(id, json)` in the
//! owning runtime, where the script-side dispatcher finds the callback.

use crate::runtime::Runtime;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Weak};
use tracing::{debug, warn};

/// Name of the in-script dispatcher object.
pub const DISPATCH_OBJECT: &str = "events";

/// Name of the dispatcher's entry point.
pub const DISPATCH_METHOD: &str = "post";

/// An event as delivered by the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Event {
    /// Component that produced the event.
    pub source: String,

    /// Event type.
    pub event: String,

    /// Optional addressee within the source.
    #[serde(default)]
    pub target: String,

    /// Opaque payload.
    #[serde(default)]
    pub resource: serde_json::Value,

    /// When the event was produced.
    pub timestamp: DateTime<Utc>,
}

impl Event {
    /// Create an event stamped with the current time.
    pub fn new(
        source: impl Into<String>,
        event: impl Into<String>,
        resource: serde_json::Value,
    ) -> Self {
        Self {
            source: source.into(),
            event: event.into(),
            target: String::new(),
            resource,
            timestamp: Utc::now(),
        }
    }

    /// Address the event to a specific target.
    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = target.into();
        self
    }
}

/// A registered route from host events to a consumer.
pub trait Subscriber: Send + Sync {
    fn id(&self) -> &str;
    fn source(&self) -> &str;
    fn event_type(&self) -> &str;
    fn target(&self) -> &str;

    /// Deliver an event. Must not report failure back to the producer.
    fn post(&self, event: &Event);
}

/// The host event processor the bridge registers with.
///
/// Implementations must not call [`Subscriber::post`] from inside
/// `subscribe` or `unsubscribe`: those run while the subscribing runtime
/// is busy, and a synchronous post would wait on it forever.
pub trait EventProcessor: Send + Sync {
    /// Register `subscriber`, replacing any subscriber with the same id.
    fn subscribe(&self, subscriber: Arc<dyn Subscriber>);

    /// Remove the subscriber with `id`, if any.
    fn unsubscribe(&self, id: &str);

    /// Remove `subscriber` only if it is still the one registered under
    /// its id.
    ///
    /// Runtimes call this on shutdown, when a newer runtime of the same
    /// name may already hold the id. The default cannot tell subscribers
    /// apart and removes whatever holds the id.
    fn withdraw(&self, subscriber: &Arc<dyn Subscriber>) {
        self.unsubscribe(subscriber.id());
    }
}

/// Whether two handles point at the same subscriber.
pub fn same_subscriber(a: &Arc<dyn Subscriber>, b: &Arc<dyn Subscriber>) -> bool {
    Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
}

/// Subscription id for `(runtime, source, event_type)`.
///
/// The bootstrap dispatcher derives the same string, so subscribing twice
/// to the same pair from one runtime replaces the earlier subscription.
pub fn subscription_id(runtime: &str, source: &str, event_type: &str) -> String {
    format!("{runtime}_{source}_{event_type}")
}

/// A script-side subscription owned by a runtime.
pub struct Subscription {
    source: String,
    event_type: String,
    target: String,
    id: String,
    runtime: Weak<Runtime>,
}

impl Subscription {
    pub fn new(
        source: impl Into<String>,
        event_type: impl Into<String>,
        target: impl Into<String>,
        id: impl Into<String>,
        runtime: Weak<Runtime>,
    ) -> Self {
        Self {
            source: source.into(),
            event_type: event_type.into(),
            target: target.into(),
            id: id.into(),
            runtime,
        }
    }
}

impl Subscriber for Subscription {
    fn id(&self) -> &str {
        &self.id
    }

    fn source(&self) -> &str {
        &self.source
    }

    fn event_type(&self) -> &str {
        &self.event_type
    }

    fn target(&self) -> &str {
        &self.target
    }

    fn post(&self, event: &Event) {
        let Some(runtime) = self.runtime.upgrade() else {
            debug!(subscription = %self.id, "Dropping event for a runtime that no longer exists");
            return;
        };

        let payload = match serde_json::to_string(event) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(subscription = %self.id, "Failed to serialize event: {}", e);
                return;
            }
        };

        let args = [
            serde_json::Value::String(self.id.clone()),
            serde_json::Value::String(payload),
        ];
        if let Err(e) = runtime.call_func_on_obj(DISPATCH_OBJECT, DISPATCH_METHOD, &args) {
            warn!(
                runtime = %runtime.name(),
                subscription = %self.id,
                "Event dispatch failed: {}",
                e
            );
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("source", &self.source)
            .field("event_type", &self.event_type)
            .field("target", &self.target)
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}
