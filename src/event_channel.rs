//! Synchronous publish/subscribe channel for metric events
//!
//! Producers (selectors, the dispatch timer) publish [`PerfEvent`]s; consumers
//! (the analytics aggregator, the JSON Lines recorder, a dashboard) subscribe
//! per [`Topic`].
//!
//! # Delivery guarantees
//!
//! - Delivery is synchronous, on the publisher's stack, in registration order.
//! - The listener list is snapshotted before delivery: a listener added while
//!   an event is being delivered first sees the *next* event.
//! - A panicking listener is isolated. The panic is logged and delivery
//!   continues with the remaining listeners; the publisher never sees it.
//! - No queuing, no replay, no cross-thread hand-off.

use crate::event::{PerfEvent, Topic};
use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

/// Callback invoked for every event on a subscribed topic
pub type Listener = Arc<dyn Fn(&PerfEvent) + Send + Sync>;

struct Registration {
    id: u64,
    listener: Listener,
}

#[derive(Default)]
struct ChannelInner {
    next_id: AtomicU64,
    topics: Mutex<HashMap<Topic, Vec<Registration>>>,
}

impl ChannelInner {
    fn remove(&self, topic: Topic, id: u64) {
        let mut topics = self.topics.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(registrations) = topics.get_mut(&topic) {
            registrations.retain(|r| r.id != id);
        }
    }
}

/// In-process event channel
///
/// Cloning yields another handle to the same channel.
///
/// # Example
///
/// ```
/// use statemeter::event::{PerfEvent, StateSizeSample, Topic};
/// use statemeter::event_channel::EventChannel;
/// use std::sync::atomic::{AtomicU64, Ordering};
/// use std::sync::Arc;
///
/// let channel = EventChannel::new();
/// let seen = Arc::new(AtomicU64::new(0));
/// let counter = seen.clone();
/// let subscription = channel.subscribe(Topic::StateSize, move |event| {
///     if let PerfEvent::StateSize(sample) = event {
///         counter.store(sample.size, Ordering::SeqCst);
///     }
/// });
///
/// channel.publish(PerfEvent::StateSize(StateSizeSample { size: 512, timestamp: 0 }));
/// assert_eq!(seen.load(Ordering::SeqCst), 512);
///
/// subscription.unsubscribe();
/// subscription.unsubscribe(); // second call is a no-op
/// ```
#[derive(Clone, Default)]
pub struct EventChannel {
    inner: Arc<ChannelInner>,
}

impl EventChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `listener` for `topic`
    ///
    /// The returned [`Subscription`] removes exactly this registration when
    /// unsubscribed or dropped.
    #[must_use = "dropping a Subscription unsubscribes the listener"]
    pub fn subscribe<F>(&self, topic: Topic, listener: F) -> Subscription
    where
        F: Fn(&PerfEvent) + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner
            .topics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(topic)
            .or_default()
            .push(Registration {
                id,
                listener: Arc::new(listener),
            });

        Subscription {
            channel: Arc::downgrade(&self.inner),
            topic,
            id,
            active: AtomicBool::new(true),
        }
    }

    /// Deliver `event` to every listener currently registered for its topic
    pub fn publish(&self, event: PerfEvent) {
        let topic = event.topic();
        let listeners: Vec<Listener> = {
            let topics = self
                .inner
                .topics
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            match topics.get(&topic) {
                Some(registrations) => registrations.iter().map(|r| r.listener.clone()).collect(),
                None => return,
            }
        };

        for listener in listeners {
            if panic::catch_unwind(AssertUnwindSafe(|| listener(&event))).is_err() {
                tracing::error!(topic = %topic, "event listener panicked; continuing delivery");
            }
        }
    }

    /// Number of listeners registered for `topic`
    pub fn listener_count(&self, topic: Topic) -> usize {
        self.inner
            .topics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&topic)
            .map_or(0, Vec::len)
    }
}

impl fmt::Debug for EventChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("EventChannel");
        for topic in Topic::ALL {
            debug.field(topic.as_str(), &self.listener_count(topic));
        }
        debug.finish()
    }
}

/// Handle to one listener registration
///
/// Unsubscribing is idempotent. Dropping the handle unsubscribes too.
pub struct Subscription {
    channel: Weak<ChannelInner>,
    topic: Topic,
    id: u64,
    active: AtomicBool,
}

impl Subscription {
    /// Remove the listener; later calls do nothing
    pub fn unsubscribe(&self) {
        if self.active.swap(false, Ordering::AcqRel) {
            if let Some(channel) = self.channel.upgrade() {
                channel.remove(self.topic, self.id);
            }
        }
    }

    pub fn topic(&self) -> Topic {
        self.topic
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire) && self.channel.strong_count() > 0
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("topic", &self.topic)
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}
