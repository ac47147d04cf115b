//! In-process publish/subscribe event channel.
//!
//! The only coupling mechanism between the turn controller, engine
//! supervisor, wake client, and conversation engine. Synchronous and
//! process-local: `publish` invokes current subscribers for the event's
//! topic in subscription order. A panicking handler is caught and logged so
//! one faulty listener cannot block the others.

use crate::engines::EngineState;
use crate::turn::{AmplitudeSample, CaptureMode, CaptureOutcome};
use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex};

/// Topics events are grouped under for subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Wake-word sidecar detected an activation phrase.
    WakeTriggered,
    /// A capture session started.
    CaptureStarted,
    /// A capture session stopped (auto, manual, or barge-in).
    CaptureStopped,
    /// Per-frame loudness sample for UI feedback.
    Amplitude,
    /// User spoke over synthesis playback.
    BargeIn,
    /// Synthesis playback started.
    SpeechStarted,
    /// Synthesis playback ended.
    SpeechEnded,
    /// A supervised engine changed readiness state.
    EngineState,
    /// The wake socket went down (possibly permanently).
    WakeSocketDown,
}

/// Tagged event payloads, one variant per topic.
#[derive(Debug, Clone)]
pub enum BusEvent {
    WakeTriggered { persona: String },
    CaptureStarted { mode: CaptureMode },
    CaptureStopped { outcome: CaptureOutcome },
    Amplitude { sample: AmplitudeSample },
    BargeIn,
    SpeechStarted,
    SpeechEnded,
    EngineState { name: String, state: EngineState },
    WakeSocketDown { permanent: bool },
}

impl BusEvent {
    /// The topic this event is delivered under.
    pub fn topic(&self) -> Topic {
        match self {
            BusEvent::WakeTriggered { .. } => Topic::WakeTriggered,
            BusEvent::CaptureStarted { .. } => Topic::CaptureStarted,
            BusEvent::CaptureStopped { .. } => Topic::CaptureStopped,
            BusEvent::Amplitude { .. } => Topic::Amplitude,
            BusEvent::BargeIn => Topic::BargeIn,
            BusEvent::SpeechStarted => Topic::SpeechStarted,
            BusEvent::SpeechEnded => Topic::SpeechEnded,
            BusEvent::EngineState { .. } => Topic::EngineState,
            BusEvent::WakeSocketDown { .. } => Topic::WakeSocketDown,
        }
    }
}

type Handler = Arc<dyn Fn(&BusEvent) + Send + Sync>;

#[derive(Default)]
struct Registry {
    next_id: u64,
    subscribers: HashMap<Topic, Vec<(u64, Handler)>>,
}

/// Handle for a single subscription; consume it to unsubscribe.
#[must_use = "dropping a Subscription without unsubscribing leaves the handler registered"]
pub struct Subscription {
    topic: Topic,
    id: u64,
    registry: Arc<Mutex<Registry>>,
}

impl Subscription {
    /// Remove the handler from the bus. Idempotent by construction: each
    /// subscription owns exactly one registry entry.
    pub fn unsubscribe(self) {
        let mut registry = self.registry.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(handlers) = registry.subscribers.get_mut(&self.topic) {
            handlers.retain(|(id, _)| *id != self.id);
        }
    }
}

/// The shared event channel. Cheap to clone; clones share one registry.
#[derive(Clone, Default)]
pub struct EventBus {
    registry: Arc<Mutex<Registry>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for one topic. Handlers run synchronously inside
    /// `publish`, in subscription order.
    pub fn subscribe<F>(&self, topic: Topic, handler: F) -> Subscription
    where
        F: Fn(&BusEvent) + Send + Sync + 'static,
    {
        let mut registry = self.registry.lock().unwrap_or_else(|e| e.into_inner());
        let id = registry.next_id;
        registry.next_id += 1;
        registry
            .subscribers
            .entry(topic)
            .or_default()
            .push((id, Arc::new(handler)));
        Subscription {
            topic,
            id,
            registry: Arc::clone(&self.registry),
        }
    }

    /// Deliver an event to every current subscriber of its topic.
    ///
    /// The subscriber list is snapshotted before dispatch so handlers may
    /// subscribe or unsubscribe reentrantly without deadlocking.
    pub fn publish(&self, event: BusEvent) {
        let topic = event.topic();
        let handlers: Vec<Handler> = {
            let registry = self.registry.lock().unwrap_or_else(|e| e.into_inner());
            registry
                .subscribers
                .get(&topic)
                .map(|h| h.iter().map(|(_, f)| Arc::clone(f)).collect())
                .unwrap_or_default()
        };

        for handler in handlers {
            if catch_unwind(AssertUnwindSafe(|| handler(&event))).is_err() {
                tracing::error!(?topic, "event handler panicked; continuing with remaining subscribers");
            }
        }
    }

    /// Number of subscribers currently registered for a topic.
    pub fn subscriber_count(&self, topic: Topic) -> usize {
        let registry = self.registry.lock().unwrap_or_else(|e| e.into_inner());
        registry
            .subscribers
            .get(&topic)
            .map(|h| h.len())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn publish_reaches_subscriber() {
        let bus = EventBus::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let hits_clone = Arc::clone(&hits);
        let sub = bus.subscribe(Topic::BargeIn, move |_| {
            hits_clone.fetch_add(1, Ordering::SeqCst);
        });

        bus.publish(BusEvent::BargeIn);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        sub.unsubscribe();
    }

    #[test]
    fn publish_only_reaches_matching_topic() {
        let bus = EventBus::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let hits_clone = Arc::clone(&hits);
        let sub = bus.subscribe(Topic::SpeechStarted, move |_| {
            hits_clone.fetch_add(1, Ordering::SeqCst);
        });

        bus.publish(BusEvent::SpeechEnded);
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        bus.publish(BusEvent::SpeechStarted);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        sub.unsubscribe();
    }

    #[test]
    fn subscribers_run_in_subscription_order() {
        let bus = EventBus::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        let o1 = Arc::clone(&order);
        let s1 = bus.subscribe(Topic::BargeIn, move |_| o1.lock().unwrap().push(1));
        let o2 = Arc::clone(&order);
        let s2 = bus.subscribe(Topic::BargeIn, move |_| o2.lock().unwrap().push(2));
        let o3 = Arc::clone(&order);
        let s3 = bus.subscribe(Topic::BargeIn, move |_| o3.lock().unwrap().push(3));

        bus.publish(BusEvent::BargeIn);
        assert_eq!(*order.lock().unwrap(), vec![1, 2, 3]);

        s1.unsubscribe();
        s2.unsubscribe();
        s3.unsubscribe();
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let bus = EventBus::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let hits_clone = Arc::clone(&hits);
        let sub = bus.subscribe(Topic::BargeIn, move |_| {
            hits_clone.fetch_add(1, Ordering::SeqCst);
        });

        bus.publish(BusEvent::BargeIn);
        sub.unsubscribe();
        bus.publish(BusEvent::BargeIn);

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(bus.subscriber_count(Topic::BargeIn), 0);
    }

    #[test]
    fn panicking_handler_does_not_block_others() {
        let bus = EventBus::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let s1 = bus.subscribe(Topic::BargeIn, |_| panic!("faulty listener"));
        let hits_clone = Arc::clone(&hits);
        let s2 = bus.subscribe(Topic::BargeIn, move |_| {
            hits_clone.fetch_add(1, Ordering::SeqCst);
        });

        bus.publish(BusEvent::BargeIn);
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        s1.unsubscribe();
        s2.unsubscribe();
    }

    #[test]
    fn handler_may_subscribe_reentrantly() {
        let bus = EventBus::new();
        let inner_bus = bus.clone();
        let late = Arc::new(Mutex::new(Vec::new()));

        let late_clone = Arc::clone(&late);
        let sub = bus.subscribe(Topic::BargeIn, move |_| {
            // Subscribing from inside a handler must not deadlock.
            let s = inner_bus.subscribe(Topic::SpeechEnded, |_| {});
            late_clone.lock().unwrap().push(s);
        });

        bus.publish(BusEvent::BargeIn);
        assert_eq!(bus.subscriber_count(Topic::SpeechEnded), 1);

        sub.unsubscribe();
        let Ok(late) = Arc::try_unwrap(late) else {
            panic!("late subscription list still shared");
        };
        for s in late.into_inner().unwrap() {
            s.unsubscribe();
        }
    }

    #[test]
    fn clones_share_one_registry() {
        let bus = EventBus::new();
        let other = bus.clone();
        let hits = Arc::new(AtomicUsize::new(0));

        let hits_clone = Arc::clone(&hits);
        let sub = other.subscribe(Topic::BargeIn, move |_| {
            hits_clone.fetch_add(1, Ordering::SeqCst);
        });

        bus.publish(BusEvent::BargeIn);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        sub.unsubscribe();
    }
}
