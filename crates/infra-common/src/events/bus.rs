use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock, Weak};

use tracing::{trace, warn};

use super::types::Event;

type Handler<E> = Arc<dyn Fn(&E) + Send + Sync>;

/// Registry of live subscriptions, in subscription order.
struct Registry<E> {
    handlers: RwLock<Vec<(u64, Handler<E>)>>,
    next_id: AtomicU64,
}

/// Publish point for events of type `E`.
///
/// Fan-out is synchronous and in-order: every subscriber observes event N
/// before `publish` returns, so no subscriber can see event N+1 first.
/// There is no buffering: events published before a subscriber attaches
/// are never replayed.
#[derive(Clone)]
pub struct EventBus<E: Event> {
    registry: Arc<Registry<E>>,
}

impl<E: Event> EventBus<E> {
    pub fn new() -> Self {
        Self {
            registry: Arc::new(Registry {
                handlers: RwLock::new(Vec::new()),
                next_id: AtomicU64::new(0),
            }),
        }
    }

    /// Register a handler invoked for every subsequent event.
    ///
    /// The returned [`Subscription`] is the only way to detach the handler;
    /// dropping it leaves the handler attached. Subscribers own their
    /// lifetime; tearing down the emitting component unsubscribes no one.
    ///
    /// Handlers run on the publisher's stack. A handler that needs to
    /// publish, subscribe, or unsubscribe must hand off to its own task
    /// (see [`EventBus::subscribe_channel`]) instead of calling back into
    /// the bus, which would deadlock on the registry lock.
    pub fn subscribe<F>(&self, handler: F) -> Subscription<E>
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        let id = self.registry.next_id.fetch_add(1, Ordering::Relaxed);
        let mut handlers = self.registry.handlers.write().expect("bus registry poisoned");
        handlers.push((id, Arc::new(handler)));
        trace!(id, total = handlers.len(), "event subscriber attached");
        Subscription {
            id,
            registry: Arc::downgrade(&self.registry),
            active: AtomicBool::new(true),
        }
    }

    /// Channel-backed subscription for subscribers that react asynchronously.
    ///
    /// Events are cloned into an unbounded channel in publication order. The
    /// receiver side decides its own pacing without ever delaying fan-out to
    /// other subscribers.
    pub fn subscribe_channel(
        &self,
    ) -> (Subscription<E>, tokio::sync::mpsc::UnboundedReceiver<E>) {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let subscription = self.subscribe(move |event: &E| {
            // Receiver dropped: the subscription is stale but harmless.
            let _ = tx.send(event.clone());
        });
        (subscription, rx)
    }

    /// Deliver an event to every current subscriber, in subscription order.
    pub fn publish(&self, event: &E) {
        let handlers = self.registry.handlers.read().expect("bus registry poisoned");
        trace!(event_type = event.event_type(), subscribers = handlers.len(), "publishing event");
        for (_, handler) in handlers.iter() {
            handler(event);
        }
    }

    /// Number of currently attached subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.registry.handlers.read().expect("bus registry poisoned").len()
    }
}

impl<E: Event> Default for EventBus<E> {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle for a single bus subscription.
pub struct Subscription<E: Event> {
    id: u64,
    registry: Weak<Registry<E>>,
    active: AtomicBool,
}

impl<E: Event> Subscription<E> {
    /// Detach the handler. Idempotent: repeated calls are no-ops.
    pub fn unsubscribe(&self) {
        if self.active.swap(false, Ordering::AcqRel) {
            if let Some(registry) = self.registry.upgrade() {
                let mut handlers = registry.handlers.write().expect("bus registry poisoned");
                handlers.retain(|(id, _)| *id != self.id);
            } else {
                warn!(id = self.id, "unsubscribe after bus was dropped");
            }
        }
    }

    /// Whether the handler is still attached.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq)]
    struct TestEvent {
        seq: u32,
    }

    impl Event for TestEvent {
        fn event_type(&self) -> &'static str {
            "test-event"
        }
    }

    #[test]
    fn fan_out_preserves_publication_order() {
        let bus = EventBus::<TestEvent>::new();
        let seen_a = Arc::new(Mutex::new(Vec::new()));
        let seen_b = Arc::new(Mutex::new(Vec::new()));

        let a = seen_a.clone();
        let _sub_a = bus.subscribe(move |e| a.lock().unwrap().push(e.seq));
        let b = seen_b.clone();
        let _sub_b = bus.subscribe(move |e| b.lock().unwrap().push(e.seq));

        for seq in 0..5 {
            bus.publish(&TestEvent { seq });
        }

        assert_eq!(*seen_a.lock().unwrap(), vec![0, 1, 2, 3, 4]);
        assert_eq!(*seen_b.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn events_before_subscription_are_not_replayed() {
        let bus = EventBus::<TestEvent>::new();
        bus.publish(&TestEvent { seq: 0 });

        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = seen.clone();
        let _sub = bus.subscribe(move |e| s.lock().unwrap().push(e.seq));

        bus.publish(&TestEvent { seq: 1 });
        assert_eq!(*seen.lock().unwrap(), vec![1]);
    }

    #[test]
    fn unsubscribe_is_idempotent() {
        let bus = EventBus::<TestEvent>::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = seen.clone();
        let sub = bus.subscribe(move |e| s.lock().unwrap().push(e.seq));

        bus.publish(&TestEvent { seq: 0 });
        sub.unsubscribe();
        sub.unsubscribe();
        bus.publish(&TestEvent { seq: 1 });

        assert_eq!(*seen.lock().unwrap(), vec![0]);
        assert_eq!(bus.subscriber_count(), 0);
        assert!(!sub.is_active());
    }

    #[test]
    fn dropping_subscription_keeps_handler_attached() {
        let bus = EventBus::<TestEvent>::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = seen.clone();
        let sub = bus.subscribe(move |e| s.lock().unwrap().push(e.seq));
        drop(sub);

        bus.publish(&TestEvent { seq: 7 });
        assert_eq!(*seen.lock().unwrap(), vec![7]);
        assert_eq!(bus.subscriber_count(), 1);
    }

    #[tokio::test]
    async fn channel_subscriber_receives_in_order() {
        let bus = EventBus::<TestEvent>::new();
        let (sub, mut rx) = bus.subscribe_channel();

        bus.publish(&TestEvent { seq: 1 });
        bus.publish(&TestEvent { seq: 2 });

        assert_eq!(rx.recv().await.unwrap().seq, 1);
        assert_eq!(rx.recv().await.unwrap().seq, 2);

        sub.unsubscribe();
        bus.publish(&TestEvent { seq: 3 });
        assert!(rx.try_recv().is_err());
    }
}
