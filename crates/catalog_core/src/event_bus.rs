use std::{
    fmt,
    hash::Hash,
    panic::{catch_unwind, AssertUnwindSafe},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, MutexGuard, PoisonError,
    },
};

use anyhow::Result;
use tracing::{error, warn};

pub trait BusEvent: Send + Sync + 'static {
    type Topic: Copy + Eq + Hash + fmt::Debug + Send + Sync + 'static;

    fn topic(&self) -> Self::Topic;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Handler<E> = Arc<dyn Fn(&E) -> Result<()> + Send + Sync>;

struct Subscription<E: BusEvent> {
    id: SubscriptionId,
    topic: E::Topic,
    once: bool,
    handler: Handler<E>,
}

pub struct EventBus<E: BusEvent> {
    next_id: AtomicU64,
    subscriptions: Mutex<Vec<Subscription<E>>>,
}

impl<E: BusEvent> Default for EventBus<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: BusEvent> EventBus<E> {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            subscriptions: Mutex::new(Vec::new()),
        }
    }

    pub fn subscribe<F>(&self, topic: E::Topic, handler: F) -> SubscriptionId
    where
        F: Fn(&E) -> Result<()> + Send + Sync + 'static,
    {
        self.insert(topic, false, Arc::new(handler))
    }

    /// Like [`EventBus::subscribe`], but the handler is removed before its first
    /// invocation, so re-entrant publishes never reach it twice.
    pub fn once<F>(&self, topic: E::Topic, handler: F) -> SubscriptionId
    where
        F: Fn(&E) -> Result<()> + Send + Sync + 'static,
    {
        self.insert(topic, true, Arc::new(handler))
    }

    /// Returns `false` when the subscription was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscriptions = self.lock();
        let before = subscriptions.len();
        subscriptions.retain(|subscription| subscription.id != id);
        subscriptions.len() != before
    }

    pub fn publish(&self, event: E) {
        let topic = event.topic();
        let snapshot: Vec<(SubscriptionId, Handler<E>)> = self
            .lock()
            .iter()
            .filter(|subscription| subscription.topic == topic)
            .map(|subscription| (subscription.id, Arc::clone(&subscription.handler)))
            .collect();

        for (id, handler) in snapshot {
            if !self.claim(id) {
                continue;
            }
            match catch_unwind(AssertUnwindSafe(|| handler(&event))) {
                Ok(Ok(())) => {}
                Ok(Err(err)) => warn!(?topic, error = %err, "event handler failed"),
                Err(_) => error!(?topic, "event handler panicked"),
            }
        }
    }

    pub fn handler_count(&self, topic: E::Topic) -> usize {
        self.lock()
            .iter()
            .filter(|subscription| subscription.topic == topic)
            .count()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn insert(&self, topic: E::Topic, once: bool, handler: Handler<E>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.lock().push(Subscription {
            id,
            topic,
            once,
            handler,
        });
        id
    }

    // Checks the subscription is still live right before dispatch; one-shot
    // subscriptions are removed here.
    fn claim(&self, id: SubscriptionId) -> bool {
        let mut subscriptions = self.lock();
        let Some(position) = subscriptions
            .iter()
            .position(|subscription| subscription.id == id)
        else {
            return false;
        };
        if subscriptions[position].once {
            subscriptions.remove(position);
        }
        true
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Subscription<E>>> {
        self.subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
#[path = "tests/event_bus_tests.rs"]
mod tests;
