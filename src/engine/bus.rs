//! Event Bus
//!
//! Routes each published event to every subscriber registered for the
//! event's exact kind. The subscriber registry is guarded by a mutex held
//! only for snapshot and mutation; delivery happens outside the lock, so a
//! subscriber may subscribe or unsubscribe from inside a handler without
//! deadlocking. Publication is fan-out and synchronous only up to
//! enqueueing; processing is decoupled on the subscribers' worker threads.

use crate::engine::events::{Event, EventKind};
use crate::engine::subscriber::Subscriber;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::trace;

#[derive(Default)]
pub struct EventBus {
    subscribers: Mutex<HashMap<EventKind, Vec<Arc<Subscriber>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `subscriber` for events of `kind`. Idempotent per
    /// (kind, subscriber) pair.
    pub fn subscribe(&self, kind: EventKind, subscriber: &Arc<Subscriber>) {
        let mut map = self.subscribers.lock();
        let list = map.entry(kind).or_default();
        if !list.iter().any(|s| s.id() == subscriber.id()) {
            list.push(Arc::clone(subscriber));
        }
    }

    /// Register `subscriber` for several kinds at once.
    pub fn subscribe_all(&self, kinds: &[EventKind], subscriber: &Arc<Subscriber>) {
        for kind in kinds {
            self.subscribe(*kind, subscriber);
        }
    }

    /// Remove the (kind, subscriber) registration if present.
    pub fn unsubscribe(&self, kind: EventKind, subscriber: &Arc<Subscriber>) {
        let mut map = self.subscribers.lock();
        if let Some(list) = map.get_mut(&kind) {
            list.retain(|s| s.id() != subscriber.id());
        }
    }

    /// Deliver `event` to every subscriber currently registered for its
    /// kind. Never fails; handler problems surface on the subscribers' own
    /// error paths.
    pub fn publish(&self, event: Event) {
        let kind = event.kind();
        let targets: Vec<Arc<Subscriber>> = {
            let map = self.subscribers.lock();
            map.get(&kind).cloned().unwrap_or_default()
        };
        trace!(kind = kind.as_str(), fanout = targets.len(), "publish");
        let event = Arc::new(event);
        for subscriber in &targets {
            subscriber.receive(Arc::clone(&event));
        }
    }

    /// Every distinct subscriber currently registered for at least one kind.
    fn distinct_subscribers(&self) -> Vec<Arc<Subscriber>> {
        let map = self.subscribers.lock();
        let mut seen: Vec<Arc<Subscriber>> = Vec::new();
        for list in map.values() {
            for sub in list {
                if !seen.iter().any(|s| s.id() == sub.id()) {
                    seen.push(Arc::clone(sub));
                }
            }
        }
        seen
    }

    /// Block until every registered subscriber has an empty queue and no
    /// event mid-handler. Handlers may publish further events while
    /// draining (strategy -> broker -> strategy chains), so passes repeat
    /// until one observes every subscriber already idle.
    pub fn wait_until_system_idle(&self) {
        loop {
            let subs = self.distinct_subscribers();
            for sub in &subs {
                sub.wait_until_idle();
            }
            if subs.iter().all(|s| s.is_idle()) {
                return;
            }
        }
    }

    /// Signal every registered subscriber to drain and stop, joining each
    /// worker.
    pub fn shutdown(&self) {
        for sub in self.distinct_subscribers() {
            sub.shutdown();
        }
    }
}
