// ── Change bus ──
//
// In-process publish/subscribe for reconciled changes. Dispatch is
// synchronous and walks a copy-on-write snapshot of the listener list,
// so listeners may subscribe or unsubscribe (themselves or others)
// while an event is being delivered.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use arc_swap::ArcSwap;

use crate::model::ChangeSet;

type Listener = Arc<dyn Fn(&ChangeSet) + Send + Sync>;

struct BusInner {
    listeners: ArcSwap<Vec<(u64, Listener)>>,
    next_id: AtomicU64,
}

/// Fan-out of change sets to registered listeners.
///
/// Cheap to clone; every clone shares one listener list. Create one per
/// process and hand it to whoever needs it.
#[derive(Clone)]
pub struct ChangeBus {
    inner: Arc<BusInner>,
}

impl ChangeBus {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(BusInner {
                listeners: ArcSwap::from_pointee(Vec::new()),
                next_id: AtomicU64::new(0),
            }),
        }
    }

    /// Register a listener. It stays registered until the returned
    /// [`Subscription`] is dropped or unsubscribed.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&ChangeSet) + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let listener: Listener = Arc::new(listener);
        self.inner.listeners.rcu(|current| {
            let mut next = Vec::clone(current);
            next.push((id, Arc::clone(&listener)));
            next
        });

        Subscription {
            id,
            bus: Arc::downgrade(&self.inner),
        }
    }

    /// Deliver `changes` to every listener registered when the call
    /// starts, once each, in subscription order. Empty sets are skipped.
    pub fn publish(&self, changes: &ChangeSet) {
        if changes.is_empty() {
            return;
        }
        let listeners = self.inner.listeners.load_full();
        for (_, listener) in listeners.iter() {
            listener(changes);
        }
    }

    pub fn listener_count(&self) -> usize {
        self.inner.listeners.load().len()
    }
}

impl Default for ChangeBus {
    fn default() -> Self {
        Self::new()
    }
}

impl BusInner {
    fn remove(&self, id: u64) {
        self.listeners.rcu(|current| {
            current
                .iter()
                .filter(|(lid, _)| *lid != id)
                .cloned()
                .collect::<Vec<_>>()
        });
    }
}

/// Registration handle returned by [`ChangeBus::subscribe`].
///
/// Dropping it deregisters the listener.
pub struct Subscription {
    id: u64,
    bus: Weak<BusInner>,
}

impl Subscription {
    /// Deregister now. Equivalent to dropping the handle.
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.remove(self.id);
        }
    }
}
