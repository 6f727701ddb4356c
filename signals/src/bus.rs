//! A typed event bus with deferred dispatch.
//!
//! Every component that wants to notify observers (an entity store, an item
//! query, a collection query, a weak-value index) owns one `Bus<E>` plus the
//! matching [`Owner`] capability minted alongside it. Callers outside the
//! component only ever see a cloned `Bus<E>` handle for subscribing - they
//! cannot construct an `Owner`, so [`Bus::emit`] called with a foreign (or
//! absent) owner fails with [`BusError::Internal`] rather than dispatching.
//!
//! Dispatch is always deferred to the next tick of the async runtime: `emit`
//! queues the notification and returns immediately, so a chain of synchronous
//! state transitions completes before any observer runs. This is the
//! Rust-side equivalent of deferring to the next microtask.

use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};

/// A subscribed callback. Must not panic; panics are caught per-listener so
/// one bad observer can't take down the dispatch loop or poison the bus.
pub type Listener<E> = Box<dyn Fn(&E) + Send + Sync + 'static>;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum BusError {
    /// `emit` was called with an `Owner` that does not belong to this bus.
    /// Reaching this means a component tried to publish on someone else's
    /// bus - always a programmer error.
    #[error("emit() called without owning this event bus")]
    Internal,
}

enum Slot<E> {
    Many(Listener<E>),
    Once(Mutex<Option<Listener<E>>>),
}

struct Inner<E> {
    listeners: RwLock<BTreeMap<usize, Slot<E>>>,
    next_id: AtomicUsize,
}

impl<E> Inner<E> {
    fn new() -> Self { Self { listeners: RwLock::new(BTreeMap::new()), next_id: AtomicUsize::new(0) } }

    fn dispatch(&self, event: &E) {
        let fire: Vec<usize> = {
            let listeners = self.listeners.read().unwrap();
            listeners.keys().copied().collect()
        };
        // Snapshot which ids existed at dispatch time, then call each outside
        // the lock so a listener that subscribes or unsubscribes mid-dispatch
        // can't deadlock against us.
        for id in fire {
            let once_taken = {
                let listeners = self.listeners.read().unwrap();
                match listeners.get(&id) {
                    Some(Slot::Many(f)) => {
                        Self::call_isolated(f, event);
                        None
                    }
                    Some(Slot::Once(cell)) => cell.lock().unwrap().take(),
                    None => None,
                }
            };
            if let Some(f) = once_taken {
                Self::call_isolated(&f, event);
                self.listeners.write().unwrap().remove(&id);
            }
        }
    }

    fn unsubscribe(&self, id: usize) { self.listeners.write().unwrap().remove(&id); }

    /// Runs one listener with its panic caught so a single bad observer can't
    /// unwind through the rest of the dispatch loop.
    fn call_isolated(f: &Listener<E>, event: &E) {
        if catch_unwind(AssertUnwindSafe(|| f(event))).is_err() {
            tracing::warn!("event bus listener panicked; isolated, dispatch continues");
        }
    }
}

/// Capability that authorizes emitting on a particular [`Bus`]. Keep this
/// private to the component that owns the bus; everyone else gets a `Bus`
/// clone for subscribing only.
pub struct Owner<E>(Weak<Inner<E>>);

/// A typed, cloneable event bus handle. Cloning is cheap (it's an `Arc`);
/// every clone can subscribe, but only the holder of the matching [`Owner`]
/// can emit.
pub struct Bus<E> {
    inner: Arc<Inner<E>>,
}

impl<E> Clone for Bus<E> {
    fn clone(&self) -> Self { Self { inner: self.inner.clone() } }
}

/// Drops its subscription when dropped.
pub struct Subscription<E> {
    inner: Weak<Inner<E>>,
    id: usize,
}

impl<E> Drop for Subscription<E> {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.upgrade() {
            inner.unsubscribe(self.id);
        }
    }
}

impl<E> Bus<E> {
    /// Creates a new bus and the `Owner` capability that may emit on it.
    pub fn new() -> (Self, Owner<E>) {
        let inner = Arc::new(Inner::new());
        let owner = Owner(Arc::downgrade(&inner));
        (Self { inner }, owner)
    }

    /// Subscribe for every future emission.
    pub fn on<F>(&self, listener: F) -> Subscription<E>
    where F: Fn(&E) + Send + Sync + 'static {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.listeners.write().unwrap().insert(id, Slot::Many(Box::new(listener)));
        Subscription { inner: Arc::downgrade(&self.inner), id }
    }

    /// Subscribe for exactly one emission; the listener is dropped after it fires.
    pub fn once<F>(&self, listener: F) -> Subscription<E>
    where F: Fn(&E) + Send + Sync + 'static {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.listeners.write().unwrap().insert(id, Slot::Once(Mutex::new(Some(Box::new(listener)))));
        Subscription { inner: Arc::downgrade(&self.inner), id }
    }

    /// Explicitly drop a subscription (equivalent to dropping the guard).
    pub fn off(&self, subscription: Subscription<E>) { drop(subscription) }

    /// Emit an event, deferred to the next runtime tick. Requires the
    /// `Owner` minted alongside this bus; a foreign owner is rejected.
    pub fn emit(&self, owner: &Owner<E>, event: E) -> Result<(), BusError>
    where E: Send + 'static {
        if !owner.0.ptr_eq(&Arc::downgrade(&self.inner)) {
            return Err(BusError::Internal);
        }
        let inner = self.inner.clone();
        tokio::spawn(async move {
            inner.dispatch(&event);
        });
        Ok(())
    }

    /// Number of live subscriptions, for diagnostics/tests.
    pub fn listener_count(&self) -> usize { self.inner.listeners.read().unwrap().len() }
}

impl<E> Default for Bus<E> {
    fn default() -> Self {
        // Only usable for subscribing; nobody can emit without the discarded Owner.
        Self::new().0
    }
}
