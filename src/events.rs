//! Typed event bus for host notifications
//!
//! Listeners are keyed by the event's `TypeId`. Subscribing hands back a
//! [`Subscription`] guard; dropping it removes the listener.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

// ---------------------------------------------------------------------------
// Built-in events
// ---------------------------------------------------------------------------

/// The default framebuffer changed size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FramebufferResized {
    pub width: u32,
    pub height: u32,
}

/// A different scene root became active.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SceneChanged {
    pub name: String,
}

// ---------------------------------------------------------------------------
// Internal types
// ---------------------------------------------------------------------------

/// A type-erased listener.
type ListenerFn = Arc<dyn Fn(&dyn Any) + Send + Sync>;

struct Inner {
    listeners: Mutex<HashMap<TypeId, Vec<(u64, ListenerFn)>>>,
    next_id: AtomicU64,
}

impl Inner {
    fn unsubscribe(&self, key: TypeId, id: u64) {
        let mut listeners = self.listeners.lock();
        if let Some(list) = listeners.get_mut(&key) {
            list.retain(|(listener_id, _)| *listener_id != id);
            if list.is_empty() {
                listeners.remove(&key);
            }
        }
    }
}

/// Thread-safe event bus. Clones share the same listener registry.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<Inner>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.total_listener_count())
            .finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                listeners: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Register a listener for events of type `E`.
    #[must_use = "dropping the subscription removes the listener"]
    pub fn subscribe<E: Any>(&self, listener: impl Fn(&E) + Send + Sync + 'static) -> Subscription {
        let key = TypeId::of::<E>();
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let erased: ListenerFn = Arc::new(move |event: &dyn Any| {
            if let Some(event) = event.downcast_ref::<E>() {
                listener(event);
            }
        });
        self.inner
            .listeners
            .lock()
            .entry(key)
            .or_default()
            .push((id, erased));

        Subscription {
            bus: Arc::downgrade(&self.inner),
            key,
            id,
        }
    }

    /// Deliver `event` to every listener of its type. Returns how many ran.
    ///
    /// The listener list is copied before delivery, so listeners may subscribe
    /// or unsubscribe while running.
    pub fn emit<E: Any>(&self, event: &E) -> usize {
        let snapshot: Vec<ListenerFn> = match self.inner.listeners.lock().get(&TypeId::of::<E>()) {
            Some(list) => list.iter().map(|(_, f)| Arc::clone(f)).collect(),
            None => return 0,
        };
        for listener in &snapshot {
            listener(event);
        }
        snapshot.len()
    }

    pub fn listener_count<E: Any>(&self) -> usize {
        self.inner
            .listeners
            .lock()
            .get(&TypeId::of::<E>())
            .map_or(0, Vec::len)
    }

    pub fn total_listener_count(&self) -> usize {
        self.inner.listeners.lock().values().map(Vec::len).sum()
    }
}

/// Removes its listener when dropped.
///
/// Holds only a weak reference; outliving the bus is fine.
pub struct Subscription {
    bus: Weak<Inner>,
    key: TypeId,
    id: u64,
}

impl Subscription {
    /// Keep the listener registered for the lifetime of the bus.
    pub fn detach(self) {
        std::mem::forget(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.bus.upgrade() {
            inner.unsubscribe(self.key, self.id);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .finish()
    }
}
