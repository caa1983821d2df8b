//! Pausable publish/subscribe primitive.
//!
//! Both individual stores and the registry fan out change notifications
//! through an [`Emitter`]. While paused, any number of `emit` calls coalesce
//! into at most one notification delivered on resume, which is what makes
//! transactional batching cheap.

use crate::types::ListenerId;
use parking_lot::Mutex;
use std::sync::Arc;

/// Boxed change listener. Listeners carry no payload; a notified listener
/// re-reads whatever state it cares about.
pub type Listener = Box<dyn Fn() + Send + Sync>;

type SharedListener = Arc<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct Inner {
    listeners: Vec<(ListenerId, SharedListener)>,
    next_id: u64,
    paused: bool,
    pending: bool,
}

/// A pausable notification emitter.
pub struct Emitter {
    inner: Mutex<Inner>,
}

impl Emitter {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Register a listener. Listeners are notified in registration order.
    pub fn subscribe(&self, listener: Listener) -> ListenerId {
        let mut inner = self.inner.lock();
        let id = ListenerId(inner.next_id);
        inner.next_id += 1;
        inner.listeners.push((id, Arc::from(listener)));
        id
    }

    /// Remove a listener. Returns false if the id was already gone.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut inner = self.inner.lock();
        let before = inner.listeners.len();
        inner.listeners.retain(|(lid, _)| *lid != id);
        inner.listeners.len() != before
    }

    /// Notify all listeners, or record a pending notification if paused.
    ///
    /// The listener set is snapshotted before invocation: a listener that
    /// subscribes or unsubscribes during notification never deadlocks, and a
    /// listener added mid-emission is not invoked for that emission.
    pub fn emit(&self) {
        let snapshot: Vec<SharedListener> = {
            let mut inner = self.inner.lock();
            if inner.paused {
                inner.pending = true;
                return;
            }
            inner.listeners.iter().map(|(_, l)| l.clone()).collect()
        };

        for listener in snapshot {
            listener();
        }
    }

    /// Suspend notification delivery.
    pub fn pause(&self) {
        self.inner.lock().paused = true;
    }

    /// Resume delivery. Emissions that occurred while paused collapse into
    /// a single notification.
    pub fn resume(&self) {
        let fire = {
            let mut inner = self.inner.lock();
            inner.paused = false;
            std::mem::take(&mut inner.pending)
        };

        if fire {
            self.emit();
        }
    }

    pub fn is_paused(&self) -> bool {
        self.inner.lock().paused
    }

    pub fn listener_count(&self) -> usize {
        self.inner.lock().listeners.len()
    }
}

impl Default for Emitter {
    fn default() -> Self {
        Self::new()
    }
}
