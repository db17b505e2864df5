//! Subscriber registries and dispatch.

use std::cell::Cell;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, ReentrantMutex};

use super::frame::Frame;
use crate::session::{ConnectionStatus, SessionListener};

pub(crate) type DataCallback = dyn Fn(&Frame) + Send + Sync;
pub(crate) type StatusCallback = dyn Fn(ConnectionStatus) + Send + Sync;

struct Entry<C: ?Sized> {
    id: u64,
    active: AtomicBool,
    callback: Box<C>,
}

/// Token-keyed callback set, dispatched over a snapshot.
struct Registry<C: ?Sized> {
    next_id: AtomicU64,
    entries: Mutex<Vec<Arc<Entry<C>>>>,
}

impl<C: ?Sized> Default for Registry<C> {
    fn default() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            entries: Mutex::new(Vec::new()),
        }
    }
}

impl<C: ?Sized> Registry<C> {
    fn insert(&self, callback: Box<C>) -> Arc<Entry<C>> {
        let entry = Arc::new(Entry {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            active: AtomicBool::new(true),
            callback,
        });
        self.entries.lock().push(entry.clone());
        entry
    }

    fn snapshot(&self) -> Vec<Arc<Entry<C>>> {
        self.entries.lock().clone()
    }

    fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Invoke `call` on every active entry, isolating panics.
    fn dispatch(&self, what: &str, call: impl Fn(&C)) {
        for entry in self.snapshot() {
            // An entry removed mid-dispatch must not see this event.
            if !entry.active.load(Ordering::Acquire) {
                continue;
            }
            if catch_unwind(AssertUnwindSafe(|| call(&*entry.callback))).is_err() {
                tracing::error!("{} subscriber {} panicked", what, entry.id);
            }
        }
    }
}

trait Detach: Send + Sync {
    fn detach(&self, id: u64);
}

impl<C: ?Sized + Send + Sync> Detach for Registry<C> {
    fn detach(&self, id: u64) {
        let mut entries = self.entries.lock();
        if let Some(pos) = entries.iter().position(|entry| entry.id == id) {
            let entry = entries.remove(pos);
            entry.active.store(false, Ordering::Release);
        }
    }
}

/// Handle to a registered callback.
///
/// Dropping it unsubscribes; so does [`Subscription::unsubscribe`], which
/// may be called from inside the callback itself.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    id: u64,
    registry: Weak<dyn Detach>,
}

impl Subscription {
    /// Stop receiving events. Idempotent.
    pub fn unsubscribe(&self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.detach(self.id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

/// Decodes session text and fans it out.
pub(crate) struct Hub {
    data: Arc<Registry<DataCallback>>,
    status: Arc<Registry<StatusCallback>>,
    /// Serializes status delivery with late subscribers' initial call, and
    /// holds the last status delivered.
    status_gate: ReentrantMutex<Cell<ConnectionStatus>>,
}

impl Default for Hub {
    fn default() -> Self {
        Self {
            data: Arc::default(),
            status: Arc::default(),
            status_gate: ReentrantMutex::new(Cell::new(ConnectionStatus::default())),
        }
    }
}

impl Hub {
    pub(crate) fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&Frame) + Send + Sync + 'static,
    {
        let entry = self.data.insert(Box::new(callback));
        let registry: Weak<Registry<DataCallback>> = Arc::downgrade(&self.data);
        Subscription {
            id: entry.id,
            registry,
        }
    }

    /// Register a status callback and invoke it with the current status.
    pub(crate) fn subscribe_status<F>(&self, callback: F) -> Subscription
    where
        F: Fn(ConnectionStatus) + Send + Sync + 'static,
    {
        let gate = self.status_gate.lock();
        let entry = self.status.insert(Box::new(callback));
        let current = gate.get();
        if catch_unwind(AssertUnwindSafe(|| (entry.callback)(current))).is_err() {
            tracing::error!("Status subscriber {} panicked", entry.id);
        }
        drop(gate);

        let registry: Weak<Registry<StatusCallback>> = Arc::downgrade(&self.status);
        Subscription {
            id: entry.id,
            registry,
        }
    }

    pub(crate) fn subscriber_counts(&self) -> (usize, usize) {
        (self.data.len(), self.status.len())
    }

    pub(crate) fn dispatch_frame(&self, frame: &Frame) {
        self.data.dispatch("Data", |callback| callback(frame));
    }
}

impl SessionListener for Hub {
    fn on_text(&self, text: &str) {
        match Frame::decode(text) {
            Ok(Frame::Heartbeat) => tracing::debug!("Heartbeat acknowledged"),
            Ok(frame) => self.dispatch_frame(&frame),
            Err(e) => tracing::warn!("Dropping undecodable message: {}", e),
        }
    }

    fn on_status(&self, status: ConnectionStatus) {
        let gate = self.status_gate.lock();
        gate.set(status);
        self.status.dispatch("Status", |callback| callback(status));
    }
}
