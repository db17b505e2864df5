//! Fixed-capacity ring buffer used for per-core logs.

/// Default number of log entries kept per core.
pub const DEFAULT_LOG_CAPACITY: usize = 1000;

/// A bounded FIFO that overwrites its oldest slot once full.
///
/// Storage is allocated up front; eviction is an index bump, never a shift.
#[derive(Debug, Clone)]
pub struct Ring<T> {
    slots: Vec<T>,
    /// Index of the oldest element once the buffer has wrapped.
    head: usize,
    capacity: usize,
}

impl<T> Ring<T> {
    /// Create an empty ring. A capacity of zero is raised to one.
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            slots: Vec::with_capacity(capacity),
            head: 0,
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Append an element, returning the evicted oldest one when full.
    pub fn push(&mut self, item: T) -> Option<T> {
        if self.slots.len() < self.capacity {
            self.slots.push(item);
            return None;
        }

        let evicted = std::mem::replace(&mut self.slots[self.head], item);
        self.head = (self.head + 1) % self.capacity;
        Some(evicted)
    }

    /// Elements from oldest to newest.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> {
        let (newer, older) = self.slots.split_at(self.head);
        older.iter().chain(newer.iter())
    }

    /// The most recently pushed element.
    pub fn newest(&self) -> Option<&T> {
        if self.slots.is_empty() {
            return None;
        }
        let idx = (self.head + self.slots.len() - 1) % self.slots.len();
        self.slots.get(idx)
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.head = 0;
    }
}

impl<T> Extend<T> for Ring<T> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        for item in iter {
            self.push(item);
        }
    }
}
