//! Blocking FIFO shared between caller threads and the engine

use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::time::Duration;

/// A mutex-guarded FIFO whose consumers can wait for items
#[derive(Debug, Default)]
pub struct Queue<T> {
    items: Mutex<VecDeque<T>>,
    ready: Condvar,
}

impl<T> Queue<T> {
    /// Create an empty queue
    pub fn new() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            ready: Condvar::new(),
        }
    }

    /// Append an item and wake every waiting consumer
    pub fn push(&self, item: T) {
        self.items.lock().push_back(item);
        self.ready.notify_all();
    }

    /// Remove the oldest item, if any
    pub fn pop(&self) -> Option<T> {
        self.items.lock().pop_front()
    }

    /// Remove the oldest item, waiting as long as it takes
    pub fn pop_blocking(&self) -> T {
        let mut items = self.items.lock();
        loop {
            if let Some(item) = items.pop_front() {
                return item;
            }
            self.ready.wait(&mut items);
        }
    }

    /// Remove the oldest item, waiting at most `timeout`
    pub fn pop_timeout(&self, timeout: Duration) -> Option<T> {
        let mut items = self.items.lock();
        self.ready.wait_while_for(&mut items, |items| items.is_empty(), timeout);
        items.pop_front()
    }

    /// Number of queued items
    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    /// Whether the queue is empty
    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    /// Remove and return everything, oldest first
    pub fn drain(&self) -> Vec<T> {
        self.items.lock().drain(..).collect()
    }
}

impl<T: Clone> Queue<T> {
    /// Copy of the oldest item
    pub fn peek(&self) -> Option<T> {
        self.items.lock().front().cloned()
    }
}
