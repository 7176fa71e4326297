//! Pending event buffer.
//!
//! # Responsibilities
//! - Accept events from any number of request tasks concurrently
//! - Hand the whole pending batch to the reporter once per window
//!
//! # Design Decisions
//! - Single mutex, held only for a push or a drain
//! - Drain empties the vector in place so its allocation is reused
//! - A poisoned lock is recovered: the contents are plain data and a panic
//!   elsewhere must not stop reporting

use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::reporting::event::Event;

/// Initial capacity of the pending vector. Only a sizing hint.
const INITIAL_CAPACITY: usize = 512;

/// Concurrency-safe append-only event collection with atomic drain.
#[derive(Debug)]
pub struct EventBuffer {
    pending: Mutex<Vec<Event>>,
}

impl EventBuffer {
    pub fn new() -> Self {
        Self::with_capacity(INITIAL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            pending: Mutex::new(Vec::with_capacity(capacity)),
        }
    }

    /// Append an event.
    pub fn add(&self, event: Event) {
        self.lock().push(event);
    }

    /// Remove and return every pending event in insertion order.
    pub fn drain_and_reset(&self) -> Vec<Event> {
        let mut pending = self.lock();
        pending.drain(..).collect()
    }

    /// Number of pending events at the time of the call.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Event>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for EventBuffer {
    fn default() -> Self {
        Self::new()
    }
}
