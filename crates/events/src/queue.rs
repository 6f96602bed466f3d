// SPDX-License-Identifier: Apache-2.0
// Copyright (c) contributors to Project Ocre

//! Bounded multi-producer multi-consumer event queue.
//!
//! Producers are resource-manager callbacks (timer wheel, GPIO edges,
//! publishers); consumers are the dispatcher pool and sandboxes using the
//! pull primitive. Events enqueued by a single producer thread reach
//! consumers in FIFO order; cross-producer ordering is unspecified.

use ocre_core::{Error, Event, ModuleId, Result};
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;

/// Default queue capacity.
pub const DEFAULT_CAPACITY: usize = 64;

struct QueueState {
    events: VecDeque<Event>,
    shutdown: bool,
}

pub struct EventQueue {
    state: Mutex<QueueState>,
    ready: Condvar,
    capacity: usize,
}

impl EventQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(QueueState {
                events: VecDeque::with_capacity(capacity),
                shutdown: false,
            }),
            ready: Condvar::new(),
            capacity,
        }
    }

    /// Enqueue one event. Overflow is a recoverable error for the producer.
    pub fn publish(&self, event: Event) -> Result<()> {
        let mut state = self.state.lock();
        if state.shutdown {
            return Err(Error::ResourceExhausted("event queue shut down"));
        }
        if state.events.len() >= self.capacity {
            return Err(Error::ResourceExhausted("event queue full"));
        }
        state.events.push_back(event);
        drop(state);
        self.ready.notify_one();
        Ok(())
    }

    /// Blocking batch pop for dispatcher threads.
    ///
    /// Fills `out` with up to `max` events. Returns false once the queue is
    /// shut down and drained.
    pub fn pop_batch(&self, max: usize, out: &mut Vec<Event>) -> bool {
        let mut state = self.state.lock();
        loop {
            if !state.events.is_empty() {
                let take = state.events.len().min(max);
                out.extend(state.events.drain(..take));
                return true;
            }
            if state.shutdown {
                return false;
            }
            self.ready.wait(&mut state);
        }
    }

    /// Pop the first queued event owned by `module`, if any.
    ///
    /// Only the caller's events are eligible, which keeps per-owner FIFO
    /// intact for modules that mix pull and push consumption.
    pub fn try_pop_owned(&self, module: ModuleId) -> Option<Event> {
        self.try_pop_owned_matching(module, |_| true)
    }

    /// Pop the first queued event owned by `module` that satisfies `filter`.
    pub fn try_pop_owned_matching(
        &self,
        module: ModuleId,
        filter: impl Fn(&Event) -> bool,
    ) -> Option<Event> {
        let mut state = self.state.lock();
        let index = state
            .events
            .iter()
            .position(|e| e.owner() == module && filter(e))?;
        state.events.remove(index)
    }

    /// Drop all events owned by `module`. Called when a module unregisters so
    /// stale events are not dispatched against a dead sandbox.
    pub fn discard_owned(&self, module: ModuleId) -> usize {
        let mut state = self.state.lock();
        let before = state.events.len();
        state.events.retain(|e| e.owner() != module);
        before - state.events.len()
    }

    pub fn len(&self) -> usize {
        self.state.lock().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Wake every consumer and refuse further publishes.
    pub fn shutdown(&self) {
        let mut state = self.state.lock();
        state.shutdown = true;
        drop(state);
        self.ready.notify_all();
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
