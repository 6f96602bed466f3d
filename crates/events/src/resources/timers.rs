// SPDX-License-Identifier: Apache-2.0
// Copyright (c) contributors to Project Ocre

//! Per-module timers backed by one deadline-wheel thread.
//!
//! Timer IDs are per-module, `1..=MAX_TIMERS_PER_MODULE`. Expiry publishes a
//! `Timer` event attributed to the owning module; periodic timers reschedule
//! themselves from their previous deadline so the cadence does not drift.

use crate::queue::EventQueue;
use crate::registry::Registry;
use ocre_core::{Clock, Error, Event, ModuleId, ResourceKind, Result};
use parking_lot::{Condvar, Mutex};
use std::collections::HashMap;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Timer slots per module.
pub const MAX_TIMERS_PER_MODULE: u32 = 5;

/// Valid interval range in milliseconds.
pub const MAX_INTERVAL_MS: u64 = 65_535;

struct TimerEntry {
    interval: Duration,
    periodic: bool,
    /// None while the timer exists but is not running.
    deadline: Option<Instant>,
}

struct TimerTable {
    timers: HashMap<(ModuleId, u32), TimerEntry>,
    shutdown: bool,
}

pub struct TimerService {
    table: Mutex<TimerTable>,
    wake: Condvar,
    queue: Arc<EventQueue>,
    registry: Arc<Registry>,
    clock: Arc<dyn Clock>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl TimerService {
    pub fn start(
        queue: Arc<EventQueue>,
        registry: Arc<Registry>,
        clock: Arc<dyn Clock>,
    ) -> Arc<Self> {
        let service = Arc::new(Self {
            table: Mutex::new(TimerTable { timers: HashMap::new(), shutdown: false }),
            wake: Condvar::new(),
            queue,
            registry,
            clock,
            worker: Mutex::new(None),
        });

        let handle = {
            let service = Arc::clone(&service);
            std::thread::Builder::new()
                .name("ocre-timer-wheel".to_string())
                .spawn(move || service.run_wheel())
        };
        match handle {
            Ok(handle) => *service.worker.lock() = Some(handle),
            Err(e) => warn!(error = %e, "failed to spawn timer wheel"),
        }

        service
    }

    fn check_id(id: u32) -> Result<()> {
        if id == 0 || id > MAX_TIMERS_PER_MODULE {
            return Err(Error::invalid_argument(format!(
                "timer id {id} out of range 1..={MAX_TIMERS_PER_MODULE}"
            )));
        }
        Ok(())
    }

    /// Allocate a timer slot for the module.
    pub fn create(&self, module: ModuleId, id: u32) -> Result<()> {
        Self::check_id(id)?;
        let mut table = self.table.lock();
        if table.timers.contains_key(&(module, id)) {
            return Err(Error::conflict(format!("timer {id} already in use")));
        }
        table.timers.insert(
            (module, id),
            TimerEntry { interval: Duration::ZERO, periodic: false, deadline: None },
        );
        drop(table);
        self.registry.increment_resource_count(module, ResourceKind::Timer);
        debug!(module = %module, id, "timer created");
        Ok(())
    }

    /// Arm a timer. `interval_ms` must be in `1..=65535`.
    pub fn start_timer(
        &self,
        module: ModuleId,
        id: u32,
        interval_ms: u64,
        periodic: bool,
    ) -> Result<()> {
        Self::check_id(id)?;
        if interval_ms == 0 || interval_ms > MAX_INTERVAL_MS {
            return Err(Error::invalid_argument(format!(
                "interval {interval_ms}ms out of range 1..={MAX_INTERVAL_MS}"
            )));
        }

        let mut table = self.table.lock();
        let entry = table
            .timers
            .get_mut(&(module, id))
            .ok_or_else(|| Error::not_found(format!("timer {id}")))?;
        entry.interval = Duration::from_millis(interval_ms);
        entry.periodic = periodic;
        entry.deadline = Some(self.clock.now() + entry.interval);
        drop(table);
        self.wake.notify_all();
        debug!(module = %module, id, interval_ms, periodic, "timer started");
        Ok(())
    }

    /// Disarm a timer without freeing its slot.
    pub fn stop_timer(&self, module: ModuleId, id: u32) -> Result<()> {
        Self::check_id(id)?;
        let mut table = self.table.lock();
        let entry = table
            .timers
            .get_mut(&(module, id))
            .ok_or_else(|| Error::not_found(format!("timer {id}")))?;
        entry.deadline = None;
        Ok(())
    }

    /// Milliseconds until the next expiry; zero when not running.
    pub fn remaining(&self, module: ModuleId, id: u32) -> Result<u64> {
        Self::check_id(id)?;
        let table = self.table.lock();
        let entry = table
            .timers
            .get(&(module, id))
            .ok_or_else(|| Error::not_found(format!("timer {id}")))?;
        Ok(match entry.deadline {
            Some(deadline) => {
                deadline.saturating_duration_since(self.clock.now()).as_millis() as u64
            }
            None => 0,
        })
    }

    /// Free a timer slot.
    pub fn delete(&self, module: ModuleId, id: u32) -> Result<()> {
        Self::check_id(id)?;
        let mut table = self.table.lock();
        if table.timers.remove(&(module, id)).is_none() {
            return Err(Error::not_found(format!("timer {id}")));
        }
        drop(table);
        self.registry.decrement_resource_count(module, ResourceKind::Timer);
        debug!(module = %module, id, "timer deleted");
        Ok(())
    }

    /// Cleanup handler: drop every timer owned by a dying module.
    pub fn cleanup(&self, module: ModuleId) {
        let mut table = self.table.lock();
        let owned: Vec<u32> = table
            .timers
            .keys()
            .filter(|(m, _)| *m == module)
            .map(|(_, id)| *id)
            .collect();
        for id in &owned {
            table.timers.remove(&(module, *id));
        }
        drop(table);
        for _ in &owned {
            self.registry.decrement_resource_count(module, ResourceKind::Timer);
        }
        if !owned.is_empty() {
            debug!(module = %module, count = owned.len(), "cleaned up timers");
        }
    }

    /// Wake the wheel so it re-evaluates deadlines against the clock.
    ///
    /// Needed when the injected clock advances outside the wheel's own
    /// waits, e.g. a controllable clock being stepped forward.
    pub fn kick(&self) {
        self.wake.notify_all();
    }

    /// Stop the wheel thread. Idempotent.
    pub fn shutdown(&self) {
        {
            let mut table = self.table.lock();
            table.shutdown = true;
        }
        self.wake.notify_all();
        if let Some(worker) = self.worker.lock().take() {
            if worker.join().is_err() {
                warn!("timer wheel panicked during shutdown");
            }
        }
    }

    fn run_wheel(&self) {
        let mut table = self.table.lock();
        loop {
            if table.shutdown {
                return;
            }

            let now = self.clock.now();
            let mut next_deadline: Option<Instant> = None;
            let mut expired: Vec<(ModuleId, u32)> = Vec::new();

            for (&key, entry) in table.timers.iter_mut() {
                let Some(deadline) = entry.deadline else { continue };
                if deadline <= now {
                    expired.push(key);
                    entry.deadline = if entry.periodic {
                        Some(deadline + entry.interval)
                    } else {
                        None
                    };
                }
                if let Some(deadline) = entry.deadline {
                    next_deadline = Some(match next_deadline {
                        Some(current) => current.min(deadline),
                        None => deadline,
                    });
                }
            }

            if !expired.is_empty() {
                // Publish without the table lock so a full queue cannot stall
                // timer bookkeeping.
                drop(table);
                for (module, id) in expired {
                    let event = Event::Timer { timer_id: id, owner: module };
                    if let Err(e) = self.queue.publish(event) {
                        warn!(module = %module, id, error = %e, "dropped timer event");
                    }
                }
                table = self.table.lock();
                continue;
            }

            match next_deadline {
                Some(deadline) => {
                    let now = self.clock.now();
                    if deadline > now {
                        self.wake.wait_for(&mut table, deadline - now);
                    }
                }
                None => self.wake.wait(&mut table),
            }
        }
    }
}

#[cfg(test)]
#[path = "timers_tests.rs"]
mod tests;
