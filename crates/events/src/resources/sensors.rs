// SPDX-License-Identifier: Apache-2.0
// Copyright (c) contributors to Project Ocre

//! Sensor discovery, reads, and subscriptions.
//!
//! Backends expose channels of `i32` samples. A subscription samples its
//! channel on an interval from one sampler thread and publishes `Sensor`
//! events to the owning module. The default backend is a pseudo-random
//! source, which keeps POSIX hosts without real sensors useful.

use crate::queue::EventQueue;
use crate::registry::Registry;
use ocre_core::{Clock, Error, Event, ModuleId, ResourceKind, Result};
use parking_lot::{Condvar, Mutex};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Description of one discoverable sensor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorInfo {
    pub id: u32,
    pub name: String,
    pub channels: Vec<u32>,
}

/// A source of samples behind the sensor service.
pub trait SensorBackend: Send + Sync {
    fn info(&self) -> SensorInfo;
    fn read(&self, channel: u32) -> Result<i32>;
}

/// Pseudo-random single-channel sensor (xorshift), the default source on
/// hosts without hardware sensors.
pub struct RngSensorBackend {
    id: u32,
    state: Mutex<u64>,
}

impl RngSensorBackend {
    pub fn new(id: u32, seed: u64) -> Self {
        Self { id, state: Mutex::new(seed.max(1)) }
    }
}

impl SensorBackend for RngSensorBackend {
    fn info(&self) -> SensorInfo {
        SensorInfo { id: self.id, name: "rng".to_string(), channels: vec![0] }
    }

    fn read(&self, channel: u32) -> Result<i32> {
        if channel != 0 {
            return Err(Error::invalid_argument(format!("rng sensor has no channel {channel}")));
        }
        let mut state = self.state.lock();
        let mut x = *state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        *state = x;
        Ok((x & 0x7fff_ffff) as i32)
    }
}

struct Subscription {
    module: ModuleId,
    sensor_id: u32,
    channel: u32,
    interval: Duration,
    deadline: Instant,
}

struct SamplerState {
    subscriptions: HashMap<u32, Subscription>,
    next_sub_id: u32,
    shutdown: bool,
}

pub struct SensorService {
    backends: Vec<Arc<dyn SensorBackend>>,
    opens: Mutex<HashSet<(ModuleId, u32)>>,
    sampler: Mutex<SamplerState>,
    wake: Condvar,
    queue: Arc<EventQueue>,
    registry: Arc<Registry>,
    clock: Arc<dyn Clock>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl SensorService {
    pub fn start(
        backends: Vec<Arc<dyn SensorBackend>>,
        queue: Arc<EventQueue>,
        registry: Arc<Registry>,
        clock: Arc<dyn Clock>,
    ) -> Arc<Self> {
        let service = Arc::new(Self {
            backends,
            opens: Mutex::new(HashSet::new()),
            sampler: Mutex::new(SamplerState {
                subscriptions: HashMap::new(),
                next_sub_id: 1,
                shutdown: false,
            }),
            wake: Condvar::new(),
            queue,
            registry,
            clock,
            worker: Mutex::new(None),
        });

        let handle = {
            let service = Arc::clone(&service);
            std::thread::Builder::new()
                .name("ocre-sensor-sampler".to_string())
                .spawn(move || service.run_sampler())
        };
        match handle {
            Ok(handle) => *service.worker.lock() = Some(handle),
            Err(e) => warn!(error = %e, "failed to spawn sensor sampler"),
        }

        service
    }

    fn backend(&self, sensor_id: u32) -> Result<&Arc<dyn SensorBackend>> {
        self.backends
            .iter()
            .find(|b| b.info().id == sensor_id)
            .ok_or_else(|| Error::not_found(format!("sensor {sensor_id}")))
    }

    pub fn discover(&self) -> Vec<SensorInfo> {
        self.backends.iter().map(|b| b.info()).collect()
    }

    /// Open a sensor for the module. Required before reads or subscriptions.
    pub fn open_channel(&self, module: ModuleId, sensor_id: u32) -> Result<()> {
        self.backend(sensor_id)?;
        let mut opens = self.opens.lock();
        if !opens.insert((module, sensor_id)) {
            return Err(Error::conflict(format!("sensor {sensor_id} already open")));
        }
        drop(opens);
        self.registry.increment_resource_count(module, ResourceKind::Sensor);
        Ok(())
    }

    pub fn read(&self, module: ModuleId, sensor_id: u32, channel: u32) -> Result<i32> {
        if !self.opens.lock().contains(&(module, sensor_id)) {
            return Err(Error::invalid_argument(format!("sensor {sensor_id} not open")));
        }
        self.backend(sensor_id)?.read(channel)
    }

    /// Sample `channel` every `interval_ms` and publish `Sensor` events.
    pub fn subscribe(
        &self,
        module: ModuleId,
        sensor_id: u32,
        channel: u32,
        interval_ms: u64,
    ) -> Result<u32> {
        if interval_ms == 0 {
            return Err(Error::invalid_argument("zero sampling interval"));
        }
        if !self.opens.lock().contains(&(module, sensor_id)) {
            return Err(Error::invalid_argument(format!("sensor {sensor_id} not open")));
        }
        // Channel must be readable before we commit to sampling it.
        self.backend(sensor_id)?.read(channel)?;

        let interval = Duration::from_millis(interval_ms);
        let mut sampler = self.sampler.lock();
        let sub_id = sampler.next_sub_id;
        sampler.next_sub_id += 1;
        sampler.subscriptions.insert(
            sub_id,
            Subscription {
                module,
                sensor_id,
                channel,
                interval,
                deadline: self.clock.now() + interval,
            },
        );
        drop(sampler);
        self.wake.notify_all();
        self.registry.increment_resource_count(module, ResourceKind::Sensor);
        debug!(module = %module, sensor_id, channel, interval_ms, sub_id, "sensor subscription");
        Ok(sub_id)
    }

    pub fn unsubscribe(&self, module: ModuleId, sub_id: u32) -> Result<()> {
        let mut sampler = self.sampler.lock();
        match sampler.subscriptions.get(&sub_id) {
            Some(sub) if sub.module == module => {
                sampler.subscriptions.remove(&sub_id);
                drop(sampler);
                self.registry.decrement_resource_count(module, ResourceKind::Sensor);
                Ok(())
            }
            Some(_) => Err(Error::conflict(format!("subscription {sub_id} owned by another module"))),
            None => Err(Error::not_found(format!("subscription {sub_id}"))),
        }
    }

    /// Cleanup handler: release the module's opens and subscriptions.
    pub fn cleanup(&self, module: ModuleId) {
        let mut released = 0usize;

        let mut sampler = self.sampler.lock();
        let subs: Vec<u32> = sampler
            .subscriptions
            .iter()
            .filter(|(_, s)| s.module == module)
            .map(|(id, _)| *id)
            .collect();
        for id in &subs {
            sampler.subscriptions.remove(id);
        }
        drop(sampler);
        released += subs.len();

        let mut opens = self.opens.lock();
        let owned: Vec<(ModuleId, u32)> =
            opens.iter().filter(|(m, _)| *m == module).copied().collect();
        for key in &owned {
            opens.remove(key);
        }
        drop(opens);
        released += owned.len();

        for _ in 0..released {
            self.registry.decrement_resource_count(module, ResourceKind::Sensor);
        }
        if released > 0 {
            debug!(module = %module, released, "cleaned up sensor resources");
        }
    }

    /// Stop the sampler thread. Idempotent.
    pub fn shutdown(&self) {
        {
            let mut sampler = self.sampler.lock();
            sampler.shutdown = true;
        }
        self.wake.notify_all();
        if let Some(worker) = self.worker.lock().take() {
            if worker.join().is_err() {
                warn!("sensor sampler panicked during shutdown");
            }
        }
    }

    fn run_sampler(&self) {
        let mut sampler = self.sampler.lock();
        loop {
            if sampler.shutdown {
                return;
            }

            let now = self.clock.now();
            let mut due: Vec<(ModuleId, u32, u32)> = Vec::new();
            let mut next_deadline: Option<Instant> = None;

            for sub in sampler.subscriptions.values_mut() {
                if sub.deadline <= now {
                    due.push((sub.module, sub.sensor_id, sub.channel));
                    sub.deadline += sub.interval;
                }
                next_deadline = Some(match next_deadline {
                    Some(current) => current.min(sub.deadline),
                    None => sub.deadline,
                });
            }

            if !due.is_empty() {
                drop(sampler);
                for (module, sensor_id, channel) in due {
                    let value = match self.backend(sensor_id).and_then(|b| b.read(channel)) {
                        Ok(value) => value,
                        Err(e) => {
                            debug!(sensor_id, channel, error = %e, "sample failed");
                            continue;
                        }
                    };
                    let event = Event::Sensor { sensor_id, channel, value, owner: module };
                    if let Err(e) = self.queue.publish(event) {
                        warn!(sensor_id, error = %e, "dropped sensor event");
                    }
                }
                sampler = self.sampler.lock();
                continue;
            }

            match next_deadline {
                Some(deadline) => {
                    let now = self.clock.now();
                    if deadline > now {
                        self.wake.wait_for(&mut sampler, deadline - now);
                    }
                }
                None => self.wake.wait(&mut sampler),
            }
        }
    }
}

#[cfg(test)]
#[path = "sensors_tests.rs"]
mod tests;
