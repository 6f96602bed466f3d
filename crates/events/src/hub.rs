// SPDX-License-Identifier: Apache-2.0
// Copyright (c) contributors to Project Ocre

//! The event hub wires queue, registry, dispatcher pool, and the four
//! resource managers together and owns their threads.
//!
//! One hub per library instance. Engines reach it to register sandboxes and
//! to service host calls; the container core never touches it directly.

use crate::dispatch::{DispatcherPool, DEFAULT_POOL_SIZE};
use crate::queue::{EventQueue, DEFAULT_CAPACITY};
use crate::registry::{ExecEnv, Registry};
use crate::resources::gpio::{GpioBackend, GpioService, SimGpioBackend};
use crate::resources::messaging::MessagingService;
use crate::resources::sensors::{RngSensorBackend, SensorBackend, SensorService};
use crate::resources::timers::TimerService;
use ocre_core::{Clock, Event, ModuleId, ResourceKind, SystemClock};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::info;

pub struct HubConfig {
    pub queue_capacity: usize,
    pub dispatcher_threads: usize,
    /// Time source for activity stamps, the timer wheel, and the sensor
    /// sampler.
    pub clock: Arc<dyn Clock>,
    pub gpio_backend: Arc<dyn GpioBackend>,
    pub sensor_backends: Vec<Arc<dyn SensorBackend>>,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_CAPACITY,
            dispatcher_threads: DEFAULT_POOL_SIZE,
            clock: Arc::new(SystemClock),
            gpio_backend: Arc::new(SimGpioBackend::new()),
            sensor_backends: vec![Arc::new(RngSensorBackend::new(1, 0x6f63_7265))],
        }
    }
}

pub struct EventHub {
    queue: Arc<EventQueue>,
    registry: Arc<Registry>,
    pool: Mutex<Option<DispatcherPool>>,
    timers: Arc<TimerService>,
    gpio: Arc<GpioService>,
    sensors: Arc<SensorService>,
    messaging: Arc<MessagingService>,
}

impl EventHub {
    /// Bring up the queue, services, cleanup handlers, and dispatcher pool.
    pub fn start(config: HubConfig) -> Arc<Self> {
        let queue = Arc::new(EventQueue::new(config.queue_capacity));
        let registry = Arc::new(Registry::with_clock(Arc::clone(&config.clock)));

        let timers = TimerService::start(
            Arc::clone(&queue),
            Arc::clone(&registry),
            Arc::clone(&config.clock),
        );
        let gpio =
            GpioService::new(config.gpio_backend, Arc::clone(&queue), Arc::clone(&registry));
        let sensors = SensorService::start(
            config.sensor_backends,
            Arc::clone(&queue),
            Arc::clone(&registry),
            Arc::clone(&config.clock),
        );
        let messaging = MessagingService::new(Arc::clone(&queue), Arc::clone(&registry));

        // Cleanup handlers hold weak references: the registry must not keep
        // its services alive.
        {
            let timers = Arc::downgrade(&timers);
            registry.set_cleanup_handler(
                ResourceKind::Timer,
                Box::new(move |module| {
                    if let Some(timers) = timers.upgrade() {
                        timers.cleanup(module);
                    }
                }),
            );
        }
        {
            let gpio = Arc::downgrade(&gpio);
            registry.set_cleanup_handler(
                ResourceKind::Gpio,
                Box::new(move |module| {
                    if let Some(gpio) = gpio.upgrade() {
                        gpio.cleanup(module);
                    }
                }),
            );
        }
        {
            let sensors = Arc::downgrade(&sensors);
            registry.set_cleanup_handler(
                ResourceKind::Sensor,
                Box::new(move |module| {
                    if let Some(sensors) = sensors.upgrade() {
                        sensors.cleanup(module);
                    }
                }),
            );
        }
        {
            let messaging = Arc::downgrade(&messaging);
            registry.set_cleanup_handler(
                ResourceKind::Messaging,
                Box::new(move |module| {
                    if let Some(messaging) = messaging.upgrade() {
                        messaging.cleanup(module);
                    }
                }),
            );
        }

        let pool = DispatcherPool::start(
            Arc::clone(&queue),
            Arc::clone(&registry),
            config.dispatcher_threads,
        );

        info!(
            queue_capacity = config.queue_capacity,
            dispatcher_threads = config.dispatcher_threads,
            "event hub started"
        );

        Arc::new(Self {
            queue,
            registry,
            pool: Mutex::new(Some(pool)),
            timers,
            gpio,
            sensors,
            messaging,
        })
    }

    pub fn queue(&self) -> &Arc<EventQueue> {
        &self.queue
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn timers(&self) -> &Arc<TimerService> {
        &self.timers
    }

    pub fn gpio(&self) -> &Arc<GpioService> {
        &self.gpio
    }

    pub fn sensors(&self) -> &Arc<SensorService> {
        &self.sensors
    }

    pub fn messaging(&self) -> &Arc<MessagingService> {
        &self.messaging
    }

    /// Register a live sandbox and get its module handle.
    pub fn register_module(&self, exec_env: Arc<dyn ExecEnv>) -> ModuleId {
        self.registry.register(exec_env)
    }

    /// Tear a sandbox down: reclaim its host resources, then drop queued
    /// events nobody can receive anymore.
    pub fn unregister_module(&self, module: ModuleId) {
        self.registry.unregister(module);
        self.queue.discard_owned(module);
    }

    /// Pull primitive: pop the caller's next queued event, if any.
    pub fn pull_event(&self, module: ModuleId) -> Option<Event> {
        self.queue.try_pop_owned(module)
    }

    /// Stop dispatcher threads and resource-manager threads. Idempotent.
    pub fn shutdown(&self) {
        let pool = self.pool.lock().take();
        if let Some(pool) = pool {
            pool.shutdown();
        } else {
            return;
        }
        self.timers.shutdown();
        self.sensors.shutdown();
        info!("event hub stopped");
    }
}

impl Drop for EventHub {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
#[path = "hub_tests.rs"]
mod tests;
