// SPDX-License-Identifier: Apache-2.0
// Copyright (c) contributors to Project Ocre

//! GPIO lines exposed to sandboxes.
//!
//! Pin state lives in a backend; hosts without real lines get the simulated
//! backend, which also lets tests inject edges. An edge on a pin with a
//! registered callback publishes a `Gpio` event to the owning module.

use crate::queue::EventQueue;
use crate::registry::Registry;
use ocre_core::{Error, Event, ModuleId, ResourceKind, Result};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

pub const MAX_PORTS: u32 = 8;
pub const PINS_PER_PORT: u32 = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinDirection {
    Input,
    Output,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinState {
    Reset,
    Set,
}

impl PinState {
    pub fn level(self) -> u32 {
        match self {
            Self::Reset => 0,
            Self::Set => 1,
        }
    }

    pub fn from_level(level: u32) -> Self {
        if level == 0 {
            Self::Reset
        } else {
            Self::Set
        }
    }

    fn toggled(self) -> Self {
        match self {
            Self::Reset => Self::Set,
            Self::Set => Self::Reset,
        }
    }
}

/// Hardware access behind the GPIO service.
pub trait GpioBackend: Send + Sync {
    fn configure(&self, port: u32, pin: u32, direction: PinDirection) -> Result<()>;
    fn set(&self, port: u32, pin: u32, state: PinState) -> Result<()>;
    fn get(&self, port: u32, pin: u32) -> Result<PinState>;
}

#[derive(Clone, Copy)]
struct SimPin {
    configured: Option<PinDirection>,
    state: PinState,
}

/// In-memory backend for POSIX hosts and tests.
pub struct SimGpioBackend {
    pins: Mutex<HashMap<(u32, u32), SimPin>>,
}

impl SimGpioBackend {
    pub fn new() -> Self {
        Self { pins: Mutex::new(HashMap::new()) }
    }
}

impl Default for SimGpioBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl GpioBackend for SimGpioBackend {
    fn configure(&self, port: u32, pin: u32, direction: PinDirection) -> Result<()> {
        self.pins
            .lock()
            .insert((port, pin), SimPin { configured: Some(direction), state: PinState::Reset });
        Ok(())
    }

    fn set(&self, port: u32, pin: u32, state: PinState) -> Result<()> {
        let mut pins = self.pins.lock();
        let cell = pins
            .get_mut(&(port, pin))
            .ok_or_else(|| Error::invalid_argument(format!("pin {port}:{pin} not configured")))?;
        cell.state = state;
        Ok(())
    }

    fn get(&self, port: u32, pin: u32) -> Result<PinState> {
        let pins = self.pins.lock();
        let cell = pins
            .get(&(port, pin))
            .ok_or_else(|| Error::invalid_argument(format!("pin {port}:{pin} not configured")))?;
        if cell.configured.is_none() {
            return Err(Error::invalid_argument(format!("pin {port}:{pin} not configured")));
        }
        Ok(cell.state)
    }
}

pub struct GpioService {
    backend: Arc<dyn GpioBackend>,
    callbacks: Mutex<HashMap<(u32, u32), ModuleId>>,
    queue: Arc<EventQueue>,
    registry: Arc<Registry>,
}

impl GpioService {
    pub fn new(
        backend: Arc<dyn GpioBackend>,
        queue: Arc<EventQueue>,
        registry: Arc<Registry>,
    ) -> Arc<Self> {
        Arc::new(Self { backend, callbacks: Mutex::new(HashMap::new()), queue, registry })
    }

    fn check_pin(port: u32, pin: u32) -> Result<()> {
        if port >= MAX_PORTS || pin >= PINS_PER_PORT {
            return Err(Error::invalid_argument(format!(
                "pin {port}:{pin} outside {MAX_PORTS} ports x {PINS_PER_PORT} pins"
            )));
        }
        Ok(())
    }

    pub fn configure(&self, port: u32, pin: u32, direction: PinDirection) -> Result<()> {
        Self::check_pin(port, pin)?;
        self.backend.configure(port, pin, direction)
    }

    pub fn set(&self, port: u32, pin: u32, state: PinState) -> Result<()> {
        Self::check_pin(port, pin)?;
        self.backend.set(port, pin, state)
    }

    pub fn get(&self, port: u32, pin: u32) -> Result<PinState> {
        Self::check_pin(port, pin)?;
        self.backend.get(port, pin)
    }

    pub fn toggle(&self, port: u32, pin: u32) -> Result<PinState> {
        Self::check_pin(port, pin)?;
        let next = self.backend.get(port, pin)?.toggled();
        self.backend.set(port, pin, next)?;
        Ok(next)
    }

    /// Route edges on this pin to the calling module.
    pub fn register_callback(&self, module: ModuleId, port: u32, pin: u32) -> Result<()> {
        Self::check_pin(port, pin)?;
        let mut callbacks = self.callbacks.lock();
        if callbacks.contains_key(&(port, pin)) {
            return Err(Error::conflict(format!("pin {port}:{pin} already has a callback")));
        }
        callbacks.insert((port, pin), module);
        drop(callbacks);
        self.registry.increment_resource_count(module, ResourceKind::Gpio);
        debug!(module = %module, port, pin, "gpio callback registered");
        Ok(())
    }

    pub fn unregister_callback(&self, module: ModuleId, port: u32, pin: u32) -> Result<()> {
        Self::check_pin(port, pin)?;
        let mut callbacks = self.callbacks.lock();
        match callbacks.get(&(port, pin)) {
            Some(owner) if *owner == module => {
                callbacks.remove(&(port, pin));
                drop(callbacks);
                self.registry.decrement_resource_count(module, ResourceKind::Gpio);
                Ok(())
            }
            Some(_) => Err(Error::conflict(format!("pin {port}:{pin} owned by another module"))),
            None => Err(Error::not_found(format!("no callback on pin {port}:{pin}"))),
        }
    }

    /// Edge notification from the backend (interrupt context on real
    /// hardware). Updates the pin level and publishes to the registered
    /// owner, if any.
    pub fn edge(&self, port: u32, pin: u32, state: PinState) {
        if let Err(e) = self.backend.set(port, pin, state) {
            debug!(port, pin, error = %e, "edge on unconfigured pin");
            return;
        }

        let owner = self.callbacks.lock().get(&(port, pin)).copied();
        let Some(owner) = owner else { return };

        let event = Event::Gpio { pin, port, state: state.level(), owner };
        if let Err(e) = self.queue.publish(event) {
            warn!(port, pin, error = %e, "dropped gpio event");
        }
    }

    /// Cleanup handler: unregister every callback owned by a dying module.
    pub fn cleanup(&self, module: ModuleId) {
        let mut callbacks = self.callbacks.lock();
        let owned: Vec<(u32, u32)> = callbacks
            .iter()
            .filter(|(_, m)| **m == module)
            .map(|(k, _)| *k)
            .collect();
        for key in &owned {
            callbacks.remove(key);
        }
        drop(callbacks);
        for _ in &owned {
            self.registry.decrement_resource_count(module, ResourceKind::Gpio);
        }
        if !owned.is_empty() {
            debug!(module = %module, count = owned.len(), "cleaned up gpio callbacks");
        }
    }
}

#[cfg(test)]
#[path = "gpio_tests.rs"]
mod tests;
