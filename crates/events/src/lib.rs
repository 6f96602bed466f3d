// SPDX-License-Identifier: Apache-2.0
// Copyright (c) contributors to Project Ocre

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! ocre-events: event fan-in from host resources to sandbox callbacks.
//!
//! Host resource managers (timers, GPIO, sensors, messaging) tag everything
//! they hand out with the owning sandbox module and publish typed events onto
//! one bounded queue. A fixed pool of dispatcher threads drains the queue and
//! invokes the module-registered callback through the module's execution
//! environment. Sandboxes may instead poll the queue directly through the
//! pull primitive.

pub mod dispatch;
pub mod hub;
pub mod queue;
pub mod registry;
pub mod resources;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use dispatch::DispatcherPool;
pub use hub::{EventHub, HubConfig};
pub use queue::EventQueue;
pub use registry::{ExecEnv, Registry};
pub use resources::gpio::{GpioBackend, GpioService, PinDirection, PinState, SimGpioBackend};
pub use resources::messaging::MessagingService;
pub use resources::sensors::{RngSensorBackend, SensorBackend, SensorInfo, SensorService};
pub use resources::timers::TimerService;

#[cfg(any(test, feature = "test-support"))]
pub use testing::FakeExecEnv;
