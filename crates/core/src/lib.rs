// SPDX-License-Identifier: Apache-2.0
// Copyright (c) contributors to Project Ocre

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! ocre-core: shared domain types for the Ocre container runtime.
//!
//! Everything the lifecycle core, the event subsystem, and the engines need
//! to agree on lives here: the container status enum, the error kinds, name
//! validation and ID generation, event records, and the runtime-engine
//! capability traits.

pub mod clock;
pub mod engine;
pub mod error;
pub mod event;
pub mod names;
pub mod status;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use clock::{Clock, SystemClock};
pub use engine::{InstanceSpec, RuntimeEngine, RuntimeInstance, StartGate};
pub use error::{Error, Result};
pub use event::{DispatchCall, Event, ModuleId, ResourceKind};
pub use names::{is_valid_name, random_id};
pub use status::ContainerStatus;

#[cfg(any(test, feature = "test-support"))]
pub use clock::FakeClock;
#[cfg(any(test, feature = "test-support"))]
pub use test_support::{FakeEngine, FakeInstance};
